// HTTP boundary of the token exchange

use crate::error::ExchangeError;
use crate::exchange::TokenExchange;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tlc_core::{resolve, ErrorResponse, TokenRequestBody};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

// API state
#[derive(Clone)]
pub struct ApiState {
    pub exchange: Arc<TokenExchange>,
    /// Public verification site key, safe to hand to browsers
    pub site_key: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct SiteKeyResponse {
    pub site_key: String,
    pub verification_required: bool,
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });
        (status, body).into_response()
    }
}

/// Create HTTP router with all API routes
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/get-access-token", post(get_access_token_handler))
        .route("/api/turnstile-site-key", get(site_key_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn site_key_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(SiteKeyResponse {
        site_key: state.site_key.clone(),
        verification_required: state.exchange.requires_verification(),
    })
}

async fn get_access_token_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // An empty body is the ungated client's request
    let request: TokenRequestBody = if body.iter().all(|b| b.is_ascii_whitespace()) {
        TokenRequestBody::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => {
                warn!("Rejected malformed token request: {}", e);
                let body = Json(ErrorResponse {
                    error: "Invalid request body".to_string(),
                    code: "INVALID_BODY".to_string(),
                });
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
        }
    };

    let config = resolve(request.profile(), request.language());
    let remote_ip = client_ip(&headers);

    match state.exchange.exchange(request.proof(), &config, remote_ip.as_deref()).await {
        Ok(credential) => {
            info!("Access token issued for {} session", config.profile);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                credential.into_inner(),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Access token request failed with {}: {}", e.status_code(), e);
            e.into_response()
        }
    }
}

/// Client address as reported by the edge proxy, if any
fn client_ip(headers: &HeaderMap) -> Option<String> {
    let from = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or("").trim().to_string())
            .filter(|v| !v.is_empty())
    };
    from("cf-connecting-ip").or_else(|| from("x-forwarded-for"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::{CredentialIssuer, TokenRequest};
    use crate::verifier::{HumanVerifier, VerificationOutcome};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use parking_lot::Mutex;
    use tlc_core::{SessionCredential, VerificationProof};
    use tower::ServiceExt;

    struct EchoVerifier {
        seen_ip: Mutex<Option<String>>,
    }

    #[async_trait]
    impl HumanVerifier for EchoVerifier {
        async fn verify(
            &self,
            proof: &VerificationProof,
            remote_ip: Option<&str>,
        ) -> Result<VerificationOutcome, ExchangeError> {
            *self.seen_ip.lock() = remote_ip.map(str::to_string);
            if proof.as_str() == "human" {
                Ok(VerificationOutcome::Passed)
            } else {
                Ok(VerificationOutcome::Rejected { error_codes: vec![] })
            }
        }

        fn provider_name(&self) -> &str {
            "echo"
        }
    }

    struct LanguageIssuer;

    #[async_trait]
    impl CredentialIssuer for LanguageIssuer {
        async fn issue(&self, request: &TokenRequest) -> Result<SessionCredential, ExchangeError> {
            Ok(SessionCredential::new(format!("tok-{}-{}", request.avatar_id, request.language)))
        }

        fn provider_name(&self) -> &str {
            "lang"
        }
    }

    fn router(gated: bool) -> (Router, Arc<EchoVerifier>) {
        let verifier = Arc::new(EchoVerifier { seen_ip: Mutex::new(None) });
        let exchange = TokenExchange::new(verifier.clone(), Arc::new(LanguageIssuer), gated);
        let state = ApiState {
            exchange: Arc::new(exchange),
            site_key: "site-key-1".to_string(),
        };
        (create_router(state), verifier)
    }

    fn post_token(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/get-access-token")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "192.0.2.10, 10.0.0.1")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_proof_is_400() {
        let (app, _) = router(true);
        let response = app.oneshot(post_token(r#"{"cf-turnstile-response":""}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("Missing Turnstile token"));
    }

    #[tokio::test]
    async fn test_failed_bot_check_is_403() {
        let (app, _) = router(true);
        let response = app.oneshot(post_token(r#"{"cf-turnstile-response":"robot"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["code"], "BOT_CHECK_FAILED");
    }

    #[tokio::test]
    async fn test_success_returns_raw_credential() {
        let (app, verifier) = router(true);
        let response = app
            .oneshot(post_token(
                r#"{"cf-turnstile-response":"human","experience":"training","language":"hi"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "tok-Shawn_Therapist_public-hi");
        assert_eq!(verifier.seen_ip.lock().as_deref(), Some("192.0.2.10"));
    }

    #[tokio::test]
    async fn test_ungated_accepts_empty_body() {
        let (app, _) = router(false);
        let request = Request::builder()
            .method("POST")
            .uri("/api/get-access-token")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "tok-Ann_Therapist_public-en");
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let (app, _) = router(true);
        let response = app.oneshot(post_token("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_site_key_endpoint() {
        let (app, _) = router(true);
        let request = Request::builder().uri("/api/turnstile-site-key").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["site_key"], "site-key-1");
        assert_eq!(json["verification_required"], true);
    }
}
