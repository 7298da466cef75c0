//! Client side of the token exchange

use crate::error::SessionError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tlc_core::{ErrorResponse, SessionConfig, SessionCredential, TokenRequestBody, VerificationProof};
use tracing::{debug, warn};

/// Error bodies longer than this are cut before they reach the user
const MAX_ERROR_BODY: usize = 1024;

/// Trait for session credential sources
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_credential(
        &self,
        proof: Option<VerificationProof>,
        config: &SessionConfig,
    ) -> Result<SessionCredential, SessionError>;
}

/// Fetches credentials from the token endpoint over HTTP
pub struct HttpTokenSource {
    client: Client,
    endpoint: String,
}

impl HttpTokenSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SessionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch_credential(
        &self,
        proof: Option<VerificationProof>,
        config: &SessionConfig,
    ) -> Result<SessionCredential, SessionError> {
        let body = TokenRequestBody::new(proof, config.profile, config.language);
        debug!("Requesting access token from {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Provider(format!("Token endpoint unreachable: {}", e.without_url())))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SessionError::Provider(format!("Failed to read token response: {}", e)))?;

        if status.is_success() {
            let token = text.trim();
            if token.is_empty() {
                return Err(SessionError::Provider("empty credential".to_string()));
            }
            return Ok(SessionCredential::new(token));
        }

        let message = error_message(&text);
        warn!("Token endpoint returned {}: {}", status, message);
        match status {
            StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN => Err(SessionError::Verification(message)),
            _ => Err(SessionError::Provider(message)),
        }
    }
}

/// Message of a JSON error body, or the raw text
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => err.error,
        Err(_) => body.chars().take(MAX_ERROR_BODY).collect(),
    }
}
