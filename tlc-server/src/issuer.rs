//! Streaming provider token issuing (HeyGen `streaming.create_token`)

use crate::error::ExchangeError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tlc_core::{ApiKey, SessionConfig, SessionCredential};
use tracing::{info, warn};

/// Parameters of a credential request, taken from the resolved session config
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenRequest {
    pub avatar_id: String,
    pub quality: String,
    pub voice_id: String,
    pub language: String,
}

impl TokenRequest {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            avatar_id: config.avatar_identity.clone(),
            quality: config.quality.as_str().to_string(),
            voice_id: config.voice.voice_id.clone(),
            language: config.language.code().to_string(),
        }
    }
}

/// Trait for credential issuers
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self, request: &TokenRequest) -> Result<SessionCredential, ExchangeError>;
    fn provider_name(&self) -> &str;
}

/// HeyGen token issuer. Holds the server-side API key.
pub struct HeyGenTokenIssuer {
    client: Client,
    base_url: String,
    api_key: Option<ApiKey>,
    max_body_bytes: usize,
}

impl HeyGenTokenIssuer {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<ApiKey>,
        timeout: Duration,
        max_body_bytes: usize,
    ) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExchangeError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_body_bytes,
        })
    }
}

#[async_trait]
impl CredentialIssuer for HeyGenTokenIssuer {
    async fn issue(&self, request: &TokenRequest) -> Result<SessionCredential, ExchangeError> {
        let api_key = self
            .api_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .ok_or(ExchangeError::MissingApiKey)?;

        let url = format!("{}/v1/streaming.create_token", self.base_url);
        info!("Requesting streaming token for avatar {} ({})", request.avatar_id, request.language);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key.expose())
            .json(request)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = read_bounded(response, self.max_body_bytes).await;

        if !status.is_success() {
            warn!("Streaming provider returned {}", status);
            return Err(ExchangeError::Provider { status: status.as_u16(), body });
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::MalformedResponse(format!("{}: {}", e, body)))?;

        let token = parsed
            .get("data")
            .and_then(|d| d.get("token"))
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .ok_or(ExchangeError::EmptyCredential)?;

        Ok(SessionCredential::new(token))
    }

    fn provider_name(&self) -> &str {
        "heygen"
    }
}

/// Read at most `max` bytes of a response body; the rest is never buffered.
pub(crate) async fn read_bounded(mut response: reqwest::Response, max: usize) -> String {
    let mut buf = Vec::with_capacity(max.min(8 * 1024));
    while buf.len() < max {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(max - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) | Err(_) => break,
        }
    }
    utf8_prefix(buf)
}

/// Decode, dropping a multi-byte character cut off at the end
fn utf8_prefix(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let utf8 = e.utf8_error();
            let mut bytes = e.into_bytes();
            if utf8.error_len().is_none() {
                bytes.truncate(utf8.valid_up_to());
            }
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }
}
