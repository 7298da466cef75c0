//! Bot-verification provider (Cloudflare Turnstile server-side check)

use crate::error::ExchangeError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tlc_core::{ApiKey, VerificationProof};
use tracing::{debug, warn};

/// Result of a server-side proof check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Passed,
    Rejected { error_codes: Vec<String> },
}

/// Trait for verification providers
#[async_trait]
pub trait HumanVerifier: Send + Sync {
    /// Check a proof with the provider. Transport failures are errors;
    /// a provider saying "no" is `Ok(Rejected)`.
    async fn verify(
        &self,
        proof: &VerificationProof,
        remote_ip: Option<&str>,
    ) -> Result<VerificationOutcome, ExchangeError>;

    fn provider_name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
    #[serde(default)]
    hostname: Option<String>,
}

/// Turnstile `siteverify` client
pub struct TurnstileVerifier {
    client: Client,
    verify_url: String,
    secret: ApiKey,
}

impl TurnstileVerifier {
    pub fn new(verify_url: impl Into<String>, secret: ApiKey, timeout: Duration) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExchangeError::VerifierUnavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            verify_url: verify_url.into(),
            secret,
        })
    }
}

#[async_trait]
impl HumanVerifier for TurnstileVerifier {
    async fn verify(
        &self,
        proof: &VerificationProof,
        remote_ip: Option<&str>,
    ) -> Result<VerificationOutcome, ExchangeError> {
        let mut form = vec![("secret", self.secret.expose()), ("response", proof.as_str())];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ExchangeError::VerifierUnavailable(format!("Failed to reach verifier: {}", e)))?;

        let status = response.status();
        let body: SiteVerifyResponse = response.json().await.map_err(|e| {
            ExchangeError::VerifierUnavailable(format!("Unreadable verifier response ({}): {}", status, e))
        })?;

        if body.success {
            debug!("Turnstile check passed (hostname: {:?})", body.hostname);
            Ok(VerificationOutcome::Passed)
        } else {
            warn!("Turnstile check rejected: {:?}", body.error_codes);
            Ok(VerificationOutcome::Rejected { error_codes: body.error_codes })
        }
    }

    fn provider_name(&self) -> &str {
        "turnstile"
    }
}
