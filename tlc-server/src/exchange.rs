//! Gated token exchange: verification proof in, session credential out

use crate::error::ExchangeError;
use crate::issuer::{CredentialIssuer, HeyGenTokenIssuer, TokenRequest};
use crate::verifier::{HumanVerifier, TurnstileVerifier, VerificationOutcome};
use std::sync::Arc;
use tlc_core::{Secrets, ServerConfig, SessionConfig, SessionCredential, VerificationProof};
use tracing::{debug, info, warn};

/// Token exchange service. Stateless per call.
///
/// The verifier is always consulted strictly before the issuer; no
/// credential is requested for a proof that has not been confirmed.
pub struct TokenExchange {
    verifier: Arc<dyn HumanVerifier>,
    issuer: Arc<dyn CredentialIssuer>,
    require_verification: bool,
}

impl TokenExchange {
    pub fn new(
        verifier: Arc<dyn HumanVerifier>,
        issuer: Arc<dyn CredentialIssuer>,
        require_verification: bool,
    ) -> Self {
        Self {
            verifier,
            issuer,
            require_verification,
        }
    }

    /// Build the exchange against the real providers
    pub fn from_config(config: &ServerConfig, secrets: &Secrets) -> Result<Self, ExchangeError> {
        let verifier = TurnstileVerifier::new(
            config.verify_url.clone(),
            secrets.turnstile_secret.clone(),
            config.request_timeout(),
        )?;
        let issuer = HeyGenTokenIssuer::new(
            config.streaming_api_base.clone(),
            secrets.streaming_api_key.clone(),
            config.request_timeout(),
            config.max_provider_body_bytes,
        )?;
        Ok(Self::new(Arc::new(verifier), Arc::new(issuer), config.require_verification))
    }

    pub fn requires_verification(&self) -> bool {
        self.require_verification
    }

    /// Exchange a proof for a credential.
    ///
    /// Steps short-circuit on the first failure: missing proof, rejected
    /// proof, provider failure, empty credential.
    pub async fn exchange(
        &self,
        proof: Option<VerificationProof>,
        config: &SessionConfig,
        remote_ip: Option<&str>,
    ) -> Result<SessionCredential, ExchangeError> {
        if self.require_verification {
            let proof = proof.filter(|p| !p.is_empty()).ok_or(ExchangeError::MissingProof)?;

            match self.verifier.verify(&proof, remote_ip).await? {
                VerificationOutcome::Passed => {
                    debug!("Proof accepted by {}", self.verifier.provider_name());
                }
                VerificationOutcome::Rejected { error_codes } => {
                    return Err(ExchangeError::BotCheckFailed { error_codes });
                }
            }
        }

        let request = TokenRequest::from_config(config);
        match self.issuer.issue(&request).await {
            Ok(credential) => {
                info!(
                    "Issued session credential via {} for {} ({})",
                    self.issuer.provider_name(),
                    config.profile,
                    config.language
                );
                Ok(credential)
            }
            Err(e) => {
                warn!("Credential request failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tlc_core::{resolve, ExperienceProfile, Language};

    struct MockVerifier {
        outcome: VerificationOutcome,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HumanVerifier for MockVerifier {
        async fn verify(
            &self,
            _proof: &VerificationProof,
            _remote_ip: Option<&str>,
        ) -> Result<VerificationOutcome, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome.clone())
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }

    enum IssuerReply {
        Token(&'static str),
        Fail(u16, &'static str),
        Empty,
    }

    struct MockIssuer {
        reply: IssuerReply,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialIssuer for MockIssuer {
        async fn issue(&self, _request: &TokenRequest) -> Result<SessionCredential, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                IssuerReply::Token(t) => Ok(SessionCredential::new(t)),
                IssuerReply::Fail(status, body) => Err(ExchangeError::Provider { status, body: body.to_string() }),
                IssuerReply::Empty => Err(ExchangeError::EmptyCredential),
            }
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }

    fn setup(
        outcome: VerificationOutcome,
        reply: IssuerReply,
        gated: bool,
    ) -> (TokenExchange, Arc<MockVerifier>, Arc<MockIssuer>) {
        let verifier = Arc::new(MockVerifier { outcome, calls: AtomicUsize::new(0) });
        let issuer = Arc::new(MockIssuer { reply, calls: AtomicUsize::new(0) });
        let exchange = TokenExchange::new(verifier.clone(), issuer.clone(), gated);
        (exchange, verifier, issuer)
    }

    fn config() -> SessionConfig {
        resolve(ExperienceProfile::Onboarding, Language::En)
    }

    #[tokio::test]
    async fn test_empty_proof_never_reaches_providers() {
        for proof in [None, Some(VerificationProof::new("")), Some(VerificationProof::new("  "))] {
            let (exchange, verifier, issuer) = setup(VerificationOutcome::Passed, IssuerReply::Token("abc"), true);
            let result = exchange.exchange(proof, &config(), None).await;

            let err = result.unwrap_err();
            assert!(matches!(err, ExchangeError::MissingProof));
            assert!(err.is_verification());
            assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
            assert_eq!(issuer.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_rejected_proof_never_reaches_issuer() {
        let (exchange, verifier, issuer) = setup(
            VerificationOutcome::Rejected { error_codes: vec!["invalid-input-response".to_string()] },
            IssuerReply::Token("abc"),
            true,
        );

        let result = exchange.exchange(Some(VerificationProof::new("bot")), &config(), None).await;

        assert!(matches!(result, Err(ExchangeError::BotCheckFailed { .. })));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_carries_body() {
        let (exchange, _, issuer) = setup(
            VerificationOutcome::Passed,
            IssuerReply::Fail(401, "{\"message\":\"Unauthorized\"}"),
            true,
        );

        let err = exchange
            .exchange(Some(VerificationProof::new("human")), &config(), None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Unauthorized"));
        assert_eq!(err.status_code().as_u16(), 500);
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_credential() {
        let (exchange, _, _) = setup(VerificationOutcome::Passed, IssuerReply::Empty, true);
        let result = exchange.exchange(Some(VerificationProof::new("human")), &config(), None).await;
        assert!(matches!(result, Err(ExchangeError::EmptyCredential)));
    }

    #[tokio::test]
    async fn test_verified_proof_yields_credential() {
        let (exchange, verifier, issuer) = setup(VerificationOutcome::Passed, IssuerReply::Token("abc"), true);

        let credential = exchange
            .exchange(Some(VerificationProof::new("human")), &config(), Some("198.51.100.2"))
            .await
            .unwrap();

        assert_eq!(credential.as_str(), "abc");
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ungated_skips_verifier() {
        let (exchange, verifier, _) = setup(
            VerificationOutcome::Rejected { error_codes: vec![] },
            IssuerReply::Token("open"),
            false,
        );

        let credential = exchange.exchange(None, &config(), None).await.unwrap();
        assert_eq!(credential.as_str(), "open");
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }
}
