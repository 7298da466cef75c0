//! Error types for the token exchange

use axum::http::StatusCode;
use thiserror::Error;
use tlc_core::Error as CoreError;

/// Token exchange failures.
///
/// Every variant maps to a non-200 status and a message the caller can show as-is.
/// No variant ever carries the server-held API key.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Missing Turnstile token")]
    MissingProof,

    #[error("Bot check failed{}", codes_suffix(.error_codes))]
    BotCheckFailed { error_codes: Vec<String> },

    #[error("Verification provider unavailable: {0}")]
    VerifierUnavailable(String),

    #[error("API key is missing from environment")]
    MissingApiKey,

    #[error("Provider request failed ({status}): {body}")]
    Provider { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("No token received in response")]
    EmptyCredential,

    #[error("Failed to reach streaming provider: {0}")]
    Transport(String),
}

fn codes_suffix(codes: &[String]) -> String {
    if codes.is_empty() {
        String::new()
    } else {
        format!(" ({})", codes.join(", "))
    }
}

impl ExchangeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ExchangeError::MissingProof => StatusCode::BAD_REQUEST,
            ExchangeError::BotCheckFailed { .. } => StatusCode::FORBIDDEN,
            ExchangeError::VerifierUnavailable(_)
            | ExchangeError::MissingApiKey
            | ExchangeError::Provider { .. }
            | ExchangeError::MalformedResponse(_)
            | ExchangeError::EmptyCredential
            | ExchangeError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the JSON error body
    pub fn code(&self) -> &'static str {
        match self {
            ExchangeError::MissingProof => "MISSING_PROOF",
            ExchangeError::BotCheckFailed { .. } => "BOT_CHECK_FAILED",
            ExchangeError::VerifierUnavailable(_) => "VERIFIER_UNAVAILABLE",
            ExchangeError::MissingApiKey => "CONFIG_ERROR",
            ExchangeError::Provider { .. } => "PROVIDER_ERROR",
            ExchangeError::MalformedResponse(_) => "PROVIDER_ERROR",
            ExchangeError::EmptyCredential => "EMPTY_CREDENTIAL",
            ExchangeError::Transport(_) => "PROVIDER_UNREACHABLE",
        }
    }

    /// Proof missing or rejected; the user has to redo the challenge.
    pub fn is_verification(&self) -> bool {
        matches!(self, ExchangeError::MissingProof | ExchangeError::BotCheckFailed { .. })
    }
}

impl From<ExchangeError> for CoreError {
    fn from(err: ExchangeError) -> Self {
        CoreError::Exchange(err.to_string())
    }
}
