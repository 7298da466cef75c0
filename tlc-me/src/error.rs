//! Error types for tlc-me

use thiserror::Error;
use tlc_core::Error as CoreError;

/// Session lifecycle errors, as surfaced to the presentation layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Proof missing or rejected; redo the challenge
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Token endpoint or streaming provider failed to issue a credential
    #[error("Provider error: {0}")]
    Provider(String),

    /// Streaming connection could not be established
    #[error("Session initialization failed: {0}")]
    SessionInit(String),

    /// Voice chat did not start; the session stays connected
    #[error("Voice chat failed: {0}")]
    VoiceChat(String),

    #[error("Avatar task failed: {0}")]
    Task(String),

    #[error("A session is already active")]
    AlreadyActive,

    #[error("Select a language before starting a session")]
    LanguageUnset,

    #[error("No connected session")]
    NotConnected,

    /// The session was torn down (unload, unmount, disconnect or expiry) before the start returned
    #[error("Session start was cancelled by teardown")]
    Cancelled,
}

impl SessionError {
    /// Whether the user can simply try again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Verification(_)
                | SessionError::Provider(_)
                | SessionError::SessionInit(_)
                | SessionError::Task(_)
        )
    }

    /// Failures that need a fresh bot-verification proof before retrying
    pub fn needs_new_proof(&self) -> bool {
        matches!(self, SessionError::Verification(_))
    }
}

/// Streaming SDK errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamingError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("No active stream")]
    NotStarted,
}

/// Verification gate errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("Challenge instance {0} was superseded")]
    StaleChallenge(u64),

    #[error("Challenge was abandoned before completion")]
    Abandoned,

    #[error("Challenge already completed")]
    AlreadyCompleted,

    #[error("Challenge returned an empty proof")]
    EmptyProof,
}

impl From<SessionError> for CoreError {
    fn from(err: SessionError) -> Self {
        CoreError::Session(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(SessionError::Verification("rejected".into()).needs_new_proof());
        assert!(SessionError::SessionInit("timeout".into()).is_retryable());
        assert!(!SessionError::AlreadyActive.is_retryable());
        assert!(!SessionError::Provider("down".into()).needs_new_proof());
    }

    #[test]
    fn test_into_core_error() {
        let core: CoreError = SessionError::NotConnected.into();
        assert!(matches!(core, CoreError::Session(msg) if msg == "No connected session"));
    }
}
