//! Opaque tokens passed between the gate, the token endpoint and the controller

use std::fmt;

/// One-time proof issued by the bot-verification provider.
///
/// Consumed by value when forwarded, so a proof cannot be sent twice.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationProof(String);

impl VerificationProof {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whitespace-only proofs count as empty.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for VerificationProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationProof({} chars)", self.0.len())
    }
}

/// Short-lived bearer credential for exactly one streaming connection.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential(String);

impl SessionCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionCredential(<redacted>)")
    }
}

/// Server-held provider secret. Never logged, never returned to a caller.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_prints_secrets() {
        let key = ApiKey::new("sk-live-123");
        let credential = SessionCredential::new("bearer-abc");
        let proof = VerificationProof::new("proof-xyz");

        assert!(!format!("{:?}", key).contains("sk-live-123"));
        assert!(!format!("{:?}", credential).contains("bearer-abc"));
        assert!(!format!("{:?}", proof).contains("proof-xyz"));
    }

    #[test]
    fn test_blank_proof_is_empty() {
        assert!(VerificationProof::new("").is_empty());
        assert!(VerificationProof::new("   ").is_empty());
        assert!(!VerificationProof::new("x").is_empty());
    }
}
