//! tlc-server: gated token exchange
//!
//! Verifies a bot-check proof with the verification provider and, only on
//! success, requests a streaming session credential with the server-held key.

pub mod error;
pub mod verifier;
pub mod issuer;
pub mod exchange;
pub mod http;

pub use error::ExchangeError;
pub use exchange::TokenExchange;
pub use http::{create_router, ApiState};
pub use issuer::{CredentialIssuer, HeyGenTokenIssuer, TokenRequest};
pub use verifier::{HumanVerifier, TurnstileVerifier, VerificationOutcome};
