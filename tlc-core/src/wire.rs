//! Wire types of the client -> token endpoint boundary

use crate::experience::{ExperienceProfile, Language};
use crate::types::VerificationProof;
use serde::{Deserialize, Serialize};

/// JSON field carrying the Turnstile proof
pub const TURNSTILE_RESPONSE_FIELD: &str = "cf-turnstile-response";

/// Body of `POST /api/get-access-token`.
///
/// Every field is optional: the ungated deployment sends no proof, and an
/// absent or unrecognised experience/language falls back to the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequestBody {
    #[serde(rename = "cf-turnstile-response", default, skip_serializing_if = "Option::is_none")]
    pub turnstile_response: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl TokenRequestBody {
    pub fn new(
        proof: Option<VerificationProof>,
        profile: ExperienceProfile,
        language: Language,
    ) -> Self {
        Self {
            turnstile_response: proof.map(VerificationProof::into_inner),
            experience: Some(profile.id().to_string()),
            language: Some(language.code().to_string()),
        }
    }

    pub fn proof(&self) -> Option<VerificationProof> {
        self.turnstile_response.clone().map(VerificationProof::new)
    }

    pub fn profile(&self) -> ExperienceProfile {
        self.experience
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn language(&self) -> Language {
        self.language
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

/// JSON error body returned by the token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
