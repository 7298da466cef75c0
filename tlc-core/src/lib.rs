//! tlc-core: shared types for the gated avatar session service
//!
//! - Verification proof / session credential newtypes
//! - Experience profiles, languages and the session configuration selector
//! - Wire types of the token endpoint
//! - Process configuration (file + environment)

pub mod error;
pub mod types;
pub mod experience;
pub mod wire;
pub mod config;

pub use error::{Error, Result};
pub use types::{ApiKey, SessionCredential, VerificationProof};
pub use experience::{
    resolve, AvatarQuality, ExperienceProfile, Language, SessionConfig, SttProvider,
    VoiceChatTransport, VoiceEmotion, VoiceSettings,
};
pub use wire::{ErrorResponse, TokenRequestBody, TURNSTILE_RESPONSE_FIELD};
pub use config::{AppConfig, ClientConfig, ConfigError, Secrets, ServerConfig};
