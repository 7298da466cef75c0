//! Experience profiles, languages and the session configuration selector

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named avatar persona / knowledge base pairing.
///
/// The set is closed; adding a profile forces every `match` below to be updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceProfile {
    /// New-hire onboarding walkthrough
    #[default]
    Onboarding,
    /// Role training and practice conversations
    Training,
}

impl ExperienceProfile {
    /// Profiles in presentation order. The first one is the default selection.
    pub const ALL: [ExperienceProfile; 2] = [ExperienceProfile::Onboarding, ExperienceProfile::Training];

    pub fn id(&self) -> &'static str {
        match self {
            ExperienceProfile::Onboarding => "onboarding",
            ExperienceProfile::Training => "training",
        }
    }

    pub fn avatar_identity(&self) -> &'static str {
        match self {
            ExperienceProfile::Onboarding => "Ann_Therapist_public",
            ExperienceProfile::Training => "Shawn_Therapist_public",
        }
    }

    pub fn knowledge_base_id(&self) -> &'static str {
        match self {
            ExperienceProfile::Onboarding => "tlc-onboarding-kb",
            ExperienceProfile::Training => "tlc-training-kb",
        }
    }
}

impl fmt::Display for ExperienceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ExperienceProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onboarding" => Ok(ExperienceProfile::Onboarding),
            "training" => Ok(ExperienceProfile::Training),
            other => Err(Error::UnknownProfile(other.to_string())),
        }
    }
}

/// Conversation language of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Hi,
    Es,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Hi, Language::Es];

    /// ISO 639-1 code sent to the provider
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
            Language::Es => "es",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "hi" => Ok(Language::Hi),
            "es" => Ok(Language::Es),
            other => Err(Error::UnknownLanguage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarQuality {
    Low,
    Medium,
    High,
}

impl AvatarQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvatarQuality::Low => "low",
            AvatarQuality::Medium => "medium",
            AvatarQuality::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceEmotion {
    Excited,
    Serious,
    Friendly,
    Soothing,
    Broadcaster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceChatTransport {
    Websocket,
    Livekit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    Deepgram,
    Gladia,
}

/// Voice parameters of the avatar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Provider voice id, also sent when requesting a credential
    pub voice_id: String,
    /// Speaking rate multiplier (0.5-1.5)
    pub rate: f32,
    pub emotion: VoiceEmotion,
    /// TTS model name
    pub model: String,
}

/// Everything a session needs from the selector, captured at `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub profile: ExperienceProfile,
    pub avatar_identity: String,
    pub knowledge_base_id: String,
    pub voice: VoiceSettings,
    pub language: Language,
    pub quality: AvatarQuality,
    pub transport: VoiceChatTransport,
    pub stt_provider: SttProvider,
}

const VOICE_MODEL: &str = "eleven_flash_v2_5";

/// Resolve the session configuration for a profile and language.
///
/// Pure: no I/O, and total over the closed profile set.
pub fn resolve(profile: ExperienceProfile, language: Language) -> SessionConfig {
    SessionConfig {
        profile,
        avatar_identity: profile.avatar_identity().to_string(),
        knowledge_base_id: profile.knowledge_base_id().to_string(),
        voice: VoiceSettings {
            voice_id: VOICE_MODEL.to_string(),
            rate: 1.0,
            emotion: VoiceEmotion::Excited,
            model: VOICE_MODEL.to_string(),
        },
        language,
        quality: AvatarQuality::High,
        transport: VoiceChatTransport::Livekit,
        stt_provider: SttProvider::Deepgram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_first() {
        assert_eq!(ExperienceProfile::default(), ExperienceProfile::ALL[0]);
    }

    #[test]
    fn test_resolve_carries_profile_identity() {
        for profile in ExperienceProfile::ALL {
            let config = resolve(profile, Language::Hi);
            assert_eq!(config.avatar_identity, profile.avatar_identity());
            assert_eq!(config.knowledge_base_id, profile.knowledge_base_id());
            assert_eq!(config.language, Language::Hi);
            assert_eq!(config.quality, AvatarQuality::High);
            assert_eq!(config.transport, VoiceChatTransport::Livekit);
        }
    }

    #[test]
    fn test_profiles_are_distinct() {
        let a = resolve(ExperienceProfile::Onboarding, Language::En);
        let b = resolve(ExperienceProfile::Training, Language::En);
        assert_ne!(a.avatar_identity, b.avatar_identity);
        assert_ne!(a.knowledge_base_id, b.knowledge_base_id);
    }

    #[test]
    fn test_parse_ids() {
        assert_eq!("Training".parse::<ExperienceProfile>().unwrap(), ExperienceProfile::Training);
        assert_eq!(" hi ".parse::<Language>().unwrap(), Language::Hi);
        assert!("sales".parse::<ExperienceProfile>().is_err());
        assert!("xx".parse::<Language>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase_ids() {
        let json = serde_json::to_string(&ExperienceProfile::Onboarding).unwrap();
        assert_eq!(json, "\"onboarding\"");
        let lang: Language = serde_json::from_str("\"es\"").unwrap();
        assert_eq!(lang, Language::Es);
    }
}
