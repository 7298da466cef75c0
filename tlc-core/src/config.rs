// Process-wide configuration: non-secret settings from a file or the
// environment, provider secrets from the environment only.

use crate::types::ApiKey;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_STREAMING_API_BASE: &str = "https://api.heygen.com";
pub const DEFAULT_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Cloudflare's public "always passes" Turnstile secret, used when no secret is configured.
pub const TURNSTILE_TEST_SECRET: &str = "1x0000000000000000000000000000000AA";
/// Cloudflare's public "always passes" Turnstile site key.
pub const TURNSTILE_TEST_SITE_KEY: &str = "1x00000000000000000000AA";

pub const ENV_STREAMING_API_KEY: &str = "HEYGEN_API_KEY";
pub const ENV_TURNSTILE_SECRET: &str = "TURNSTILE_SECRET_KEY";
pub const ENV_TURNSTILE_SITE_KEY: &str = "TURNSTILE_SITE_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Token-exchange server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Base URL of the streaming provider's REST API
    pub streaming_api_base: String,
    /// Verification provider's server-side check endpoint
    pub verify_url: String,
    /// Gate credential issuance behind the bot check (off = ungated deployment)
    pub require_verification: bool,
    /// Timeout for each outbound provider call
    pub request_timeout_secs: u64,
    /// Upper bound on provider bodies read for diagnostics
    pub max_provider_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            streaming_api_base: DEFAULT_STREAMING_API_BASE.to_string(),
            verify_url: DEFAULT_VERIFY_URL.to_string(),
            require_verification: true,
            request_timeout_secs: 30,
            max_provider_body_bytes: 10_000,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply the server's `TLC_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("TLC_BIND_ADDRESS") {
            self.bind_address = host;
        }
        if let Some(port) = lookup("TLC_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.port = port;
        }
        if let Some(flag) = lookup("TLC_REQUIRE_VERIFICATION").and_then(|v| v.parse::<bool>().ok()) {
            self.require_verification = flag;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Validation("server.port cannot be 0".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation("server.request_timeout_secs must be > 0".to_string()));
        }
        if self.max_provider_body_bytes == 0 {
            return Err(ConfigError::Validation("server.max_provider_body_bytes must be > 0".to_string()));
        }
        validate_provider_url("server.streaming_api_base", &self.streaming_api_base)?;
        validate_provider_url("server.verify_url", &self.verify_url)
    }
}

/// Session controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where the controller fetches credentials from
    pub token_endpoint: String,
    /// Streaming provider REST API used by the session client
    pub streaming_api_base: String,
    /// Hard cap on a connected session (one-shot, not renewed by activity)
    pub session_duration_secs: u64,
    /// How long to wait for the provider's stream-ready signal
    pub ready_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token_endpoint: "http://localhost:3000/api/get-access-token".to_string(),
            streaming_api_base: DEFAULT_STREAMING_API_BASE.to_string(),
            session_duration_secs: 300,
            ready_timeout_secs: 30,
            request_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_duration_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply the client's `TLC_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secs) = lookup("TLC_SESSION_DURATION_SECS").and_then(|v| v.parse::<u64>().ok()) {
            self.session_duration_secs = secs;
        }
        if let Some(endpoint) = lookup("TLC_TOKEN_ENDPOINT") {
            self.token_endpoint = endpoint;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation("client.request_timeout_secs must be > 0".to_string()));
        }
        if self.session_duration_secs == 0 {
            return Err(ConfigError::Validation("client.session_duration_secs must be > 0".to_string()));
        }
        if self.ready_timeout_secs == 0 {
            return Err(ConfigError::Validation("client.ready_timeout_secs must be > 0".to_string()));
        }
        validate_provider_url("client.streaming_api_base", &self.streaming_api_base)?;
        Url::parse(&self.token_endpoint)
            .map_err(|e| ConfigError::Validation(format!("client.token_endpoint: {}", e)))?;
        Ok(())
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        if path.contains("..") {
            return Err(ConfigError::Io(format!("Path traversal detected: '{}'", path)));
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        content.parse()
    }

    /// Apply every `TLC_*` environment override, both sections
    pub fn with_env_overrides(self) -> Self {
        Self {
            server: self.server.with_env_overrides(),
            client: self.client.with_env_overrides(),
        }
    }

    /// Validate both sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.client.validate()
    }
}

/// Accepts JSON or TOML
impl FromStr for AppConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        if let Ok(config) = serde_json::from_str::<AppConfig>(content) {
            return Ok(config);
        }
        toml::from_str::<AppConfig>(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Provider URLs must be HTTPS; plain HTTP is only accepted for loopback hosts.
fn validate_provider_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Validation(format!("{}: {}", field, e)))?;
    match url.scheme() {
        "https" => Ok(()),
        "http" if matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]")) => Ok(()),
        _ => Err(ConfigError::Validation(format!("{} must use HTTPS", field))),
    }
}

/// Provider secrets, read once at process start and never mutated.
#[derive(Debug, Clone)]
pub struct Secrets {
    /// Streaming provider key. Absence is reported per request, not at startup.
    pub streaming_api_key: Option<ApiKey>,
    pub turnstile_secret: ApiKey,
    /// Public site key embedded client-side
    pub site_key: String,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            streaming_api_key: non_empty(ENV_STREAMING_API_KEY).map(ApiKey::new),
            turnstile_secret: ApiKey::new(
                non_empty(ENV_TURNSTILE_SECRET).unwrap_or_else(|| TURNSTILE_TEST_SECRET.to_string()),
            ),
            site_key: non_empty(ENV_TURNSTILE_SITE_KEY).unwrap_or_else(|| TURNSTILE_TEST_SITE_KEY.to_string()),
        }
    }

    /// True when the verification secret is Cloudflare's public test secret
    pub fn uses_test_secret(&self) -> bool {
        self.turnstile_secret.expose() == TURNSTILE_TEST_SECRET
    }
}
