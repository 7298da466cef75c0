use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown experience profile: {0}")]
    UnknownProfile(String),

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),

    #[error("Token exchange error: {0}")]
    Exchange(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}
