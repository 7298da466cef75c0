//! Streaming avatar client abstraction

use crate::error::StreamingError;
use async_trait::async_trait;
use tlc_core::{SessionConfig, SessionCredential};
use tokio::sync::mpsc;

/// Connection events raised by the streaming SDK
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Stream is up and the avatar can be addressed
    Ready,
    /// Remote side closed the stream
    Disconnected { reason: Option<String> },
}

pub type StreamEventSender = mpsc::UnboundedSender<StreamEvent>;
pub type StreamEventReceiver = mpsc::UnboundedReceiver<StreamEvent>;

/// Trait for streaming avatar providers
///
/// One client drives at most one stream at a time. `stop` must be safe to
/// call on a client whose stream never became ready.
#[async_trait]
pub trait StreamingClient: Send + Sync {
    /// Open a stream for `config`. Readiness and disconnects are reported on `events`.
    async fn start_session(
        &self,
        credential: &SessionCredential,
        config: &SessionConfig,
        events: StreamEventSender,
    ) -> Result<(), StreamingError>;

    /// Start microphone capture and speech recognition
    async fn start_voice_chat(&self, config: &SessionConfig) -> Result<(), StreamingError>;

    /// Switch the stream to text input
    async fn start_text_chat(&self) -> Result<(), StreamingError>;

    /// Make the avatar say `text`
    async fn speak(&self, text: &str) -> Result<(), StreamingError>;

    async fn stop(&self) -> Result<(), StreamingError>;

    fn provider_name(&self) -> &str;
}
