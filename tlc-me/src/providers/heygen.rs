//! HeyGen streaming avatar provider (REST control plane)

use crate::error::StreamingError;
use crate::streaming::{StreamEvent, StreamEventSender, StreamingClient};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tlc_core::{SessionConfig, SessionCredential};
use tracing::{debug, info, warn};
use url::Url;

const MAX_ERROR_BODY: usize = 1024;

/// HeyGen streaming client.
///
/// Opens, drives and closes one streaming session through the provider's
/// REST API. Media transport (audio/video tracks) is out of reach of this
/// client, so voice chat reports `Unsupported`.
pub struct HeyGenStreamingClient {
    client: Client,
    base_url: String,
    active: Mutex<Option<ActiveStream>>,
}

struct ActiveStream {
    session_id: String,
    credential: SessionCredential,
    events: StreamEventSender,
    text_mode: bool,
}

/// Body of `streaming.new`
#[derive(Debug, Serialize)]
struct NewSessionRequest<'a> {
    quality: &'a str,
    avatar_name: &'a str,
    knowledge_base_id: &'a str,
    voice: VoiceRequest<'a>,
    language: &'a str,
    version: &'a str,
    video_encoding: &'a str,
    stt_settings: SttRequest,
}

#[derive(Debug, Serialize)]
struct VoiceRequest<'a> {
    voice_id: &'a str,
    rate: f32,
    emotion: tlc_core::VoiceEmotion,
    model: &'a str,
}

#[derive(Debug, Serialize)]
struct SttRequest {
    provider: tlc_core::SttProvider,
}

impl<'a> NewSessionRequest<'a> {
    fn from_config(config: &'a SessionConfig) -> Self {
        Self {
            quality: config.quality.as_str(),
            avatar_name: &config.avatar_identity,
            knowledge_base_id: &config.knowledge_base_id,
            voice: VoiceRequest {
                voice_id: &config.voice.voice_id,
                rate: config.voice.rate,
                emotion: config.voice.emotion,
                model: &config.voice.model,
            },
            language: config.language.code(),
            version: "v2",
            video_encoding: "H264",
            stt_settings: SttRequest { provider: config.stt_provider },
        }
    }
}

impl HeyGenStreamingClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StreamingError> {
        let base_url: String = base_url.into();
        if Url::parse(&base_url).is_err() {
            return Err(StreamingError::Connection(format!("Invalid base URL: {}", base_url)));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StreamingError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            active: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> Option<String> {
        self.active.lock().as_ref().map(|s| s.session_id.clone())
    }

    /// Whether the running stream was switched to text input
    pub fn in_text_mode(&self) -> bool {
        self.active.lock().as_ref().map(|s| s.text_mode).unwrap_or(false)
    }

    /// POST a control call and return the `data` object of the reply
    async fn call(
        &self,
        credential: &SessionCredential,
        method: &str,
        body: &impl Serialize,
    ) -> Result<Value, StreamingError> {
        let url = format!("{}/v1/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .bearer_auth(credential.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| StreamingError::Connection(format!("{}: {}", method, e.without_url())))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(StreamingError::Api(format!("{} returned {}: {}", method, status, snippet)));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| StreamingError::Api(format!("{} returned invalid JSON: {}", method, e)))?;
        Ok(parsed.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Session id and credential of the running stream
    fn current(&self) -> Result<(String, SessionCredential), StreamingError> {
        self.active
            .lock()
            .as_ref()
            .map(|s| (s.session_id.clone(), s.credential.clone()))
            .ok_or(StreamingError::NotStarted)
    }
}

fn valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 256
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
impl StreamingClient for HeyGenStreamingClient {
    async fn start_session(
        &self,
        credential: &SessionCredential,
        config: &SessionConfig,
        events: StreamEventSender,
    ) -> Result<(), StreamingError> {
        if self.active.lock().is_some() {
            return Err(StreamingError::Connection("A stream is already open".to_string()));
        }

        info!("Opening {} stream for avatar {}", config.quality.as_str(), config.avatar_identity);
        let data = self
            .call(credential, "streaming.new", &NewSessionRequest::from_config(config))
            .await?;

        let session_id = data
            .get("session_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StreamingError::Api("Missing session_id in response".to_string()))?
            .to_string();
        if !valid_session_id(&session_id) {
            return Err(StreamingError::Api("Invalid session_id from API".to_string()));
        }
        if let Some(url) = data.get("url").and_then(|v| v.as_str()) {
            debug!("Media server for {}: {}", session_id, url);
        }

        let body = json!({ "session_id": session_id });
        if let Err(e) = self.call(credential, "streaming.start", &body).await {
            // The provider already holds a session; close it rather than wait for expiry
            if let Err(stop_err) = self.call(credential, "streaming.stop", &body).await {
                warn!("Could not close half-open stream {}: {}", session_id, stop_err);
            }
            return Err(e);
        }

        *self.active.lock() = Some(ActiveStream {
            session_id: session_id.clone(),
            credential: credential.clone(),
            events: events.clone(),
            text_mode: false,
        });

        info!("Stream {} ready", session_id);
        let _ = events.send(StreamEvent::Ready);
        Ok(())
    }

    async fn start_voice_chat(&self, _config: &SessionConfig) -> Result<(), StreamingError> {
        self.current()?;
        Err(StreamingError::Unsupported(
            "voice chat needs a media transport".to_string(),
        ))
    }

    async fn start_text_chat(&self) -> Result<(), StreamingError> {
        let mut active = self.active.lock();
        let stream = active.as_mut().ok_or(StreamingError::NotStarted)?;
        stream.text_mode = true;
        Ok(())
    }

    async fn speak(&self, text: &str) -> Result<(), StreamingError> {
        let (session_id, credential) = self.current()?;
        self.call(
            &credential,
            "streaming.task",
            &json!({ "session_id": session_id, "text": text, "task_type": "talk" }),
        )
        .await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), StreamingError> {
        let stream = match self.active.lock().take() {
            Some(stream) => stream,
            None => return Ok(()),
        };

        info!("Closing stream {}", stream.session_id);
        let result = self
            .call(&stream.credential, "streaming.stop", &json!({ "session_id": stream.session_id }))
            .await;

        if let Err(e) = &result {
            warn!("Stream {} did not close cleanly: {}", stream.session_id, e);
        }
        let _ = stream.events.send(StreamEvent::Disconnected { reason: Some("stopped".to_string()) });
        result.map(|_| ())
    }

    fn provider_name(&self) -> &str {
        "heygen"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use tlc_core::{resolve, ExperienceProfile, Language};
    use tokio::sync::mpsc;

    fn client(server: &mockito::ServerGuard) -> HeyGenStreamingClient {
        HeyGenStreamingClient::new(server.url(), Duration::from_secs(5)).unwrap()
    }

    async fn mock_open(server: &mut mockito::ServerGuard, session_id: &str) {
        server
            .mock("POST", "/v1/streaming.new")
            .match_header("authorization", "Bearer cred")
            .match_body(Matcher::PartialJson(json!({
                "avatar_name": "Ann_Therapist_public",
                "quality": "high",
                "language": "en",
                "voice": { "emotion": "excited", "rate": 1.0 },
                "stt_settings": { "provider": "deepgram" },
            })))
            .with_status(200)
            .with_body(json!({ "data": { "session_id": session_id, "url": "wss://media", "access_token": "lk" } }).to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/v1/streaming.start")
            .with_status(200)
            .with_body(r#"{"data":null}"#)
            .create_async()
            .await;
    }

    fn config() -> SessionConfig {
        resolve(ExperienceProfile::Onboarding, Language::En)
    }

    #[tokio::test]
    async fn test_start_session_reports_ready() {
        let mut server = mockito::Server::new_async().await;
        mock_open(&mut server, "sess-1").await;

        let client = client(&server);
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.start_session(&SessionCredential::new("cred"), &config(), tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(StreamEvent::Ready));
        assert_eq!(client.session_id().as_deref(), Some("sess-1"));
    }

    #[tokio::test]
    async fn test_rejects_invalid_session_id() {
        let mut server = mockito::Server::new_async().await;
        mock_open(&mut server, "../etc").await;

        let client = client(&server);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = client
            .start_session(&SessionCredential::new("cred"), &config(), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, StreamingError::Api(_)));
        assert!(client.session_id().is_none());
    }

    #[tokio::test]
    async fn test_provider_error_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/streaming.new")
            .with_status(401)
            .with_body(r#"{"message":"expired token"}"#)
            .create_async()
            .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = client(&server)
            .start_session(&SessionCredential::new("cred"), &config(), tx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expired token"));
    }

    #[tokio::test]
    async fn test_failed_start_closes_the_provider_session() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/streaming.new")
            .with_status(200)
            .with_body(r#"{"data":{"session_id":"sess-x"}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/v1/streaming.start")
            .with_status(500)
            .with_body(r#"{"message":"media server unavailable"}"#)
            .create_async()
            .await;
        let stop = server
            .mock("POST", "/v1/streaming.stop")
            .match_body(Matcher::Json(json!({ "session_id": "sess-x" })))
            .with_status(200)
            .with_body(r#"{"data":null}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let err = client
            .start_session(&SessionCredential::new("cred"), &config(), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, StreamingError::Api(ref msg) if msg.contains("media server unavailable")));
        assert_eq!(client.session_id(), None);

        // Nothing left for a later stop to close
        client.stop().await.unwrap();
        stop.assert_async().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_speak_and_stop() {
        let mut server = mockito::Server::new_async().await;
        mock_open(&mut server, "sess-2").await;
        let task = server
            .mock("POST", "/v1/streaming.task")
            .match_body(Matcher::Json(json!({ "session_id": "sess-2", "text": "hello", "task_type": "talk" })))
            .with_status(200)
            .with_body(r#"{"data":{"duration_ms":900}}"#)
            .create_async()
            .await;
        let stop = server
            .mock("POST", "/v1/streaming.stop")
            .match_body(Matcher::Json(json!({ "session_id": "sess-2" })))
            .with_status(200)
            .with_body(r#"{"data":null}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server);
        let (tx, _rx) = mpsc::unbounded_channel();
        client.start_session(&SessionCredential::new("cred"), &config(), tx).await.unwrap();
        client.speak("hello").await.unwrap();

        client.stop().await.unwrap();
        client.stop().await.unwrap();

        task.assert_async().await;
        stop.assert_async().await;
        assert_eq!(client.speak("again").await, Err(StreamingError::NotStarted));
    }

    #[tokio::test]
    async fn test_voice_chat_unsupported_text_chat_ok() {
        let mut server = mockito::Server::new_async().await;
        mock_open(&mut server, "sess-3").await;

        let client = client(&server);
        assert_eq!(client.start_text_chat().await, Err(StreamingError::NotStarted));

        let (tx, _rx) = mpsc::unbounded_channel();
        client.start_session(&SessionCredential::new("cred"), &config(), tx).await.unwrap();
        assert!(matches!(
            client.start_voice_chat(&config()).await,
            Err(StreamingError::Unsupported(_))
        ));
        assert!(client.start_text_chat().await.is_ok());
        assert!(client.in_text_mode());
    }

    #[test]
    fn test_session_id_charset() {
        assert!(valid_session_id("abc-123_x"));
        assert!(!valid_session_id(""));
        assert!(!valid_session_id("a/b"));
    }
}
