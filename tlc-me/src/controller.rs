//! Session lifecycle controller
//!
//! Owns the single avatar session of one page: the state machine
//! (Inactive -> Connecting -> Connected -> Inactive), the credential, the
//! termination timer and every teardown path. Every path takes the live
//! session out under the lock before closing it, so the connection is
//! stopped and the user notified at most once per session.

use crate::error::SessionError;
use crate::notify::{EndReason, NotificationSink, SessionEvent};
use crate::streaming::{StreamEvent, StreamEventReceiver, StreamingClient};
use crate::timer::TerminationTimer;
use crate::token_source::TokenSource;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tlc_core::{
    resolve, ClientConfig, ExperienceProfile, Language, SessionConfig, SessionCredential,
    VerificationProof,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Timing of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Maximum lifetime of a connected session
    pub session_duration: Duration,
    /// How long to wait for the stream to report ready
    pub ready_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_duration: Duration::from_secs(300),
            ready_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&ClientConfig> for SessionSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            session_duration: config.session_duration(),
            ready_timeout: config.ready_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Connecting,
    Connected,
}

/// Answer to a page-unload request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadPrompt {
    /// Nothing was running
    Proceed,
    /// A session was torn down; the host should show its leave confirmation
    Warn,
}

impl UnloadPrompt {
    pub const MESSAGE: &'static str = "Your avatar session is still running. Leaving this page will end it.";
}

/// Current profile and language choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub profile: ExperienceProfile,
    pub language: Option<Language>,
}

struct LiveSession {
    id: Uuid,
    config: SessionConfig,
    credential: Option<SessionCredential>,
    cancel: CancellationToken,
    /// Set once the streaming client was asked to open a connection
    connection_open: bool,
    timer: Option<TerminationTimer>,
}

struct Inner {
    state: SessionState,
    selection: Selection,
    pending_proof: Option<VerificationProof>,
    session: Option<LiveSession>,
}

struct Shared {
    inner: Mutex<Inner>,
    token_source: Arc<dyn TokenSource>,
    streaming: Arc<dyn StreamingClient>,
    notifier: Arc<dyn NotificationSink>,
    settings: SessionSettings,
    armed_timers: Arc<AtomicUsize>,
}

/// Session lifecycle controller
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(
        token_source: Arc<dyn TokenSource>,
        streaming: Arc<dyn StreamingClient>,
        notifier: Arc<dyn NotificationSink>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: SessionState::Inactive,
                    selection: Selection::default(),
                    pending_proof: None,
                    session: None,
                }),
                token_source,
                streaming,
                notifier,
                settings,
                armed_timers: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Takes effect on the next `start`
    pub fn select_profile(&self, profile: ExperienceProfile) {
        self.shared.inner.lock().selection.profile = profile;
    }

    /// Takes effect on the next `start`
    pub fn select_language(&self, language: Language) {
        self.shared.inner.lock().selection.language = Some(language);
    }

    /// Hand over a verification proof. It is consumed by the next `start`.
    pub fn provide_proof(&self, proof: VerificationProof) {
        self.shared.inner.lock().pending_proof = Some(proof);
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().state
    }

    pub fn selection(&self) -> Selection {
        self.shared.inner.lock().selection
    }

    pub fn timer_armed(&self) -> bool {
        self.shared
            .inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.timer.is_some())
            .unwrap_or(false)
    }

    /// Number of live termination timers across all sessions of this controller
    pub fn armed_timer_count(&self) -> usize {
        self.shared.armed_timers.load(Ordering::SeqCst)
    }

    /// Configuration captured by the running session
    pub fn active_config(&self) -> Option<SessionConfig> {
        self.shared.inner.lock().session.as_ref().map(|s| s.config.clone())
    }

    /// Start a session with the current selection.
    ///
    /// `voice_mode` asks for voice chat once the stream is ready; if voice
    /// chat fails the session stays connected and is reported as degraded.
    pub async fn start(&self, voice_mode: bool) -> Result<(), SessionError> {
        let (id, config, proof, cancel) = {
            let mut inner = self.shared.inner.lock();
            if inner.state != SessionState::Inactive {
                return Err(SessionError::AlreadyActive);
            }
            let language = inner.selection.language.ok_or(SessionError::LanguageUnset)?;
            let config = resolve(inner.selection.profile, language);
            let cancel = CancellationToken::new();
            let id = Uuid::new_v4();

            inner.session = Some(LiveSession {
                id,
                config: config.clone(),
                credential: None,
                cancel: cancel.clone(),
                connection_open: false,
                timer: None,
            });
            inner.state = SessionState::Connecting;
            (id, config, inner.pending_proof.take(), cancel)
        };

        info!(session_id = %id, profile = %config.profile, language = %config.language, "Starting avatar session");

        let guard = StartGuard { shared: self.shared.clone(), id, armed: true };
        let result = self.connect(id, &config, proof, voice_mode, &cancel).await;
        guard.disarm();

        match result {
            Ok(degraded) => {
                let event = SessionEvent::Connected { voice_mode, degraded };
                if self.shared.notify_if_live(id, event) {
                    Ok(())
                } else {
                    debug!(session_id = %id, "Session ended before start returned");
                    Err(SessionError::Cancelled)
                }
            }
            Err(_) if cancel.is_cancelled() => {
                debug!(session_id = %id, "Start abandoned after teardown");
                Err(SessionError::Cancelled)
            }
            Err(e) => {
                warn!(session_id = %id, "Failed to start session: {}", e);
                self.shared.finish(id, EndReason::Failed).await;
                self.shared.notifier.notify(SessionEvent::Failed { error: e.clone() });
                Err(e)
            }
        }
    }

    /// Returns whether voice chat was requested and failed
    async fn connect(
        &self,
        id: Uuid,
        config: &SessionConfig,
        proof: Option<VerificationProof>,
        voice_mode: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, SessionError> {
        let shared = &self.shared;

        // The exchange always runs to completion; teardown is noticed afterwards
        let credential = shared.token_source.fetch_credential(proof, config).await?;

        let opened = shared.with_session(id, |session| {
            session.credential = Some(credential.clone());
            session.connection_open = true;
        });
        if !opened {
            return Err(SessionError::Cancelled);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        shared
            .streaming
            .start_session(&credential, config, tx)
            .await
            .map_err(|e| SessionError::SessionInit(e.to_string()))?;
        if cancel.is_cancelled() {
            // Teardown may have run before the stream existed
            shared.stop_stream().await;
            return Err(SessionError::Cancelled);
        }

        let ready = tokio::select! {
            _ = cancel.cancelled() => {
                shared.stop_stream().await;
                return Err(SessionError::Cancelled);
            }
            ready = tokio::time::timeout(shared.settings.ready_timeout, wait_ready(&mut rx)) => ready,
        };
        match ready {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                return Err(SessionError::SessionInit(format!("stream closed before ready: {}", reason)));
            }
            Err(_) => {
                return Err(SessionError::SessionInit(format!(
                    "stream not ready after {:?}",
                    shared.settings.ready_timeout
                )));
            }
        }

        let deadline = match shared.mark_connected(id) {
            Some(deadline) => deadline,
            None => {
                shared.stop_stream().await;
                return Err(SessionError::Cancelled);
            }
        };
        info!(session_id = %id, "Avatar session connected");
        tokio::spawn(watch(shared.clone(), id, cancel.clone(), deadline, rx));

        let mut degraded = false;
        if voice_mode {
            if let Err(e) = shared.streaming.start_voice_chat(config).await {
                let err = SessionError::VoiceChat(e.to_string());
                warn!(session_id = %id, "Continuing without voice: {}", err);
                degraded = true;
            }
        } else if let Err(e) = shared.streaming.start_text_chat().await {
            warn!(session_id = %id, "Text chat setup failed: {}", e);
        }

        Ok(degraded)
    }

    /// Stop the connected session. No-op otherwise.
    pub async fn stop(&self) {
        let id = {
            let inner = self.shared.inner.lock();
            match (inner.state, inner.session.as_ref()) {
                (SessionState::Connected, Some(session)) => session.id,
                _ => {
                    debug!("Stop ignored in state {:?}", inner.state);
                    return;
                }
            }
        };
        self.shared.finish(id, EndReason::Stopped).await;
    }

    /// Page is about to unload. Tears the session down without waiting.
    pub fn on_page_unload(&self) -> UnloadPrompt {
        if self.teardown_detached(EndReason::PageUnload) {
            UnloadPrompt::Warn
        } else {
            UnloadPrompt::Proceed
        }
    }

    /// Unmount teardown, waiting for the connection to close.
    /// Runs whatever the state, including while a start is pending.
    pub async fn shutdown(&self) {
        if let Some(session) = self.shared.release(None) {
            self.shared.close(session, EndReason::Unmounted).await;
        }
    }

    /// Make the connected avatar say `text`
    pub async fn speak(&self, text: &str) -> Result<(), SessionError> {
        if self.state() != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.shared
            .streaming
            .speak(text)
            .await
            .map_err(|e| SessionError::Task(e.to_string()))
    }

    fn teardown_detached(&self, reason: EndReason) -> bool {
        self.shared.release_detached(None, reason)
    }
}

/// Releases the session when a `start` future is dropped before it completes
struct StartGuard {
    shared: Arc<Shared>,
    id: Uuid,
    armed: bool,
}

impl StartGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        if self.armed && self.shared.release_detached(Some(self.id), EndReason::Failed) {
            debug!(session_id = %self.id, "Start dropped before completing");
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.teardown_detached(EndReason::Unmounted);
    }
}

impl Shared {
    /// Apply `f` to the live session if it is still `id`
    fn with_session(&self, id: Uuid, f: impl FnOnce(&mut LiveSession)) -> bool {
        let mut inner = self.inner.lock();
        match inner.session.as_mut() {
            Some(session) if session.id == id => {
                f(session);
                true
            }
            _ => false,
        }
    }

    /// Connecting -> Connected, arming the termination timer
    fn mark_connected(&self, id: Uuid) -> Option<Instant> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let session = inner.session.as_mut().filter(|s| s.id == id)?;

        let timer = TerminationTimer::arm(self.settings.session_duration, self.armed_timers.clone());
        let deadline = timer.deadline();
        session.timer = Some(timer);
        inner.state = SessionState::Connected;
        Some(deadline)
    }

    /// Take the live session out (only if it is `id`, when given) and reset to Inactive.
    fn release(&self, id: Option<Uuid>) -> Option<LiveSession> {
        let mut inner = self.inner.lock();
        let matches = match (inner.session.as_ref(), id) {
            (Some(session), Some(id)) => session.id == id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            return None;
        }

        let mut session = inner.session.take()?;
        inner.state = SessionState::Inactive;
        session.cancel.cancel();
        session.timer = None;
        Some(session)
    }

    /// Release the session now and close the connection in the background
    fn release_detached(self: &Arc<Self>, id: Option<Uuid>, reason: EndReason) -> bool {
        let session = match self.release(id) {
            Some(session) => session,
            None => return false,
        };

        match Handle::try_current() {
            Ok(handle) => {
                let shared = self.clone();
                handle.spawn(async move { shared.close(session, reason).await });
            }
            Err(_) => {
                warn!(session_id = %session.id, "No runtime to close the stream; it will expire on the provider side");
            }
        }
        true
    }

    /// Emit `event` only while `id` is still the live session
    fn notify_if_live(&self, id: Uuid, event: SessionEvent) -> bool {
        let inner = self.inner.lock();
        if inner.session.as_ref().map(|s| s.id) != Some(id) {
            return false;
        }
        // Under the lock, so any teardown's Ended follows this event
        self.notifier.notify(event);
        true
    }

    async fn finish(&self, id: Uuid, reason: EndReason) -> bool {
        match self.release(Some(id)) {
            Some(session) => {
                self.close(session, reason).await;
                true
            }
            None => false,
        }
    }

    async fn close(&self, mut session: LiveSession, reason: EndReason) {
        if session.connection_open {
            self.stop_stream().await;
        }
        if session.credential.take().is_some() {
            debug!(session_id = %session.id, "Session credential dropped");
        }
        info!(session_id = %session.id, %reason, "Avatar session ended");

        if reason.notifies_user() {
            self.notifier.notify(SessionEvent::Ended { reason });
        }
    }

    async fn stop_stream(&self) {
        if let Err(e) = self.streaming.stop().await {
            warn!("Failed to stop {} stream: {}", self.streaming.provider_name(), e);
        }
    }
}

async fn wait_ready(rx: &mut StreamEventReceiver) -> Result<(), String> {
    match rx.recv().await {
        Some(StreamEvent::Ready) => Ok(()),
        Some(StreamEvent::Disconnected { reason }) => {
            Err(reason.unwrap_or_else(|| "disconnected".to_string()))
        }
        None => Err("event channel closed".to_string()),
    }
}

/// Resolves on the first disconnect. A closed channel never resolves.
async fn next_disconnect(rx: &mut StreamEventReceiver) {
    loop {
        match rx.recv().await {
            Some(StreamEvent::Disconnected { reason }) => {
                debug!("Stream disconnected: {}", reason.as_deref().unwrap_or("no reason"));
                return;
            }
            Some(StreamEvent::Ready) => continue,
            None => std::future::pending::<()>().await,
        }
    }
}

/// Per-session watcher: timer expiry, remote disconnect, or cancellation
async fn watch(
    shared: Arc<Shared>,
    id: Uuid,
    cancel: CancellationToken,
    deadline: Instant,
    mut rx: StreamEventReceiver,
) {
    let reason = tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep_until(deadline) => EndReason::TimedOut,
        _ = next_disconnect(&mut rx) => EndReason::Disconnected,
    };
    debug!(session_id = %id, %reason, "Session watcher fired");
    shared.finish(id, reason).await;
}
