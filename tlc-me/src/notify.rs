//! User-facing session notifications

use crate::error::SessionError;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Session duration elapsed
    TimedOut,
    /// User pressed stop
    Stopped,
    /// Provider closed the stream
    Disconnected,
    PageUnload,
    Unmounted,
    /// Start failed after the connection was opened
    Failed,
}

impl EndReason {
    /// Teardown during unload/unmount and failed starts are not announced as an ended session
    pub fn notifies_user(&self) -> bool {
        matches!(self, EndReason::TimedOut | EndReason::Stopped | EndReason::Disconnected)
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndReason::TimedOut => "timed_out",
            EndReason::Stopped => "stopped",
            EndReason::Disconnected => "disconnected",
            EndReason::PageUnload => "page_unload",
            EndReason::Unmounted => "unmounted",
            EndReason::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected {
        voice_mode: bool,
        /// Voice chat was requested but did not start
        degraded: bool,
    },
    Ended { reason: EndReason },
    Failed { error: SessionError },
}

/// Sink for notifications shown to the user.
///
/// `notify` may run while the controller holds its state lock, so it must
/// not call back into the controller.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: SessionEvent);
}

/// Logs every event; the default sink when no UI is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { voice_mode, degraded } => {
                info!(voice_mode, degraded, "Avatar session connected");
            }
            SessionEvent::Ended { reason } => {
                info!(%reason, "Avatar session ended");
            }
            SessionEvent::Failed { error } => {
                warn!(%error, "Avatar session failed");
            }
        }
    }
}

/// Forwards events to a channel
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: SessionEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}
