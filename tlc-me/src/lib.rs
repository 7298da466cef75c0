//! tlc-me: client side of a gated avatar session
//!
//! - Verification gate (one challenge instance at a time)
//! - Token source for the server's token endpoint
//! - Streaming provider abstraction with a HeyGen REST implementation
//! - Session lifecycle controller with a termination timer and teardown paths

pub mod error;
pub mod gate;
pub mod token_source;
pub mod streaming;
pub mod providers;
pub mod notify;
pub mod timer;
pub mod controller;

pub use error::{GateError, SessionError, StreamingError};
pub use gate::{Challenge, HumanGate};
pub use token_source::{HttpTokenSource, TokenSource};
pub use streaming::{StreamEvent, StreamEventSender, StreamingClient};
pub use providers::HeyGenStreamingClient;
pub use notify::{ChannelSink, EndReason, NotificationSink, SessionEvent, TracingSink};
pub use timer::TerminationTimer;
pub use controller::{SessionController, SessionSettings, SessionState, Selection, UnloadPrompt};
