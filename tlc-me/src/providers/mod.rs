//! Streaming avatar provider implementations

pub mod heygen;
pub use heygen::HeyGenStreamingClient;
