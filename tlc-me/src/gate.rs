//! Verification gate: one bot-check challenge instance at a time
//!
//! The widget itself is rendered elsewhere; this side hands out challenge
//! instances and accepts the widget's completion callback. Mounting again
//! creates a fresh instance, and proofs reported for a superseded instance
//! are refused.

use crate::error::GateError;
use parking_lot::Mutex;
use tlc_core::VerificationProof;
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub struct HumanGate {
    site_key: String,
    inner: Mutex<GateInner>,
}

struct GateInner {
    generation: u64,
    pending: Option<(u64, oneshot::Sender<VerificationProof>)>,
}

/// A mounted challenge instance
pub struct Challenge {
    instance: u64,
    site_key: String,
    rx: oneshot::Receiver<VerificationProof>,
}

impl HumanGate {
    pub fn new(site_key: impl Into<String>) -> Self {
        Self {
            site_key: site_key.into(),
            inner: Mutex::new(GateInner {
                generation: 0,
                pending: None,
            }),
        }
    }

    pub fn site_key(&self) -> &str {
        &self.site_key
    }

    /// Mount a fresh challenge. Any previous instance is abandoned.
    pub fn mount(&self) -> Challenge {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        inner.generation += 1;
        let instance = inner.generation;
        if let Some((old, _)) = inner.pending.replace((instance, tx)) {
            debug!("Challenge {} superseded by {}", old, instance);
        }

        Challenge {
            instance,
            site_key: self.site_key.clone(),
            rx,
        }
    }

    /// Widget completion callback for `instance`.
    pub fn complete(&self, instance: u64, token: &str) -> Result<(), GateError> {
        if token.trim().is_empty() {
            return Err(GateError::EmptyProof);
        }

        let mut inner = self.inner.lock();
        if instance != inner.generation {
            warn!("Ignoring proof from stale challenge {} (current {})", instance, inner.generation);
            return Err(GateError::StaleChallenge(instance));
        }

        let (_, tx) = inner.pending.take().ok_or(GateError::AlreadyCompleted)?;
        tx.send(VerificationProof::new(token))
            .map_err(|_| GateError::Abandoned)
    }
}

impl Challenge {
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn site_key(&self) -> &str {
        &self.site_key
    }

    /// Resolves once the user completes this instance.
    /// Never resolves for a challenge that is neither completed nor replaced.
    pub async fn verified(self) -> Result<VerificationProof, GateError> {
        self.rx.await.map_err(|_| GateError::Abandoned)
    }
}
