//! Backoff-reporting peer link
//!
//! [`TrackedLink`] wraps any [`PeerLink`] and reports the outcome of every
//! send to the shared [`BackoffTracker`]. Probes pass straight through and
//! are not reported.

use std::sync::Arc;
use std::time::Duration;

use relaynet_core::{Envelope, Peer, PeerLink, SendReport};
use tracing::trace;

use crate::backoff::BackoffTracker;

/// A peer link that feeds the backoff tracker
#[derive(Clone)]
pub struct TrackedLink {
    inner: Arc<dyn PeerLink>,
    backoff: Arc<BackoffTracker>,
}

impl TrackedLink {
    /// Wrap a raw link
    pub fn new(inner: Arc<dyn PeerLink>, backoff: Arc<BackoffTracker>) -> Self {
        Self { inner, backoff }
    }

    /// The shared backoff tracker
    pub fn backoff(&self) -> &Arc<BackoffTracker> {
        &self.backoff
    }

    /// Whether the peer is out of its cooldown
    pub fn allow_attempt(&self, peer: &Peer) -> bool {
        self.backoff.allow_attempt(&peer.name)
    }

    /// One attempt, reported to the backoff tracker
    pub async fn send(&self, peer: &Peer, envelope: &Envelope) -> SendReport {
        let report = self.inner.send(peer, envelope).await;
        if report.success {
            self.backoff.on_success(&peer.name);
        } else {
            let cooldown = self.backoff.on_failure(&peer.name);
            trace!(peer = %peer.name, cooldown_ms = cooldown.as_millis() as u64, "Peer cooling down");
        }
        report
    }

    /// Bare reachability check
    pub async fn probe(&self, peer: &Peer, timeout: Duration) -> bool {
        self.inner.probe(peer, timeout).await
    }
}

impl std::fmt::Debug for TrackedLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedLink")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
