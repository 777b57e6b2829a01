//! Mock peer link for testing
//!
//! Provides an in-memory [`PeerLink`] whose reachability can be flipped per
//! peer at runtime, so forwarding and healing logic can be exercised
//! without sockets.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relaynet_core::{MockPeerLink, Peer, PeerLink};
//!
//! let link = MockPeerLink::new();
//! link.set_reachable("nodeC", false);
//!
//! let report = link.send(&Peer::new("nodeC", 5002), &envelope).await;
//! assert!(!report.success);
//! assert_eq!(link.attempts_to("nodeC"), 1);
//! ```

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::envelope::{Ack, Envelope};
use crate::link::{PeerLink, SendReport};
use crate::peer::Peer;

/// One recorded call on the mock link
#[derive(Debug, Clone)]
pub struct MockAttempt {
    /// Peer that was dialed
    pub peer: String,
    /// Envelope as it was handed to the link
    pub envelope: Envelope,
    /// Whether the attempt was reported as successful
    pub success: bool,
}

/// A scripted in-memory peer link
///
/// Peers are reachable unless marked otherwise. `fail_next` queues a number
/// of forced failures for a peer that are consumed before reachability is
/// consulted.
#[derive(Debug, Default)]
pub struct MockPeerLink {
    /// Per-peer reachability (peer name -> reachable)
    reachable: DashMap<String, bool>,
    /// Forced failures still pending per peer
    scripted_failures: DashMap<String, u32>,
    /// Every send, in call order
    attempts: Mutex<Vec<MockAttempt>>,
    /// Every probe, in call order
    probes: Mutex<Vec<String>>,
    /// Simulated latency per send
    latency: Mutex<Duration>,
}

impl MockPeerLink {
    /// Create a link where every peer is reachable
    pub fn new() -> Self {
        Self::default()
    }

    /// Set simulated per-send latency
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    /// Mark a peer as reachable or unreachable
    pub fn set_reachable(&self, peer: &str, reachable: bool) {
        self.reachable.insert(peer.to_string(), reachable);
    }

    /// Force the next `count` sends to `peer` to fail
    pub fn fail_next(&self, peer: &str, count: u32) {
        *self.scripted_failures.entry(peer.to_string()).or_insert(0) += count;
    }

    /// Whether a peer is currently reachable
    pub fn is_reachable(&self, peer: &str) -> bool {
        self.reachable.get(peer).map(|r| *r).unwrap_or(true)
    }

    /// All recorded sends, in order
    pub fn attempts(&self) -> Vec<MockAttempt> {
        self.attempts.lock().clone()
    }

    /// Number of sends to one peer
    pub fn attempts_to(&self, peer: &str) -> usize {
        self.attempts.lock().iter().filter(|a| a.peer == peer).count()
    }

    /// Sequence of peer names dialed, in order
    pub fn dialed(&self) -> Vec<String> {
        self.attempts.lock().iter().map(|a| a.peer.clone()).collect()
    }

    /// Envelopes successfully handed to one peer
    pub fn delivered_to(&self, peer: &str) -> Vec<Envelope> {
        self.attempts
            .lock()
            .iter()
            .filter(|a| a.peer == peer && a.success)
            .map(|a| a.envelope.clone())
            .collect()
    }

    /// Number of probes sent to one peer
    pub fn probes_to(&self, peer: &str) -> usize {
        self.probes.lock().iter().filter(|p| *p == peer).count()
    }

    /// Forget all recorded sends and probes
    pub fn clear(&self) {
        self.attempts.lock().clear();
        self.probes.lock().clear();
    }

    fn take_scripted_failure(&self, peer: &str) -> bool {
        match self.scripted_failures.get_mut(peer) {
            Some(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl PeerLink for MockPeerLink {
    async fn send(&self, peer: &Peer, envelope: &Envelope) -> SendReport {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let success = !self.take_scripted_failure(&peer.name) && self.is_reachable(&peer.name);

        self.attempts.lock().push(MockAttempt {
            peer: peer.name.clone(),
            envelope: envelope.clone(),
            success,
        });

        if success {
            let bytes = envelope.to_line().map(|line| line.len()).unwrap_or(0);
            SendReport::delivered(bytes, latency).with_ack(Ack::accepted(envelope.id, &peer.name))
        } else {
            SendReport::failed(latency)
        }
    }

    async fn probe(&self, peer: &Peer, _timeout: Duration) -> bool {
        self.probes.lock().push(peer.name.clone());
        self.is_reachable(&peer.name)
    }
}
