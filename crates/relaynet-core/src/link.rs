//! Peer link abstraction
//!
//! The [`PeerLink`] trait performs exactly one outbound attempt to one
//! neighbor. It never retries, never consults backoff state and never
//! fails with an error: every outcome is folded into a [`SendReport`].
//!
//! ## Implementations
//!
//! - [`MockPeerLink`](crate::MockPeerLink): scripted in-memory link for tests
//! - `TcpPeerLink`: newline-framed JSON over TCP (in relaynet-transport)

use std::time::Duration;

use async_trait::async_trait;

use crate::envelope::{Ack, Envelope};
use crate::peer::Peer;

/// Outcome of a single outbound attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Whether the envelope was handed over
    pub success: bool,
    /// Wall time spent on the attempt
    pub elapsed: Duration,
    /// Bytes written to the peer
    pub bytes: usize,
    /// Acknowledgment read back from the peer, if one was requested
    pub ack: Option<Ack>,
}

impl SendReport {
    /// A successful attempt
    pub fn delivered(bytes: usize, elapsed: Duration) -> Self {
        Self {
            success: true,
            elapsed,
            bytes,
            ack: None,
        }
    }

    /// A failed attempt
    pub fn failed(elapsed: Duration) -> Self {
        Self {
            success: false,
            elapsed,
            bytes: 0,
            ack: None,
        }
    }

    /// Attach the acknowledgment read from the peer
    pub fn with_ack(mut self, ack: Ack) -> Self {
        self.ack = Some(ack);
        self
    }

    /// Elapsed time in whole milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// One outbound attempt to one neighbor
///
/// # Example
///
/// ```rust,ignore
/// use relaynet_core::{Envelope, Peer, PeerLink};
///
/// async fn hand_off<L: PeerLink>(link: &L, peer: &Peer, env: &Envelope) -> bool {
///     link.send(peer, env).await.success
/// }
/// ```
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Open a connection, write the envelope and close
    ///
    /// Bounded by the link's connect timeout. Failures are reported, not
    /// raised.
    async fn send(&self, peer: &Peer, envelope: &Envelope) -> SendReport;

    /// Check whether the peer accepts connections, without sending anything
    async fn probe(&self, peer: &Peer, timeout: Duration) -> bool;
}

#[async_trait]
impl<L: PeerLink + ?Sized> PeerLink for std::sync::Arc<L> {
    async fn send(&self, peer: &Peer, envelope: &Envelope) -> SendReport {
        (**self).send(peer, envelope).await
    }

    async fn probe(&self, peer: &Peer, timeout: Duration) -> bool {
        (**self).probe(peer, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeId;

    #[test]
    fn test_report_constructors() {
        let ok = SendReport::delivered(42, Duration::from_millis(7));
        assert!(ok.success);
        assert_eq!(ok.bytes, 42);
        assert_eq!(ok.elapsed_ms(), 7);
        assert!(ok.ack.is_none());

        let failed = SendReport::failed(Duration::from_secs(5));
        assert!(!failed.success);
        assert_eq!(failed.bytes, 0);
        assert_eq!(failed.elapsed_ms(), 5000);
    }

    #[test]
    fn test_report_with_ack() {
        let report = SendReport::delivered(1, Duration::ZERO)
            .with_ack(Ack::accepted(EnvelopeId::new_v4(), "B"));
        assert!(report.ack.unwrap().ok);
    }
}
