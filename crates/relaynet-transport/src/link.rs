//! TCP peer link
//!
//! [`TcpPeerLink`] opens a fresh TCP connection per attempt (no pooling),
//! writes one newline-terminated envelope and optionally waits for an ack
//! line. The whole attempt is bounded by the connect timeout.

use std::time::Duration;

use async_trait::async_trait;
use relaynet_core::{Ack, Envelope, LinkError, Peer, PeerLink, SendReport};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::protocol::{MAX_FRAME_BYTES, frame_envelope, read_ack};

/// Configuration for outbound attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpLinkConfig {
    /// Bound on one attempt (connect, write and optional ack)
    pub connect_timeout: Duration,
    /// Wait for an ack line and treat a missing or negative one as failure
    pub expect_ack: bool,
    /// Dial every peer at this host instead of its name
    pub dial_host: Option<String>,
    /// Largest envelope that will be sent
    pub max_frame_bytes: usize,
}

impl Default for TcpLinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            expect_ack: false,
            dial_host: None,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

/// Newline-framed JSON over plain TCP
#[derive(Debug, Clone, Default)]
pub struct TcpPeerLink {
    config: TcpLinkConfig,
}

impl TcpPeerLink {
    /// Create a link with the given configuration
    pub fn new(config: TcpLinkConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub fn config(&self) -> &TcpLinkConfig {
        &self.config
    }

    /// Address dialed for a peer
    pub fn address_of(&self, peer: &Peer) -> String {
        let host = self.config.dial_host.as_deref().unwrap_or(&peer.name);
        format!("{}:{}", host, peer.port)
    }

    async fn attempt(&self, peer: &Peer, envelope: &Envelope) -> Result<(usize, Option<Ack>), LinkError> {
        let frame = frame_envelope(envelope, self.config.max_frame_bytes)
            .map_err(|e| LinkError::Send(e.to_string()))?;

        let mut stream = TcpStream::connect(self.address_of(peer))
            .await
            .map_err(|e| LinkError::Connect {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;

        stream
            .write_all(&frame)
            .await
            .map_err(|e| LinkError::Send(e.to_string()))?;

        if !self.config.expect_ack {
            // closing is best effort; the frame is already on the wire
            let _ = stream.shutdown().await;
            return Ok((frame.len(), None));
        }

        let mut reader = BufReader::new(stream);
        let ack = read_ack(&mut reader).await.map_err(|e| match e {
            crate::protocol::FramingError::Empty => LinkError::MissingAck,
            other => LinkError::MalformedAck(other.to_string()),
        })?;
        if !ack.ok {
            return Err(LinkError::Rejected(
                ack.error.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        Ok((frame.len(), Some(ack)))
    }
}

#[async_trait]
impl PeerLink for TcpPeerLink {
    #[instrument(skip(self, envelope), fields(peer = %peer.name, envelope_id = %envelope.id))]
    async fn send(&self, peer: &Peer, envelope: &Envelope) -> SendReport {
        let start = Instant::now();
        let timeout = self.config.connect_timeout;

        let result = match tokio::time::timeout(timeout, self.attempt(peer, envelope)).await {
            Ok(result) => result,
            Err(_) => Err(LinkError::Timeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        };

        match result {
            Ok((bytes, ack)) => {
                let report = SendReport::delivered(bytes, start.elapsed());
                match ack {
                    Some(ack) => report.with_ack(ack),
                    None => report,
                }
            }
            Err(e) => {
                debug!(addr = %self.address_of(peer), error = %e, "Send attempt failed");
                SendReport::failed(start.elapsed())
            }
        }
    }

    async fn probe(&self, peer: &Peer, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect(self.address_of(peer))).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(peer = %peer.name, error = %e, "Probe refused");
                false
            }
            Err(_) => {
                debug!(peer = %peer.name, "Probe timed out");
                false
            }
        }
    }
}
