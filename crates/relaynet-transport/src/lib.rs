//! # Relaynet Transport
//!
//! TCP transport for relaynet.
//!
//! Provides the outbound [`TcpPeerLink`] used by the forwarding engine and
//! the [`InboundListener`] that accepts envelopes from neighbors.
//!
//! ## Features
//!
//! - One short-lived TCP connection per envelope, no pooling
//! - Newline-terminated JSON frames (end of stream also accepted inbound)
//! - Optional single-line acknowledgments
//! - Semaphore-capped connection handling with bind retry
//!
//! ## Example
//!
//! ```rust,ignore
//! use relaynet_transport::{InboundListener, ListenerConfig, TcpLinkConfig, TcpPeerLink};
//!
//! // Outbound attempts
//! let link = TcpPeerLink::new(TcpLinkConfig::default());
//!
//! // Accept envelopes for the engine
//! let listener = InboundListener::bind(ListenerConfig::default(), engine).await?;
//! let handle = listener.spawn(shutdown_rx);
//! ```

pub mod error;
pub mod link;
pub mod listener;
pub mod protocol;

// Re-export main types
pub use error::{TransportError, TransportResult};
pub use link::{TcpLinkConfig, TcpPeerLink};
pub use listener::{InboundListener, ListenerConfig};
pub use protocol::{
    FramingError, MAX_ACK_BYTES, MAX_FRAME_BYTES, frame_ack, frame_envelope, read_ack,
    read_envelope, read_frame,
};
