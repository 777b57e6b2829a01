//! Error types for relaynet

use thiserror::Error;

/// Errors raised while parsing the static topology
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid peer entry '{0}': expected name:port")]
    InvalidPeer(String),

    #[error("Invalid route entry '{0}': expected destination:next_hop:port")]
    InvalidRoute(String),

    #[error("Invalid port in '{entry}': {port}")]
    InvalidPort { entry: String, port: String },

    #[error("Route to {destination} points at {next_hop}, which is not a configured neighbor")]
    UnknownNextHop {
        destination: String,
        next_hop: String,
    },

    #[error("Duplicate peer: {0}")]
    DuplicatePeer(String),
}

/// Errors raised at the envelope parse boundary
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Malformed envelope JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Empty frame")]
    Empty,
}

/// Errors from a single outbound attempt
///
/// These never cross the [`PeerLink`](crate::PeerLink) contract; they are
/// logged by the link and collapsed into a failed report.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Connect to {peer} failed: {reason}")]
    Connect { peer: String, reason: String },

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Missing acknowledgment")]
    MissingAck,

    #[error("Malformed acknowledgment: {0}")]
    MalformedAck(String),

    #[error("Peer rejected envelope: {0}")]
    Rejected(String),
}
