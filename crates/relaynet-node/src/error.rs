//! Error types for the relay node

use relaynet_core::ConfigError;
use relaynet_routing::RoutingError;
use relaynet_transport::TransportError;
use thiserror::Error;

/// Errors that can occur in the relay node
#[derive(Debug, Error)]
pub enum NodeError {
    /// Static topology could not be parsed or is inconsistent
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A tuning value is out of range
    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    /// Routing layer rejected its configuration
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Node already started
    #[error("Node already started")]
    AlreadyStarted,
}

/// Result type alias for node operations
pub type NodeResult<T> = Result<T, NodeError>;
