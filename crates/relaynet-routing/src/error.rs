//! Routing error types

use thiserror::Error;

pub use relaynet_core::ConfigError;

/// Errors raised by the routing crate
///
/// Forwarding itself never fails with an error (failures are expressed as a
/// [`ForwardOutcome`](crate::ForwardOutcome)); these cover construction.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// The static topology is inconsistent
    #[error("Topology error: {0}")]
    Topology(#[from] ConfigError),

    /// A tuning value is out of range
    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
