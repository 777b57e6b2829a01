//! Transport layer error types

pub use crate::protocol::FramingError;

use thiserror::Error;

/// Unified transport error type
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind {addr} after {attempts} attempts: {source}")]
    Bind {
        addr: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Protocol framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
