//! Error types for ringnet.

use thiserror::Error;

/// Main error type for all ring operations.
#[derive(Debug, Error)]
pub enum RingError {
    /// I/O error on a ring or bridge link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error (malformed frame, bad address, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration detected at construction.
    #[error("Config error: {0}")]
    Config(String),

    /// The predecessor or successor link closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias using RingError.
pub type Result<T> = std::result::Result<T, RingError>;
