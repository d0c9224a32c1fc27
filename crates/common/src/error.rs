//! Common error types for ledgersync.

use thiserror::Error;

/// Common result type for ledgersync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for ledgersync.
#[derive(Error, Debug)]
pub enum Error {
    /// Binary encoding/decoding error.
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid data.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}
