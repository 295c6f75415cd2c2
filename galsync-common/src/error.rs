//! Common error types for galsync

use thiserror::Error;

/// Common result type for galsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across galsync crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error (wraps csv::Error)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required column missing from an input table
    #[error("Schema error: {0}")]
    Schema(String),

    /// Invalid user input or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
