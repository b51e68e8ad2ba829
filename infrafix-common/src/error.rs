//! Error type for the InfraFix storage and configuration layer
//!
//! Request-level failures (authorization, missing reports) belong to the
//! server's `ApiError`; this type only covers what the shared library
//! itself can get wrong.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable or unparsable configuration file
    #[error("Configuration error: {0}")]
    Config(String),

    /// Value rejected while parsing (role, status, evaluation label)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Stored data that no longer parses
    #[error("Internal error: {0}")]
    Internal(String),
}
