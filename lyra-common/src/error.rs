//! Common error types for Lyra

use thiserror::Error;

/// Common result type for Lyra operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the shared components: position stores, media scanning and
/// value parsing
#[derive(Error, Debug)]
pub enum Error {
    /// Position store query failed
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Reading file metadata or creating the data directory failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A value that does not parse (fade curve names and the like)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
