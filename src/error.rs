//! Typed errors for the classification core.

use thiserror::Error;

/// Result type used throughout the classification core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the lexicon, history store, and feedback processor.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Requested resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Feedback submitted for a history record that has already been
    /// resolved. Each record resolves exactly once; the losing caller of a
    /// concurrent submission receives this.
    #[error("history record {0} is already resolved")]
    AlreadyResolved(i64),

    /// Invalid caller input, rejected before any transaction starts.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The external label detector failed or is not configured.
    #[error("label provider error: {0}")]
    LabelProvider(String),

    /// Stored data that no longer decodes (e.g. an unknown feedback state
    /// string or a malformed labels snapshot).
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}
