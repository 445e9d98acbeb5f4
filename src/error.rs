// src/error.rs

use thiserror::Error;

/// Core error types for Pakt
#[derive(Error, Debug)]
pub enum Error {
    /// State database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed package descriptor or version string
    #[error("Parse error: {0}")]
    Parse(String),

    /// Declared digest does not match the recomputed content digest
    #[error("Integrity error: expected sumsha {expected}, computed {actual}")]
    Integrity { expected: String, actual: String },

    /// Name or digest unresolved against the index or installed state
    #[error("Not found: {0}")]
    NotFound(String),

    /// No indexed version meets a dependency constraint, or removal
    /// would break another installed package
    #[error("Unsatisfiable: {0}")]
    Unsatisfiable(String),

    /// Two required packages declare mutual exclusion
    #[error("Conflict between {first} and {second}")]
    Conflict { first: String, second: String },

    /// Network or download failures
    #[error("Download error: {0}")]
    Download(String),

    /// Prefix or database initialization errors
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Result type alias using Pakt's Error type
pub type Result<T> = std::result::Result<T, Error>;
