//! Error types for the collision search

use thiserror::Error;

/// Errors surfaced by the search and its I/O collaborators.
///
/// A failed bit condition is not an error: it only sends the search back to
/// the enclosing enumeration.
#[derive(Error, Debug)]
pub enum CollisionError {
    #[error("Incorrect mask parameters (strength {strength}): {detail}")]
    InvalidMaskParameters { strength: usize, detail: String },

    #[error("{stage} search exhausted its budget after {attempts} attempts")]
    SearchExhausted { stage: Stage, attempts: u64 },

    #[error("{stage} search cancelled after {attempts} attempts")]
    Cancelled { stage: Stage, attempts: u64 },

    #[error("Invalid hex value: {0:?}")]
    InvalidHex(String),

    #[error("Expected 0, 1, 4 or 5 hex values, got {0}")]
    InvalidArgumentCount(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Search stage an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Block1,
    Block2,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Block1 => write!(f, "Block 1"),
            Stage::Block2 => write!(f, "Block 2"),
        }
    }
}

/// Result type alias for collision search operations
pub type CollisionResult<T> = std::result::Result<T, CollisionError>;
