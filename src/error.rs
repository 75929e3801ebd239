use thiserror::Error;

/// Caller contract violations detected by the matching core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Embedding dimensionality differs from the reference database
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding is empty")]
    EmptyEmbedding,

    #[error("embedding contains a non-finite value at index {0}")]
    NonFiniteEmbedding(usize),

    /// Label cannot name a single output folder
    #[error("invalid label {0:?}")]
    InvalidLabel(String),
}

pub type Result<T> = std::result::Result<T, Error>;
