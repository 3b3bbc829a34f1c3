//! Error types for tree operations

use rollshrew_support::Fr;
use thiserror::Error;

/// Errors raised by tree mutations and lookups.
///
/// The structural variants are deterministic and never leave a tree half
/// mutated: capacity and duplicate checks run before any state is touched.
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Tree is full: capacity {capacity}, requested {requested} more leaves at size {size}")]
    TreeFull {
        capacity: u128,
        size: u64,
        requested: u64,
    },

    #[error("Index {index} out of range for tree of size {size}")]
    IndexOutOfRange { index: u64, size: u64 },

    #[error("Duplicate key not allowed: {key:?}")]
    DuplicateKey { key: Fr },

    #[error("Invalid tree depth: {0}")]
    InvalidDepth(u8),

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Invalid tree state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub type TreeResult<T> = Result<T, TreeError>;
