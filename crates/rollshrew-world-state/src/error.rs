//! Error types for the world state

use rollshrew_trees::{MerkleTreeId, TreeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorldStateError {
    #[error("Fork based on block {base_block} is stale, committed block is now {committed_block}")]
    StaleFork {
        base_block: u32,
        committed_block: u32,
    },

    #[error("A writer fork is already open")]
    WriterBusy,

    #[error("Fork is read-only and cannot be committed")]
    ReadOnlyFork,

    #[error("No snapshot retained for block {0}")]
    SnapshotNotFound(u32),

    #[error("Operation {operation} is not supported on {tree}")]
    UnsupportedOperation {
        tree: MerkleTreeId,
        operation: &'static str,
    },

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("World state lock poisoned")]
    LockPoisoned,

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub type WorldStateResult<T> = Result<T, WorldStateError>;
