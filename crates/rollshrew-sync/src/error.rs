//! Error types for block stream synchronization

use rollshrew_support::Fr;
use rollshrew_world_state::WorldStateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Block source error: {0}")]
    BlockSource(String),

    #[error("Event handler error: {0}")]
    Handler(String),

    #[error("Block {number} mismatch: expected {expected}, got {actual}")]
    BlockMismatch { number: u32, expected: Fr, actual: Fr },

    #[error("World state error: {0}")]
    WorldState(#[from] WorldStateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
