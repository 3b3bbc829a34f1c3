//! Error types for proposal validation

use rollshrew_p2p::P2pError;
use rollshrew_support::Fr;
use rollshrew_world_state::WorldStateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("Invalid proposer {proposer} for slot {slot}")]
    InvalidProposer { slot: u64, proposer: String },

    #[error("Archive root mismatch: expected {expected}, got {actual}")]
    ArchiveMismatch { expected: Fr, actual: Fr },

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Committee source error: {0}")]
    Committee(String),

    #[error("World state error: {0}")]
    WorldState(#[from] WorldStateError),

    #[error("P2P error: {0}")]
    P2p(#[from] P2pError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub type ValidatorResult<T> = Result<T, ValidatorError>;
