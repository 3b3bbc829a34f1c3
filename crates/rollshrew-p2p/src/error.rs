//! Error types for the peer-to-peer layer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum P2pError {
    #[error("Transport error talking to {peer}: {message}")]
    Transport { peer: String, message: String },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Request to {peer} timed out after {timeout_ms}ms")]
    Timeout { peer: String, timeout_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub type P2pResult<T> = Result<T, P2pError>;
