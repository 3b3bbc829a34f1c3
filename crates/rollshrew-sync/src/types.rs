//! Block stream events

use rollshrew_support::{L2Block, L2BlockId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum L2BlockStreamEvent {
    BlocksAdded { blocks: Vec<L2Block> },
    /// Everything after `block` was reorged away.
    ChainPruned { block: L2BlockId },
    ChainProven { block: L2BlockId },
    ChainFinalized { block: L2BlockId },
}

impl L2BlockStreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            L2BlockStreamEvent::BlocksAdded { .. } => "blocks-added",
            L2BlockStreamEvent::ChainPruned { .. } => "chain-pruned",
            L2BlockStreamEvent::ChainProven { .. } => "chain-proven",
            L2BlockStreamEvent::ChainFinalized { .. } => "chain-finalized",
        }
    }
}
