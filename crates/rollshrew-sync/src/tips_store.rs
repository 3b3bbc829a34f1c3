//! In-memory local chain tips

use crate::error::SyncResult;
use crate::traits::{L2BlockStreamEventHandler, L2BlockStreamLocalDataProvider};
use crate::types::L2BlockStreamEvent;
use async_trait::async_trait;
use log::debug;
use rollshrew_support::{Fr, L2BlockId, L2Tips};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

struct TipsState {
    tips: L2Tips,
    /// Hashes from the finalized block up to latest.
    hashes: BTreeMap<u32, Fr>,
}

/// Tracks tips and block hashes from the events it handles, and serves them
/// back as the stream's local data.
pub struct L2TipsStore {
    state: RwLock<TipsState>,
}

impl L2TipsStore {
    pub fn new(genesis_hash: Fr) -> Self {
        let genesis = L2BlockId::new(0, genesis_hash);
        Self {
            state: RwLock::new(TipsState {
                tips: L2Tips {
                    latest: genesis,
                    proven: genesis,
                    finalized: genesis,
                },
                hashes: BTreeMap::from([(0, genesis_hash)]),
            }),
        }
    }
}

#[async_trait]
impl L2BlockStreamLocalDataProvider for L2TipsStore {
    async fn get_l2_tips(&self) -> SyncResult<L2Tips> {
        Ok(self.state.read().await.tips)
    }

    async fn get_l2_block_hash(&self, number: u32) -> SyncResult<Option<Fr>> {
        Ok(self.state.read().await.hashes.get(&number).copied())
    }
}

#[async_trait]
impl L2BlockStreamEventHandler for L2TipsStore {
    async fn handle_block_stream_event(&self, event: L2BlockStreamEvent) -> SyncResult<()> {
        let mut state = self.state.write().await;
        match event {
            L2BlockStreamEvent::BlocksAdded { blocks } => {
                for block in &blocks {
                    state.hashes.insert(block.number(), block.hash());
                }
                if let Some(last) = blocks.last() {
                    state.tips.latest = last.id();
                }
            }
            L2BlockStreamEvent::ChainPruned { block } => {
                state.hashes.retain(|number, _| *number <= block.number);
                state.tips.latest = block;
                if state.tips.proven.number > block.number {
                    state.tips.proven = block;
                }
                if state.tips.finalized.number > block.number {
                    state.tips.finalized = block;
                }
            }
            L2BlockStreamEvent::ChainProven { block } => {
                state.tips.proven = block;
            }
            L2BlockStreamEvent::ChainFinalized { block } => {
                state.tips.finalized = block;
                state.hashes.retain(|number, _| *number >= block.number);
            }
        }
        debug!("Local tips now {:?}", state.tips);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prune_drops_later_hashes() -> anyhow::Result<()> {
        let store = L2TipsStore::new(Fr::from(1));
        let id = |n: u32| L2BlockId::new(n, Fr::from(100 + u64::from(n)));
        store
            .handle_block_stream_event(L2BlockStreamEvent::ChainProven { block: id(0) })
            .await?;
        {
            let mut state = store.state.write().await;
            for n in 1..=5 {
                state.hashes.insert(n, id(n).hash);
            }
            state.tips.latest = id(5);
            state.tips.proven = id(4);
        }

        store
            .handle_block_stream_event(L2BlockStreamEvent::ChainPruned { block: id(2) })
            .await?;
        let tips = store.get_l2_tips().await?;
        assert_eq!(tips.latest, id(2));
        assert_eq!(tips.proven, id(2));
        assert_eq!(store.get_l2_block_hash(2).await?, Some(id(2).hash));
        assert_eq!(store.get_l2_block_hash(3).await?, None);

        store
            .handle_block_stream_event(L2BlockStreamEvent::ChainFinalized { block: id(1) })
            .await?;
        assert_eq!(store.get_l2_block_hash(0).await?, None);
        assert_eq!(store.get_l2_block_hash(1).await?, Some(id(1).hash));
        Ok(())
    }
}
