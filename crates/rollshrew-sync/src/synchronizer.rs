//! Keeping the world state in step with the block stream

use crate::error::{SyncError, SyncResult};
use crate::traits::{L2BlockStreamEventHandler, L2BlockStreamLocalDataProvider};
use crate::types::L2BlockStreamEvent;
use async_trait::async_trait;
use log::{debug, info};
use rollshrew_support::{Fr, L2Block, L2BlockId, L2Tips};
use rollshrew_trees::{Hasher, KeyValueStoreLike};
use rollshrew_world_state::WorldState;
use tokio::sync::RwLock;

/// Applies published blocks to a [`WorldState`].
///
/// The latest tip is the world state's committed block, with block hashes
/// read from the archive tree. Proven and finalized pointers are tracked
/// alongside.
pub struct WorldStateSynchronizer<H: Hasher, S: KeyValueStoreLike> {
    world_state: WorldState<H, S>,
    proven: RwLock<L2BlockId>,
    finalized: RwLock<L2BlockId>,
}

impl<H, S> WorldStateSynchronizer<H, S>
where
    H: Hasher,
    S: KeyValueStoreLike + Send + 'static,
{
    pub fn new(world_state: WorldState<H, S>) -> SyncResult<Self> {
        let genesis_hash = world_state.committed()?.block_hash(0)?.unwrap_or(Fr::ZERO);
        let genesis = L2BlockId::new(0, genesis_hash);
        Ok(Self {
            world_state,
            proven: RwLock::new(genesis),
            finalized: RwLock::new(genesis),
        })
    }

    pub fn world_state(&self) -> &WorldState<H, S> {
        &self.world_state
    }

    fn latest(&self) -> SyncResult<L2BlockId> {
        let committed = self.world_state.committed()?;
        let number = committed.block_number();
        let hash = committed.block_hash(number)?.unwrap_or(Fr::ZERO);
        Ok(L2BlockId::new(number, hash))
    }

    /// Apply one block on a fresh fork and commit it if it reproduces the
    /// published header and archive root. Blocks already applied are skipped.
    fn apply_block(&self, block: &L2Block) -> SyncResult<()> {
        let number = block.number();
        let committed = self.world_state.committed()?;
        let current = committed.block_number();
        if number <= current {
            let local = committed.block_hash(number)?.unwrap_or(Fr::ZERO);
            if local != block.hash() {
                return Err(SyncError::BlockMismatch {
                    number,
                    expected: local,
                    actual: block.hash(),
                });
            }
            debug!("Block {} already applied", number);
            return Ok(());
        }
        if number != current + 1 {
            return Err(SyncError::Handler(format!(
                "block {} does not follow committed block {}",
                number, current
            )));
        }

        let mut fork = self.world_state.fork(None)?;
        let built = fork.build_block(
            block.header.slot_number,
            &block.txs,
            &block.l1_to_l2_messages,
        )?;
        if built.header != block.header || built.archive_root != block.archive_root {
            return Err(SyncError::BlockMismatch {
                number,
                expected: block.archive_root,
                actual: built.archive_root,
            });
        }
        self.world_state.commit(fork)?;
        Ok(())
    }
}

#[async_trait]
impl<H, S> L2BlockStreamLocalDataProvider for WorldStateSynchronizer<H, S>
where
    H: Hasher,
    S: KeyValueStoreLike + Send + 'static,
{
    async fn get_l2_tips(&self) -> SyncResult<L2Tips> {
        Ok(L2Tips {
            latest: self.latest()?,
            proven: *self.proven.read().await,
            finalized: *self.finalized.read().await,
        })
    }

    async fn get_l2_block_hash(&self, number: u32) -> SyncResult<Option<Fr>> {
        Ok(self.world_state.committed()?.block_hash(number)?)
    }
}

#[async_trait]
impl<H, S> L2BlockStreamEventHandler for WorldStateSynchronizer<H, S>
where
    H: Hasher,
    S: KeyValueStoreLike + Send + 'static,
{
    async fn handle_block_stream_event(&self, event: L2BlockStreamEvent) -> SyncResult<()> {
        match event {
            L2BlockStreamEvent::BlocksAdded { blocks } => {
                for block in &blocks {
                    self.apply_block(block)?;
                }
                if let (Some(first), Some(last)) = (blocks.first(), blocks.last()) {
                    info!(
                        "Applied blocks {}..={} to world state",
                        first.number(),
                        last.number()
                    );
                }
            }
            L2BlockStreamEvent::ChainPruned { block } => {
                self.world_state.unwind_to(block.number)?;
                for pointer in [&self.proven, &self.finalized] {
                    let mut pointer = pointer.write().await;
                    if pointer.number > block.number {
                        *pointer = block;
                    }
                }
            }
            L2BlockStreamEvent::ChainProven { block } => {
                *self.proven.write().await = block;
            }
            L2BlockStreamEvent::ChainFinalized { block } => {
                self.world_state.remove_historical_before(block.number)?;
                *self.finalized.write().await = block;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ChainBuilder;
    use rollshrew_trees::{MemStore, MerkleTreeId, Sha256Hasher};
    use rollshrew_world_state::WorldStateConfig;

    fn test_config() -> WorldStateConfig {
        WorldStateConfig {
            note_hash_tree_depth: 16,
            nullifier_tree_depth: 16,
            public_data_tree_depth: 16,
            l1_to_l2_message_tree_depth: 16,
            archive_tree_depth: 16,
            initial_nullifier_tree_size: 8,
            initial_public_data_tree_size: 8,
            nullifier_subtree_height: 1,
            history_length: 32,
            max_layer_chain: 8,
        }
    }

    fn synchronizer() -> WorldStateSynchronizer<Sha256Hasher, MemStore> {
        let world = WorldState::new(test_config(), Sha256Hasher).unwrap();
        WorldStateSynchronizer::new(world).unwrap()
    }

    #[tokio::test]
    async fn test_blocks_added_is_idempotent() -> anyhow::Result<()> {
        let mut chain = ChainBuilder::new(test_config())?;
        let blocks = chain.extend(3, 2)?;
        let sync = synchronizer();

        let event = L2BlockStreamEvent::BlocksAdded {
            blocks: blocks.clone(),
        };
        sync.handle_block_stream_event(event.clone()).await?;
        sync.handle_block_stream_event(event).await?;

        let tips = sync.get_l2_tips().await?;
        assert_eq!(tips.latest, blocks[2].id());
        assert_eq!(
            sync.world_state()
                .committed()?
                .get_tree_info(MerkleTreeId::Archive)
                .root,
            blocks[2].archive_root
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_tampered_block_is_rejected() -> anyhow::Result<()> {
        let mut chain = ChainBuilder::new(test_config())?;
        let mut blocks = chain.extend(1, 1)?;
        blocks[0].txs.clear();
        let sync = synchronizer();

        let err = sync
            .handle_block_stream_event(L2BlockStreamEvent::BlocksAdded { blocks })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::BlockMismatch { number: 1, .. }));
        assert_eq!(sync.world_state().block_number()?, 0);
        assert!(!sync.world_state().has_open_writer());
        Ok(())
    }

    #[tokio::test]
    async fn test_gap_is_rejected() -> anyhow::Result<()> {
        let mut chain = ChainBuilder::new(test_config())?;
        let blocks = chain.extend(2, 1)?;
        let sync = synchronizer();

        let err = sync
            .handle_block_stream_event(L2BlockStreamEvent::BlocksAdded {
                blocks: vec![blocks[1].clone()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Handler(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_prune_and_finalize() -> anyhow::Result<()> {
        let mut chain = ChainBuilder::new(test_config())?;
        let blocks = chain.extend(5, 1)?;
        let sync = synchronizer();
        sync.handle_block_stream_event(L2BlockStreamEvent::BlocksAdded {
            blocks: blocks.clone(),
        })
        .await?;
        sync.handle_block_stream_event(L2BlockStreamEvent::ChainProven {
            block: blocks[4].id(),
        })
        .await?;

        sync.handle_block_stream_event(L2BlockStreamEvent::ChainPruned {
            block: blocks[2].id(),
        })
        .await?;
        let tips = sync.get_l2_tips().await?;
        assert_eq!(tips.latest, blocks[2].id());
        assert_eq!(tips.proven, blocks[2].id());

        sync.handle_block_stream_event(L2BlockStreamEvent::ChainFinalized {
            block: blocks[1].id(),
        })
        .await?;
        assert_eq!(sync.world_state().history_blocks()?, vec![2, 3]);
        Ok(())
    }
}
