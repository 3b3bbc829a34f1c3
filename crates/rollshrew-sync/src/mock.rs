//! Mock block source and chain builder for testing

use crate::error::{SyncError, SyncResult};
use crate::traits::L2BlockSource;
use async_trait::async_trait;
use log::debug;
use rollshrew_support::{BlockHeader, Fr, L2Block, L2BlockId, L2Tips, PublicDataWrite, Tx, TxEffect};
use rollshrew_trees::Sha256Hasher;
use rollshrew_world_state::{WorldState, WorldStateConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

struct MockChain {
    genesis_hash: Fr,
    blocks: BTreeMap<u32, L2Block>,
    proven: u32,
    finalized: u32,
    connected: bool,
}

impl MockChain {
    fn block_id(&self, number: u32) -> L2BlockId {
        match self.blocks.get(&number) {
            Some(block) => block.id(),
            None => L2BlockId::new(0, self.genesis_hash),
        }
    }

    fn latest(&self) -> u32 {
        self.blocks.keys().next_back().copied().unwrap_or(0)
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(SyncError::BlockSource("source disconnected".to_string()))
        }
    }
}

/// Mock block source for testing
#[derive(Clone)]
pub struct MockL2BlockSource {
    chain: Arc<RwLock<MockChain>>,
}

impl MockL2BlockSource {
    pub fn new(genesis_hash: Fr) -> Self {
        Self {
            chain: Arc::new(RwLock::new(MockChain {
                genesis_hash,
                blocks: BTreeMap::new(),
                proven: 0,
                finalized: 0,
                connected: true,
            })),
        }
    }

    pub async fn add_blocks(&self, blocks: Vec<L2Block>) {
        let mut chain = self.chain.write().await;
        for block in blocks {
            chain.blocks.insert(block.number(), block);
        }
    }

    pub async fn set_proven(&self, number: u32) {
        self.chain.write().await.proven = number;
    }

    pub async fn set_finalized(&self, number: u32) {
        self.chain.write().await.finalized = number;
    }

    pub async fn set_connected(&self, connected: bool) {
        self.chain.write().await.connected = connected;
    }

    /// Replace every block from `from` on with `new_blocks`.
    pub async fn simulate_reorg(&self, from: u32, new_blocks: Vec<L2Block>) {
        let mut chain = self.chain.write().await;
        chain.blocks.retain(|number, _| *number < from);
        for block in new_blocks {
            chain.blocks.insert(block.number(), block);
        }
        let latest = chain.latest();
        chain.proven = chain.proven.min(latest);
        chain.finalized = chain.finalized.min(latest);
        debug!("Mock source reorged from block {}, new tip {}", from, latest);
    }
}

#[async_trait]
impl L2BlockSource for MockL2BlockSource {
    async fn get_l2_tips(&self) -> SyncResult<L2Tips> {
        let chain = self.chain.read().await;
        chain.check_connected()?;
        Ok(L2Tips {
            latest: chain.block_id(chain.latest()),
            proven: chain.block_id(chain.proven),
            finalized: chain.block_id(chain.finalized),
        })
    }

    async fn get_published_blocks(
        &self,
        from: u32,
        limit: u32,
        proven_only: bool,
    ) -> SyncResult<Vec<L2Block>> {
        let chain = self.chain.read().await;
        chain.check_connected()?;
        let mut blocks = Vec::new();
        let mut number = from;
        while (blocks.len() as u32) < limit {
            if proven_only && number > chain.proven {
                break;
            }
            match chain.blocks.get(&number) {
                Some(block) => blocks.push(block.clone()),
                None => break,
            }
            number += 1;
        }
        Ok(blocks)
    }

    async fn get_block_header(&self, number: Option<u32>) -> SyncResult<Option<BlockHeader>> {
        let chain = self.chain.read().await;
        chain.check_connected()?;
        let number = number.unwrap_or_else(|| chain.latest());
        Ok(chain.blocks.get(&number).map(|block| block.header.clone()))
    }
}

/// Deterministic tx whose note hashes, nullifier and message never collide
/// with those of another seed.
pub fn make_tx(seed: u64) -> Tx {
    Tx::new(
        TxEffect {
            note_hashes: vec![Fr::from(seed * 2 + 1), Fr::from(seed * 2 + 2)],
            nullifiers: vec![Fr::from(1_000_000 + seed)],
            public_data_writes: vec![PublicDataWrite {
                slot: Fr::from(100 + seed % 4),
                value: Fr::from(seed),
            }],
        },
        seed.to_be_bytes().to_vec(),
    )
}

/// Builds a valid chain by executing blocks against its own world state.
pub struct ChainBuilder {
    world: WorldState<Sha256Hasher>,
    genesis_hash: Fr,
    blocks: Vec<L2Block>,
    seed: u64,
}

impl ChainBuilder {
    pub fn new(config: WorldStateConfig) -> SyncResult<Self> {
        let world = WorldState::new(config, Sha256Hasher)?;
        let genesis_hash = world
            .committed()?
            .block_hash(0)?
            .ok_or_else(|| SyncError::BlockSource("genesis block missing".to_string()))?;
        Ok(Self {
            world,
            genesis_hash,
            blocks: Vec::new(),
            seed: 0,
        })
    }

    pub fn genesis_hash(&self) -> Fr {
        self.genesis_hash
    }

    pub fn world_state(&self) -> &WorldState<Sha256Hasher> {
        &self.world
    }

    /// Blocks built so far; index 0 is block 1.
    pub fn blocks(&self) -> &[L2Block] {
        &self.blocks
    }

    pub fn next_block(&mut self, txs: Vec<Tx>, l1_to_l2_messages: Vec<Fr>) -> SyncResult<L2Block> {
        let mut fork = self.world.fork(None)?;
        let number = fork.base_block() + 1;
        let built = fork.build_block(number as u64, &txs, &l1_to_l2_messages)?;
        self.world.commit(fork)?;
        let block = L2Block {
            header: built.header,
            archive_root: built.archive_root,
            txs,
            l1_to_l2_messages,
        };
        self.blocks.push(block.clone());
        Ok(block)
    }

    /// Append `count` blocks of `txs_per_block` fresh txs each.
    pub fn extend(&mut self, count: u32, txs_per_block: usize) -> SyncResult<Vec<L2Block>> {
        let mut built = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let txs = (0..txs_per_block)
                .map(|_| {
                    self.seed += 1;
                    make_tx(self.seed)
                })
                .collect();
            let message = Fr::from(5_000_000 + self.seed);
            built.push(self.next_block(txs, vec![message])?);
        }
        Ok(built)
    }

    pub fn unwind_to(&mut self, number: u32) -> SyncResult<()> {
        self.world.unwind_to(number)?;
        self.blocks.truncate(number as usize);
        Ok(())
    }
}
