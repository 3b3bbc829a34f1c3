//! In-memory transaction pool

use log::debug;
use rollshrew_support::{Tx, TxHash};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Pool of known transactions keyed by hash. Clones share the same pool.
#[derive(Debug, Clone, Default)]
pub struct TxPool {
    txs: Arc<RwLock<HashMap<TxHash, Tx>>>,
}

impl TxPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add txs, returning how many were not already present.
    pub async fn add_txs(&self, txs: impl IntoIterator<Item = Tx>) -> usize {
        let mut pool = self.txs.write().await;
        let mut added = 0;
        for tx in txs {
            if pool.insert(tx.hash(), tx).is_none() {
                added += 1;
            }
        }
        debug!("Added {} txs to pool (size {})", added, pool.len());
        added
    }

    pub async fn get_tx(&self, hash: &TxHash) -> Option<Tx> {
        self.txs.read().await.get(hash).cloned()
    }

    pub async fn has_tx(&self, hash: &TxHash) -> bool {
        self.txs.read().await.contains_key(hash)
    }

    /// The hashes from `hashes` that are not in the pool, in input order.
    pub async fn missing(&self, hashes: &[TxHash]) -> Vec<TxHash> {
        let pool = self.txs.read().await;
        hashes
            .iter()
            .filter(|hash| !pool.contains_key(*hash))
            .copied()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.txs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
