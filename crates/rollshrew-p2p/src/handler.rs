//! Serving block tx requests from the local pool

use crate::bitvector::BitVector;
use crate::protocol::{BlockTxsRequest, BlockTxsResponse, ReqRespResponse};
use crate::tx_pool::TxPool;
use log::{debug, warn};
use rollshrew_support::{BlockProposal, Fr, TxHash};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Build the response for `request` given the proposal's tx hashes, if the
/// proposal is known. Requested txs are returned in request order.
pub async fn handle_block_txs_request(
    pool: &TxPool,
    proposal_tx_hashes: Option<&[TxHash]>,
    request: &BlockTxsRequest,
) -> BlockTxsResponse {
    let Some(proposal_tx_hashes) = proposal_tx_hashes else {
        return BlockTxsResponse::empty();
    };

    let mut held = Vec::new();
    for (index, hash) in proposal_tx_hashes.iter().enumerate() {
        if pool.has_tx(hash).await {
            held.push(index);
        }
    }

    let mut txs = Vec::new();
    for hash in &request.tx_hashes {
        if !proposal_tx_hashes.contains(hash) {
            continue;
        }
        if let Some(tx) = pool.get_tx(hash).await {
            txs.push(tx);
        }
    }

    BlockTxsResponse {
        block_hash: request.archive_root,
        tx_indices: BitVector::from_indices(proposal_tx_hashes.len(), held),
        txs,
    }
}

/// Server side of the block txs protocol: a pool plus the proposals this
/// node has seen, keyed by archive root.
#[derive(Debug, Clone, Default)]
pub struct BlockTxsRequestHandler {
    pool: TxPool,
    proposals: Arc<RwLock<HashMap<Fr, Vec<TxHash>>>>,
}

impl BlockTxsRequestHandler {
    pub fn new(pool: TxPool) -> Self {
        Self {
            pool,
            proposals: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn pool(&self) -> &TxPool {
        &self.pool
    }

    pub async fn register_proposal(&self, proposal: &BlockProposal) {
        self.proposals
            .write()
            .await
            .insert(proposal.archive_root, proposal.tx_hashes.clone());
    }

    pub async fn respond(&self, request: &BlockTxsRequest) -> BlockTxsResponse {
        let proposals = self.proposals.read().await;
        let tx_hashes = proposals.get(&request.archive_root).map(Vec::as_slice);
        let response = handle_block_txs_request(&self.pool, tx_hashes, request).await;
        debug!(
            "Serving {} of {} requested txs for {}",
            response.txs.len(),
            request.tx_hashes.len(),
            request.archive_root
        );
        response
    }

    /// Decode, serve and encode one raw request.
    pub async fn handle(&self, request: &[u8]) -> ReqRespResponse {
        let request = match BlockTxsRequest::from_bytes(request) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejecting undecodable block txs request: {}", e);
                return ReqRespResponse::failure();
            }
        };
        match self.respond(&request).await.to_bytes() {
            Ok(bytes) => ReqRespResponse::success(bytes),
            Err(e) => {
                warn!("Failed to encode block txs response: {}", e);
                ReqRespResponse::failure()
            }
        }
    }
}
