//! Shared fixtures for the cross-crate suites

use anyhow::Result;
use rollshrew_p2p::{BlockTxsRequestHandler, InMemoryReqResp, PeerBehavior, PeerId, TxPool};
use rollshrew_support::{BlockProposal, L2Block, Tx};
use rollshrew_sync::mock::ChainBuilder;
use rollshrew_world_state::WorldStateConfig;

pub mod tree_witness_test;
pub mod validator_e2e_test;

/// Small trees so whole chains build quickly.
pub struct TestConfig;

impl TestConfig {
    pub fn world_state() -> WorldStateConfig {
        WorldStateConfig {
            note_hash_tree_depth: 16,
            nullifier_tree_depth: 16,
            public_data_tree_depth: 16,
            l1_to_l2_message_tree_depth: 16,
            archive_tree_depth: 16,
            initial_nullifier_tree_size: 8,
            initial_public_data_tree_size: 8,
            nullifier_subtree_height: 1,
            history_length: 128,
            max_layer_chain: 8,
        }
    }
}

pub struct TestUtils;

impl TestUtils {
    pub fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    pub fn chain() -> Result<ChainBuilder> {
        Ok(ChainBuilder::new(TestConfig::world_state())?)
    }

    /// Register a peer on `network` that holds `txs` and knows `block`'s
    /// proposal.
    pub async fn add_peer(
        network: &InMemoryReqResp,
        name: &str,
        behavior: PeerBehavior,
        block: &L2Block,
        txs: Vec<Tx>,
    ) -> PeerId {
        let pool = TxPool::new();
        pool.add_txs(txs).await;
        let handler = BlockTxsRequestHandler::new(pool);
        handler
            .register_proposal(&BlockProposal::from_block(block))
            .await;
        let peer = PeerId::new(name);
        network.add_peer(peer.clone(), behavior, handler).await;
        peer
    }
}
