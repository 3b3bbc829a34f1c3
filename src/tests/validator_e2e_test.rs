//! Proposal validation on a synced node

use super::{TestConfig, TestUtils};
use anyhow::Result;
use rollshrew_p2p::{InMemoryReqResp, PeerBehavior, PeerId, TxPool};
use rollshrew_support::{BlockProposal, Fr};
use rollshrew_sync::mock::MockL2BlockSource;
use rollshrew_sync::{
    BlockStreamConfig, L2BlockStream, L2BlockStreamEventHandler, L2BlockStreamEvent,
    WorldStateSynchronizer,
};
use rollshrew_trees::{MemStore, MerkleTreeId, Sha256Hasher};
use rollshrew_validator::{ProposalValidator, StaticCommittee, ValidationOutcome, ValidatorConfig};
use rollshrew_world_state::WorldState;
use std::sync::Arc;
use std::time::Duration;

fn committee() -> Vec<PeerId> {
    ["p0", "p1", "p2", "p3"].into_iter().map(PeerId::new).collect()
}

#[tokio::test]
async fn test_synced_node_validates_and_applies_next_block() -> Result<()> {
    TestUtils::init_logging();
    let mut chain = TestUtils::chain()?;
    let published = chain.extend(9, 2)?;
    let next = chain.extend(1, 12)?.remove(0);

    // Sync the node to block 9 through the block stream.
    let source = Arc::new(MockL2BlockSource::new(chain.genesis_hash()));
    source.add_blocks(published).await;
    let world = WorldState::new(TestConfig::world_state(), Sha256Hasher)?;
    let synchronizer = Arc::new(WorldStateSynchronizer::new(world.clone())?);
    let stream = L2BlockStream::new(
        source.clone(),
        synchronizer.clone(),
        synchronizer.clone(),
        BlockStreamConfig::default(),
    );
    stream.work().await?;
    assert_eq!(world.block_number()?, 9);

    // Block 10 (slot 10) is proposed by p2, who is unreachable; the txs are
    // spread over the rest of the committee.
    let proposer = PeerId::new("p2");
    let network = Arc::new(InMemoryReqResp::new());
    TestUtils::add_peer(&network, "p2", PeerBehavior::Failing, &next, next.txs.clone()).await;
    TestUtils::add_peer(&network, "p0", PeerBehavior::Honest, &next, next.txs[..6].to_vec()).await;
    TestUtils::add_peer(&network, "p1", PeerBehavior::Honest, &next, next.txs[6..].to_vec()).await;
    TestUtils::add_peer(&network, "p3", PeerBehavior::WrongArchive, &next, next.txs.clone()).await;

    let validator = ProposalValidator::new(
        world.clone(),
        TxPool::new(),
        network.clone(),
        StaticCommittee::new(committee()),
        ValidatorConfig {
            tx_fetch_deadline: Duration::from_secs(5),
            ..Default::default()
        },
    )?;
    let proposal = BlockProposal::from_block(&next);
    let outcome = validator.validate(&proposal, &proposer, committee()).await?;
    assert_eq!(outcome, ValidationOutcome::Valid);
    assert_eq!(world.block_number()?, 9);
    assert!(!world.has_open_writer());

    // Once published, the same block applies cleanly.
    synchronizer
        .handle_block_stream_event(L2BlockStreamEvent::BlocksAdded {
            blocks: vec![next.clone()],
        })
        .await?;
    assert_eq!(world.block_number()?, 10);
    assert_eq!(world.committed()?.block_hash(10)?, Some(next.hash()));

    // Re-execution runs on the parent snapshot, so the verdict holds after
    // block 10 is committed.
    let outcome = validator.validate(&proposal, &proposer, committee()).await?;
    assert_eq!(outcome, ValidationOutcome::Valid);
    Ok(())
}

#[tokio::test]
async fn test_invalid_proposals_leave_state_untouched() -> Result<()> {
    TestUtils::init_logging();
    let mut chain = TestUtils::chain()?;
    let blocks = chain.extend(2, 3)?;

    let world = WorldState::<Sha256Hasher, MemStore>::new(TestConfig::world_state(), Sha256Hasher)?;
    let synchronizer = WorldStateSynchronizer::new(world.clone())?;
    synchronizer
        .handle_block_stream_event(L2BlockStreamEvent::BlocksAdded {
            blocks: vec![blocks[0].clone()],
        })
        .await?;
    let before = world.committed()?.get_tree_info(MerkleTreeId::Archive);

    let pool = TxPool::new();
    pool.add_txs(blocks[1].txs.clone()).await;
    let validator = ProposalValidator::new(
        world.clone(),
        pool,
        Arc::new(InMemoryReqResp::new()),
        StaticCommittee::new(committee()),
        ValidatorConfig::default(),
    )?;

    // Slot 2 belongs to p2.
    let mut tampered = BlockProposal::from_block(&blocks[1]);
    tampered.archive_root = Fr::from(1);
    let outcome = validator.validate(&tampered, &PeerId::new("p2"), vec![]).await?;
    assert!(matches!(outcome, ValidationOutcome::Invalid(_)));

    let mut reordered = BlockProposal::from_block(&blocks[1]);
    reordered.tx_hashes.reverse();
    let outcome = validator.validate(&reordered, &PeerId::new("p2"), vec![]).await?;
    assert!(matches!(outcome, ValidationOutcome::Invalid(_)));

    let honest = BlockProposal::from_block(&blocks[1]);
    let outcome = validator.validate(&honest, &PeerId::new("p1"), vec![]).await?;
    assert!(matches!(outcome, ValidationOutcome::Invalid(_)));

    assert_eq!(world.block_number()?, 1);
    assert_eq!(
        world.committed()?.get_tree_info(MerkleTreeId::Archive),
        before
    );
    assert!(!world.has_open_writer());

    let outcome = validator.validate(&honest, &PeerId::new("p2"), vec![]).await?;
    assert!(outcome.is_valid());
    Ok(())
}
