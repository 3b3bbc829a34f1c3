//! Block proposal validation

use crate::committee::{CommitteeCache, CommitteeSource};
use crate::config::ValidatorConfig;
use crate::error::{ValidatorError, ValidatorResult};
use log::{debug, info, warn};
use rollshrew_p2p::{BatchTxRequester, PeerId, ReqRespTransport, TxPool};
use rollshrew_support::{BlockHeader, BlockProposal, Tx, TxHash};
use rollshrew_trees::{Hasher, KeyValueStoreLike};
use rollshrew_world_state::WorldState;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Re-execution reproduced the proposed header and archive root.
    Valid,
    /// These txs could not be fetched before the deadline.
    MissingTxs(Vec<TxHash>),
    Invalid(String),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }
}

/// Checks block proposals before attesting to them.
///
/// A proposal is valid when it comes from the slot's proposer, every tx it
/// names can be obtained, and executing those txs on top of the parent
/// block's state yields exactly the proposed header and archive root. The
/// re-execution runs on a simulation fork that is closed on every path and
/// never committed.
pub struct ProposalValidator<H, S, T, C>
where
    H: Hasher,
    S: KeyValueStoreLike,
    T: ReqRespTransport,
    C: CommitteeSource,
{
    world_state: WorldState<H, S>,
    pool: TxPool,
    transport: Arc<T>,
    committees: CommitteeCache<C>,
    config: ValidatorConfig,
}

impl<H, S, T, C> ProposalValidator<H, S, T, C>
where
    H: Hasher,
    S: KeyValueStoreLike,
    T: ReqRespTransport + 'static,
    C: CommitteeSource,
{
    pub fn new(
        world_state: WorldState<H, S>,
        pool: TxPool,
        transport: Arc<T>,
        committee_source: C,
        config: ValidatorConfig,
    ) -> ValidatorResult<Self> {
        config.validate()?;
        Ok(Self {
            world_state,
            pool,
            transport,
            committees: CommitteeCache::new(committee_source, config.committee_cache_size),
            config,
        })
    }

    pub fn pool(&self) -> &TxPool {
        &self.pool
    }

    pub fn committees(&self) -> &CommitteeCache<C> {
        &self.committees
    }

    /// Validate `proposal` received from `proposer`, fetching missing txs
    /// from the proposer first and then from `candidates`.
    ///
    /// Rejections are reported as [`ValidationOutcome::Invalid`]; errors are
    /// reserved for local failures such as an unavailable parent state.
    pub async fn validate(
        &self,
        proposal: &BlockProposal,
        proposer: &PeerId,
        candidates: Vec<PeerId>,
    ) -> ValidatorResult<ValidationOutcome> {
        match self.check_proposal(proposal, proposer).await {
            Ok(()) => {}
            Err(
                e @ (ValidatorError::InvalidProposer { .. } | ValidatorError::InvalidProposal(_)),
            ) => {
                warn!("Rejecting proposal for block {}: {}", proposal.block_number, e);
                return Ok(ValidationOutcome::Invalid(e.to_string()));
            }
            Err(e) => return Err(e),
        }

        let txs = match self.collect_txs(proposal, proposer, candidates).await? {
            Ok(txs) => txs,
            Err(missing) => {
                warn!(
                    "Proposal for block {} is missing {} txs",
                    proposal.block_number,
                    missing.len()
                );
                return Ok(ValidationOutcome::MissingTxs(missing));
            }
        };

        let outcome = match self.re_execute(proposal, &txs) {
            Ok(()) => ValidationOutcome::Valid,
            Err(e @ ValidatorError::ArchiveMismatch { .. })
            | Err(e @ ValidatorError::InvalidProposal(_)) => {
                ValidationOutcome::Invalid(e.to_string())
            }
            Err(e) => return Err(e),
        };
        info!(
            "Proposal for block {} (slot {}) is {:?}",
            proposal.block_number, proposal.slot_number, outcome
        );
        Ok(outcome)
    }

    async fn check_proposal(&self, proposal: &BlockProposal, proposer: &PeerId) -> ValidatorResult<()> {
        let slot = proposal.slot_number;
        let expected = self
            .committees
            .proposer(self.config.epoch_of(slot), slot)
            .await?;
        if &expected != proposer {
            return Err(ValidatorError::InvalidProposer {
                slot,
                proposer: proposer.to_string(),
            });
        }
        if proposal.block_number == 0 {
            return Err(ValidatorError::InvalidProposal(
                "genesis cannot be proposed".to_string(),
            ));
        }
        if proposal.header.number != proposal.block_number
            || proposal.header.slot_number != slot
        {
            return Err(ValidatorError::InvalidProposal(
                "header does not match proposal block and slot".to_string(),
            ));
        }
        if BlockHeader::commit_tx_hashes(&proposal.tx_hashes) != proposal.header.tx_hashes_commitment {
            return Err(ValidatorError::InvalidProposal(
                "tx hashes do not match the header commitment".to_string(),
            ));
        }
        Ok(())
    }

    /// The proposal's txs in order, or the hashes that could not be found.
    async fn collect_txs(
        &self,
        proposal: &BlockProposal,
        proposer: &PeerId,
        candidates: Vec<PeerId>,
    ) -> ValidatorResult<Result<Vec<Tx>, Vec<TxHash>>> {
        let missing = self.pool.missing(&proposal.tx_hashes).await;
        if !missing.is_empty() {
            debug!(
                "Fetching {} missing txs for block {}",
                missing.len(),
                proposal.block_number
            );
            let peers: Vec<PeerId> = candidates.into_iter().filter(|p| p != proposer).collect();
            let requester = BatchTxRequester::new(
                proposal.clone(),
                missing,
                Some(proposer.clone()),
                peers,
                Instant::now() + self.config.tx_fetch_deadline,
                self.transport.clone(),
                self.config.requester.clone(),
            )?;
            let result = requester.run().await;
            self.pool.add_txs(result.txs).await;
            if !result.missing.is_empty() {
                return Ok(Err(result.missing));
            }
        }

        let mut txs = Vec::with_capacity(proposal.tx_hashes.len());
        let mut missing = Vec::new();
        for hash in &proposal.tx_hashes {
            match self.pool.get_tx(hash).await {
                Some(tx) => txs.push(tx),
                None => missing.push(*hash),
            }
        }
        if missing.is_empty() {
            Ok(Ok(txs))
        } else {
            Ok(Err(missing))
        }
    }

    fn re_execute(&self, proposal: &BlockProposal, txs: &[Tx]) -> ValidatorResult<()> {
        let mut fork = self.world_state.simulate(Some(proposal.block_number - 1))?;
        let built = fork.build_block(proposal.slot_number, txs, &proposal.l1_to_l2_messages);
        fork.close();

        let built = built.map_err(|e| {
            ValidatorError::InvalidProposal(format!("re-execution failed: {}", e))
        })?;
        if built.header != proposal.header {
            return Err(ValidatorError::InvalidProposal(
                "re-executed header differs from the proposal".to_string(),
            ));
        }
        if built.archive_root != proposal.archive_root {
            return Err(ValidatorError::ArchiveMismatch {
                expected: proposal.archive_root,
                actual: built.archive_root,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::committee::StaticCommittee;
    use rollshrew_p2p::{BlockTxsRequestHandler, InMemoryReqResp, PeerBehavior};
    use rollshrew_support::{Fr, L2Block};
    use rollshrew_sync::mock::{make_tx, ChainBuilder};
    use rollshrew_trees::{MemStore, Sha256Hasher};
    use rollshrew_world_state::{WorldStateConfig, WorldStateError};
    use std::time::Duration;

    type TestValidator = ProposalValidator<Sha256Hasher, MemStore, InMemoryReqResp, StaticCommittee>;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn world_config() -> WorldStateConfig {
        WorldStateConfig {
            note_hash_tree_depth: 16,
            nullifier_tree_depth: 16,
            public_data_tree_depth: 16,
            l1_to_l2_message_tree_depth: 16,
            archive_tree_depth: 16,
            initial_nullifier_tree_size: 8,
            initial_public_data_tree_size: 8,
            nullifier_subtree_height: 1,
            history_length: 16,
            max_layer_chain: 8,
        }
    }

    fn committee() -> Vec<PeerId> {
        vec![PeerId::new("alice"), PeerId::new("bob"), PeerId::new("carol")]
    }

    struct Setup {
        validator: TestValidator,
        network: Arc<InMemoryReqResp>,
        blocks: Vec<L2Block>,
    }

    /// Validator state at block 1; `blocks[1]` is the block 2 proposal
    /// whose proposer (slot 2) is carol, who holds every tx.
    async fn setup(fetch_deadline: Duration) -> anyhow::Result<Setup> {
        init_logging();
        let mut chain = ChainBuilder::new(world_config())?;
        let blocks = chain.extend(2, 3)?;

        let world = WorldState::new(world_config(), Sha256Hasher)?;
        let mut fork = world.fork(None)?;
        fork.build_block(blocks[0].header.slot_number, &blocks[0].txs, &blocks[0].l1_to_l2_messages)?;
        world.commit(fork)?;

        let network = Arc::new(InMemoryReqResp::new());
        let carol_pool = TxPool::new();
        carol_pool.add_txs(blocks[1].txs.clone()).await;
        let handler = BlockTxsRequestHandler::new(carol_pool);
        handler
            .register_proposal(&BlockProposal::from_block(&blocks[1]))
            .await;
        network
            .add_peer(PeerId::new("carol"), PeerBehavior::Honest, handler)
            .await;

        let config = ValidatorConfig {
            tx_fetch_deadline: fetch_deadline,
            ..Default::default()
        };
        let validator = ProposalValidator::new(
            world,
            TxPool::new(),
            network.clone(),
            StaticCommittee::new(committee()),
            config,
        )?;
        Ok(Setup {
            validator,
            network,
            blocks,
        })
    }

    #[tokio::test]
    async fn test_valid_proposal_with_fetched_txs() -> anyhow::Result<()> {
        let s = setup(Duration::from_secs(2)).await?;
        let proposal = BlockProposal::from_block(&s.blocks[1]);

        let outcome = s
            .validator
            .validate(&proposal, &PeerId::new("carol"), committee())
            .await?;
        assert_eq!(outcome, ValidationOutcome::Valid);
        assert_eq!(s.validator.pool().len().await, 3);
        assert!(s.network.requests_to(&PeerId::new("carol")).await > 0);

        // Committed state is untouched and the fork was closed.
        assert_eq!(s.validator.world_state.block_number()?, 1);
        assert!(!s.validator.world_state.has_open_writer());
        Ok(())
    }

    #[tokio::test]
    async fn test_txs_in_pool_need_no_requests() -> anyhow::Result<()> {
        let s = setup(Duration::from_secs(2)).await?;
        s.validator.pool().add_txs(s.blocks[1].txs.clone()).await;
        let proposal = BlockProposal::from_block(&s.blocks[1]);

        let outcome = s
            .validator
            .validate(&proposal, &PeerId::new("carol"), vec![])
            .await?;
        assert!(outcome.is_valid());
        assert_eq!(s.network.total_requests().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_txs_are_reported_missing() -> anyhow::Result<()> {
        let s = setup(Duration::from_millis(200)).await?;
        s.network
            .set_behavior(&PeerId::new("carol"), PeerBehavior::Failing)
            .await;
        let proposal = BlockProposal::from_block(&s.blocks[1]);

        let outcome = s
            .validator
            .validate(&proposal, &PeerId::new("carol"), vec![])
            .await?;
        let ValidationOutcome::MissingTxs(mut missing) = outcome else {
            panic!("expected missing txs, got {:?}", outcome);
        };
        missing.sort();
        let mut expected = proposal.tx_hashes.clone();
        expected.sort();
        assert_eq!(missing, expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_proposer_is_invalid() -> anyhow::Result<()> {
        let s = setup(Duration::from_secs(2)).await?;
        let proposal = BlockProposal::from_block(&s.blocks[1]);

        let outcome = s
            .validator
            .validate(&proposal, &PeerId::new("alice"), committee())
            .await?;
        assert!(matches!(outcome, ValidationOutcome::Invalid(reason) if reason.contains("alice")));
        assert_eq!(s.network.total_requests().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_archive_mismatch_is_invalid() -> anyhow::Result<()> {
        let s = setup(Duration::from_secs(2)).await?;
        s.validator.pool().add_txs(s.blocks[1].txs.clone()).await;
        let mut proposal = BlockProposal::from_block(&s.blocks[1]);
        proposal.archive_root = Fr::from(12345);

        let outcome = s
            .validator
            .validate(&proposal, &PeerId::new("carol"), vec![])
            .await?;
        assert!(matches!(outcome, ValidationOutcome::Invalid(reason) if reason.contains("Archive root")));
        assert!(!s.validator.world_state.has_open_writer());
        Ok(())
    }

    #[tokio::test]
    async fn test_double_spend_is_invalid() -> anyhow::Result<()> {
        let s = setup(Duration::from_secs(2)).await?;
        // Replays a nullifier already spent in block 1.
        let mut replay = make_tx(999);
        replay.effect.nullifiers = s.blocks[0].txs[0].effect.nullifiers.clone();
        s.validator.pool().add_txs(vec![replay.clone()]).await;

        let mut proposal = BlockProposal::from_block(&s.blocks[1]);
        proposal.tx_hashes = vec![replay.hash()];
        proposal.header.tx_hashes_commitment = BlockHeader::commit_tx_hashes(&proposal.tx_hashes);

        let outcome = s
            .validator
            .validate(&proposal, &PeerId::new("carol"), vec![])
            .await?;
        assert!(matches!(outcome, ValidationOutcome::Invalid(reason) if reason.contains("re-execution failed")));
        Ok(())
    }

    #[tokio::test]
    async fn test_tampered_tx_list_is_invalid() -> anyhow::Result<()> {
        let s = setup(Duration::from_secs(2)).await?;
        let mut proposal = BlockProposal::from_block(&s.blocks[1]);
        proposal.tx_hashes.pop();

        let outcome = s
            .validator
            .validate(&proposal, &PeerId::new("carol"), vec![])
            .await?;
        assert!(matches!(outcome, ValidationOutcome::Invalid(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_parent_is_an_error() -> anyhow::Result<()> {
        let mut s = setup(Duration::from_secs(2)).await?;
        let mut chain = ChainBuilder::new(world_config())?;
        s.blocks = chain.extend(4, 0)?;
        let proposal = BlockProposal::from_block(&s.blocks[3]);
        // Slot 4 belongs to bob.
        let err = s
            .validator
            .validate(&proposal, &PeerId::new("bob"), vec![])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ValidatorError::WorldState(WorldStateError::SnapshotNotFound(3))
        ));
        Ok(())
    }
}
