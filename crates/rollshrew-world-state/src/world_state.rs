//! Committed snapshots, forks and the single-writer discipline

use crate::config::WorldStateConfig;
use crate::error::{WorldStateError, WorldStateResult};
use crate::tree_set::{TreeSet, TreeSnapshot};
use log::{debug, info, warn};
use rollshrew_support::BlockHeader;
use rollshrew_trees::{BatchLike, Hasher, KeyValueStoreLike, MemStore, MerkleTreeId};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Store key holding the committed block number (u32 big-endian).
pub const BLOCK_NUMBER_KEY: &[u8] = b"world_state:block";

fn storage_error<E: std::fmt::Debug>(err: E) -> WorldStateError {
    WorldStateError::Storage(format!("{:?}", err))
}

/// Holds the writer slot for as long as the fork lives.
pub struct ForkGuard {
    slot: Arc<AtomicBool>,
}

impl ForkGuard {
    fn acquire(slot: &Arc<AtomicBool>) -> Option<Self> {
        slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { slot: slot.clone() })
    }
}

impl Drop for ForkGuard {
    fn drop(&mut self) {
        self.slot.store(false, Ordering::Release);
    }
}

struct CommittedState {
    current: TreeSnapshot,
    /// Retained snapshots by block number, including `current`.
    history: BTreeMap<u32, TreeSnapshot>,
    next_generation: u64,
}

/// Read-only view of the trees at a committed block.
pub struct WorldStateSnapshot<H: Hasher> {
    block_number: u32,
    trees: TreeSet<H>,
}

impl<H: Hasher> WorldStateSnapshot<H> {
    pub fn block_number(&self) -> u32 {
        self.block_number
    }
}

impl<H: Hasher> Deref for WorldStateSnapshot<H> {
    type Target = TreeSet<H>;

    fn deref(&self) -> &TreeSet<H> {
        &self.trees
    }
}

/// Isolated, writable view of all five trees.
///
/// Writes stay private to the fork until it is handed to
/// [`WorldState::commit`]. Dropping the fork discards them and releases the
/// writer slot.
pub struct WorldStateFork<H: Hasher> {
    base_block: u32,
    base_generation: u64,
    pub(crate) nullifier_subtree_height: u8,
    trees: TreeSet<H>,
    guard: Option<ForkGuard>,
}

impl<H: Hasher> WorldStateFork<H> {
    pub fn base_block(&self) -> u32 {
        self.base_block
    }

    /// Whether this fork holds the writer slot and may be committed.
    pub fn is_writable(&self) -> bool {
        self.guard.is_some()
    }

    pub fn close(self) {
        debug!("Closing fork based on block {}", self.base_block);
    }
}

impl<H: Hasher> Deref for WorldStateFork<H> {
    type Target = TreeSet<H>;

    fn deref(&self) -> &TreeSet<H> {
        &self.trees
    }
}

impl<H: Hasher> DerefMut for WorldStateFork<H> {
    fn deref_mut(&mut self) -> &mut TreeSet<H> {
        &mut self.trees
    }
}

/// The committed world state.
///
/// Committed snapshots are immutable and shared by reference with every
/// reader and fork, so reads need no coordination with the writer. Clones
/// share the same state.
pub struct WorldState<H: Hasher, S: KeyValueStoreLike = MemStore> {
    config: Arc<WorldStateConfig>,
    hasher: H,
    state: Arc<RwLock<CommittedState>>,
    writer: Arc<AtomicBool>,
    store: Option<Arc<Mutex<S>>>,
}

impl<H: Hasher, S: KeyValueStoreLike> Clone for WorldState<H, S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            hasher: self.hasher.clone(),
            state: self.state.clone(),
            writer: self.writer.clone(),
            store: self.store.clone(),
        }
    }
}

impl<H: Hasher> WorldState<H> {
    /// In-memory world state starting from genesis.
    pub fn new(config: WorldStateConfig, hasher: H) -> WorldStateResult<Self> {
        let trees = genesis_trees(&config, &hasher)?;
        Ok(Self::from_parts(config, hasher, trees, 0, None))
    }
}

impl<H: Hasher, S: KeyValueStoreLike> WorldState<H, S> {
    /// Open a world state persisted in `store`, or write genesis into it.
    pub fn with_store(config: WorldStateConfig, hasher: H, mut store: S) -> WorldStateResult<Self> {
        if let Some(trees) = TreeSet::load(&store, &hasher)? {
            let block_number = store
                .get_immutable(BLOCK_NUMBER_KEY)
                .map_err(storage_error)?
                .ok_or_else(|| WorldStateError::Storage("missing block number".to_string()))?;
            let block_number = u32::from_be_bytes(
                block_number
                    .as_slice()
                    .try_into()
                    .map_err(|_| WorldStateError::Storage("malformed block number".to_string()))?,
            );
            info!("Loaded world state at block {}", block_number);
            return Ok(Self::from_parts(
                config,
                hasher,
                trees,
                block_number,
                Some(store),
            ));
        }

        let trees = genesis_trees(&config, &hasher)?;
        let mut batch = store.create_batch();
        trees.stage_writes(&mut batch);
        batch.put(BLOCK_NUMBER_KEY, 0u32.to_be_bytes());
        store.write(batch).map_err(storage_error)?;
        info!("Initialized world state store at genesis");
        Ok(Self::from_parts(config, hasher, trees, 0, Some(store)))
    }

    fn from_parts(
        config: WorldStateConfig,
        hasher: H,
        trees: TreeSet<H>,
        block_number: u32,
        store: Option<S>,
    ) -> Self {
        let current = trees.freeze(block_number, 0, config.max_layer_chain);
        let mut history = BTreeMap::new();
        history.insert(block_number, current.clone());
        Self {
            config: Arc::new(config),
            hasher,
            state: Arc::new(RwLock::new(CommittedState {
                current,
                history,
                next_generation: 1,
            })),
            writer: Arc::new(AtomicBool::new(false)),
            store: store.map(|store| Arc::new(Mutex::new(store))),
        }
    }

    fn read_state(&self) -> WorldStateResult<RwLockReadGuard<'_, CommittedState>> {
        self.state.read().map_err(|_| WorldStateError::LockPoisoned)
    }

    fn write_state(&self) -> WorldStateResult<RwLockWriteGuard<'_, CommittedState>> {
        self.state.write().map_err(|_| WorldStateError::LockPoisoned)
    }

    pub fn config(&self) -> &WorldStateConfig {
        &self.config
    }

    pub fn block_number(&self) -> WorldStateResult<u32> {
        Ok(self.read_state()?.current.block_number())
    }

    /// Block numbers of the retained snapshots, oldest first.
    pub fn history_blocks(&self) -> WorldStateResult<Vec<u32>> {
        Ok(self.read_state()?.history.keys().copied().collect())
    }

    pub fn has_open_writer(&self) -> bool {
        self.writer.load(Ordering::Acquire)
    }

    fn snapshot_at(&self, at_block: Option<u32>) -> WorldStateResult<TreeSnapshot> {
        let state = self.read_state()?;
        match at_block {
            None => Ok(state.current.clone()),
            Some(block) => state
                .history
                .get(&block)
                .cloned()
                .ok_or(WorldStateError::SnapshotNotFound(block)),
        }
    }

    fn open_view(&self, snapshot: &TreeSnapshot) -> WorldStateSnapshot<H> {
        WorldStateSnapshot {
            block_number: snapshot.block_number(),
            trees: TreeSet::open(snapshot, &self.hasher),
        }
    }

    pub fn committed(&self) -> WorldStateResult<WorldStateSnapshot<H>> {
        let snapshot = self.snapshot_at(None)?;
        Ok(self.open_view(&snapshot))
    }

    pub fn get_snapshot(&self, block: u32) -> WorldStateResult<WorldStateSnapshot<H>> {
        let snapshot = self.snapshot_at(Some(block))?;
        Ok(self.open_view(&snapshot))
    }

    fn open_fork(&self, snapshot: TreeSnapshot, guard: Option<ForkGuard>) -> WorldStateFork<H> {
        WorldStateFork {
            base_block: snapshot.block_number,
            base_generation: snapshot.generation,
            nullifier_subtree_height: self.config.nullifier_subtree_height,
            trees: TreeSet::open(&snapshot, &self.hasher),
            guard,
        }
    }

    /// Open the writer fork at `at_block` (the latest block when `None`).
    ///
    /// Fails with `WriterBusy` while another writer fork is alive. A fork
    /// based on anything but the latest block will fail to commit.
    pub fn fork(&self, at_block: Option<u32>) -> WorldStateResult<WorldStateFork<H>> {
        let guard = ForkGuard::acquire(&self.writer).ok_or(WorldStateError::WriterBusy)?;
        let snapshot = self.snapshot_at(at_block)?;
        debug!("Opened writer fork at block {}", snapshot.block_number);
        Ok(self.open_fork(snapshot, Some(guard)))
    }

    /// Open a fork that never holds the writer slot and cannot be committed.
    pub fn simulate(&self, at_block: Option<u32>) -> WorldStateResult<WorldStateFork<H>> {
        let snapshot = self.snapshot_at(at_block)?;
        debug!("Opened simulation fork at block {}", snapshot.block_number);
        Ok(self.open_fork(snapshot, None))
    }

    /// Publish the fork's state as the next block.
    ///
    /// Returns the new block number. The store, when attached, receives the
    /// fork's deltas in one batch before the snapshot is published.
    pub fn commit(&self, fork: WorldStateFork<H>) -> WorldStateResult<u32> {
        let WorldStateFork {
            base_block,
            base_generation,
            trees,
            guard,
            ..
        } = fork;
        if guard.is_none() {
            return Err(WorldStateError::ReadOnlyFork);
        }

        let mut state = self.write_state()?;
        let committed_block = state.current.block_number();
        if committed_block != base_block || state.current.generation != base_generation {
            warn!(
                "Rejecting stale fork based on block {} (committed block {})",
                base_block, committed_block
            );
            return Err(WorldStateError::StaleFork {
                base_block,
                committed_block,
            });
        }

        let block_number = base_block + 1;
        if let Some(store) = &self.store {
            let mut store = store.lock().map_err(|_| WorldStateError::LockPoisoned)?;
            let mut batch = store.create_batch();
            trees.stage_writes(&mut batch);
            batch.put(BLOCK_NUMBER_KEY, block_number.to_be_bytes());
            store.write(batch).map_err(storage_error)?;
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        let snapshot = trees.freeze(block_number, generation, self.config.max_layer_chain);
        state.history.insert(block_number, snapshot.clone());
        state.current = snapshot;
        while state.history.len() > self.config.history_length.max(1) {
            state.history.pop_first();
        }

        info!(
            "Committed block {} (archive root {})",
            block_number,
            state.current.meta(MerkleTreeId::Archive).root
        );
        Ok(block_number)
    }

    /// Discard the fork. The committed state is never touched.
    pub fn rollback(&self, fork: WorldStateFork<H>) {
        debug!("Rolling back fork based on block {}", fork.base_block);
        drop(fork);
    }

    /// Make the retained snapshot at `block` the committed state again.
    ///
    /// Forks opened before the unwind become stale.
    pub fn unwind_to(&self, block: u32) -> WorldStateResult<()> {
        let mut state = self.write_state()?;
        let current_block = state.current.block_number();
        if block == current_block {
            return Ok(());
        }
        if block > current_block {
            return Err(WorldStateError::SnapshotNotFound(block));
        }
        let mut snapshot = state
            .history
            .get(&block)
            .cloned()
            .ok_or(WorldStateError::SnapshotNotFound(block))?;

        if let Some(store) = &self.store {
            let mut store = store.lock().map_err(|_| WorldStateError::LockPoisoned)?;
            let mut batch = store.create_batch();
            snapshot.stage_full_rewrite(&*store, &mut batch)?;
            batch.put(BLOCK_NUMBER_KEY, block.to_be_bytes());
            store.write(batch).map_err(storage_error)?;
        }

        snapshot.generation = state.next_generation;
        state.next_generation += 1;
        state.history.retain(|number, _| *number <= block);
        state.history.insert(block, snapshot.clone());
        state.current = snapshot;
        info!("Unwound world state from block {} to {}", current_block, block);
        Ok(())
    }

    /// Drop retained snapshots older than `block`. The current one is kept.
    pub fn remove_historical_before(&self, block: u32) -> WorldStateResult<()> {
        let mut state = self.write_state()?;
        let current_block = state.current.block_number();
        let before = state.history.len();
        state
            .history
            .retain(|number, _| *number >= block || *number == current_block);
        debug!(
            "Removed {} historical snapshots before block {}",
            before - state.history.len(),
            block
        );
        Ok(())
    }
}

fn genesis_trees<H: Hasher>(config: &WorldStateConfig, hasher: &H) -> WorldStateResult<TreeSet<H>> {
    let mut trees = TreeSet::empty(config, hasher)?;
    let header: BlockHeader = trees.state_header(0, 0, &[]);
    trees.append_leaves(MerkleTreeId::Archive, &[header.hash()])?;
    Ok(trees)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollshrew_support::Fr;
    use rollshrew_trees::{IndexedLeaf, Sha256Hasher};

    fn test_config() -> WorldStateConfig {
        WorldStateConfig {
            note_hash_tree_depth: 10,
            nullifier_tree_depth: 10,
            public_data_tree_depth: 10,
            l1_to_l2_message_tree_depth: 10,
            archive_tree_depth: 10,
            initial_nullifier_tree_size: 8,
            initial_public_data_tree_size: 8,
            nullifier_subtree_height: 2,
            history_length: 4,
            max_layer_chain: 3,
        }
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_fork_is_invisible_until_commit() {
        init_logging();
        let world = WorldState::new(test_config(), Sha256Hasher).unwrap();
        let before = world.committed().unwrap().get_tree_info(MerkleTreeId::NoteHashTree);

        let mut fork = world.fork(None).unwrap();
        fork.append_leaves(MerkleTreeId::NoteHashTree, &[Fr::from(11)])
            .unwrap();
        assert_eq!(
            world
                .committed()
                .unwrap()
                .get_tree_info(MerkleTreeId::NoteHashTree),
            before
        );

        assert_eq!(world.commit(fork).unwrap(), 1);
        let after = world.committed().unwrap().get_tree_info(MerkleTreeId::NoteHashTree);
        assert_eq!(after.size, 1);
        assert_ne!(after.root, before.root);
    }

    #[test]
    fn test_rollback_leaves_snapshot_untouched() {
        let world = WorldState::new(test_config(), Sha256Hasher).unwrap();
        let before = world.committed().unwrap().get_tree_info(MerkleTreeId::NullifierTree);

        let mut fork = world.fork(None).unwrap();
        fork.batch_insert(
            MerkleTreeId::NullifierTree,
            &[IndexedLeaf::nullifier(Fr::from(100))],
            2,
        )
        .unwrap();
        world.rollback(fork);

        assert_eq!(
            world
                .committed()
                .unwrap()
                .get_tree_info(MerkleTreeId::NullifierTree),
            before
        );
        assert_eq!(world.block_number().unwrap(), 0);
        assert!(!world.has_open_writer());
    }

    #[test]
    fn test_single_writer_slot() {
        let world = WorldState::new(test_config(), Sha256Hasher).unwrap();
        let fork = world.fork(None).unwrap();
        assert!(matches!(world.fork(None), Err(WorldStateError::WriterBusy)));

        // Simulation forks never take the slot.
        let simulation = world.simulate(None).unwrap();
        assert!(!simulation.is_writable());
        assert!(matches!(
            world.commit(simulation),
            Err(WorldStateError::ReadOnlyFork)
        ));

        fork.close();
        assert!(!world.has_open_writer());
        assert!(world.fork(None).is_ok());
    }

    #[test]
    fn test_stale_fork_is_rejected() {
        let world = WorldState::new(test_config(), Sha256Hasher).unwrap();
        world.commit(world.fork(None).unwrap()).unwrap();
        world.commit(world.fork(None).unwrap()).unwrap();

        let historical = world.fork(Some(1)).unwrap();
        match world.commit(historical) {
            Err(WorldStateError::StaleFork {
                base_block,
                committed_block,
            }) => {
                assert_eq!(base_block, 1);
                assert_eq!(committed_block, 2);
            }
            other => panic!("expected stale fork, got {:?}", other.map(|_| ())),
        }
        assert_eq!(world.block_number().unwrap(), 2);
    }

    #[test]
    fn test_unwind_makes_open_forks_stale() {
        let world = WorldState::new(test_config(), Sha256Hasher).unwrap();
        let genesis_root = world.committed().unwrap().get_tree_info(MerkleTreeId::Archive).root;
        world.commit(world.fork(None).unwrap()).unwrap();

        let reader = world.clone();
        let fork = world.simulate(None).unwrap();
        reader.unwind_to(0).unwrap();

        assert_eq!(world.block_number().unwrap(), 0);
        assert_eq!(
            world.committed().unwrap().get_tree_info(MerkleTreeId::Archive).root,
            genesis_root
        );
        assert_eq!(world.history_blocks().unwrap(), vec![0]);
        drop(fork);

        // Same base block number as before the unwind, but a new generation.
        let mut fork = world.fork(None).unwrap();
        fork.append_leaves(MerkleTreeId::NoteHashTree, &[Fr::from(1)])
            .unwrap();
        assert_eq!(world.commit(fork).unwrap(), 1);
    }

    #[test]
    fn test_history_is_bounded_and_prunable() {
        let world = WorldState::new(test_config(), Sha256Hasher).unwrap();
        for _ in 0..6 {
            world.commit(world.fork(None).unwrap()).unwrap();
        }
        assert_eq!(world.history_blocks().unwrap(), vec![3, 4, 5, 6]);
        assert!(matches!(
            world.get_snapshot(1),
            Err(WorldStateError::SnapshotNotFound(1))
        ));
        assert_eq!(world.get_snapshot(4).unwrap().block_number(), 4);

        world.remove_historical_before(6).unwrap();
        assert_eq!(world.history_blocks().unwrap(), vec![6]);
        assert!(world.unwind_to(5).is_err());
    }

    #[test]
    fn test_persisted_state_reloads() {
        init_logging();
        let store = MemStore::new();
        let world = WorldState::with_store(test_config(), Sha256Hasher, store.clone()).unwrap();

        let mut fork = world.fork(None).unwrap();
        fork.append_leaves(MerkleTreeId::NoteHashTree, &[Fr::from(5), Fr::from(6)])
            .unwrap();
        fork.sequential_insert(
            MerkleTreeId::PublicDataTree,
            &[IndexedLeaf::new(Fr::from(40), Fr::from(1))],
        )
        .unwrap();
        world.commit(fork).unwrap();
        let committed = world.committed().unwrap();

        let reopened = WorldState::with_store(test_config(), Sha256Hasher, store).unwrap();
        assert_eq!(reopened.block_number().unwrap(), 1);
        let reloaded = reopened.committed().unwrap();
        for id in MerkleTreeId::ALL {
            assert_eq!(reloaded.get_tree_info(id), committed.get_tree_info(id));
        }
    }

    #[test]
    fn test_unwind_rewrites_store() {
        let store = MemStore::new();
        let world = WorldState::with_store(test_config(), Sha256Hasher, store.clone()).unwrap();
        let genesis = world.committed().unwrap().get_tree_info(MerkleTreeId::NoteHashTree);

        let mut fork = world.fork(None).unwrap();
        fork.append_leaves(MerkleTreeId::NoteHashTree, &[Fr::from(5)])
            .unwrap();
        world.commit(fork).unwrap();
        world.unwind_to(0).unwrap();

        let reopened = WorldState::with_store(test_config(), Sha256Hasher, store).unwrap();
        assert_eq!(reopened.block_number().unwrap(), 0);
        assert_eq!(
            reopened
                .committed()
                .unwrap()
                .get_tree_info(MerkleTreeId::NoteHashTree),
            genesis
        );
    }
}
