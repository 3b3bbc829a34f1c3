//! World state for the rollup node
//!
//! Holds the five state trees at the last committed block and hands out
//! isolated forks for block building and re-execution. A committed snapshot
//! is a set of frozen, reference-counted tree layers: readers and forks share
//! it without locking, and a fork's writes live in its own layers until
//! [`WorldState::commit`] publishes them as the next block.
//!
//! Exactly one writer fork may be open at a time. [`WorldState::fork`] fails
//! with [`WorldStateError::WriterBusy`] otherwise, and the writer slot is
//! released whenever the fork is dropped, closed, rolled back or committed.
//! Forks opened with [`WorldState::simulate`] never take the slot and can
//! only be discarded.
//!
//! Commits are optimistic: a fork based on a block that is no longer the
//! committed head fails with [`WorldStateError::StaleFork`] and the caller
//! forks again.

pub mod block_builder;
pub mod config;
pub mod error;
pub mod tree_set;
pub mod world_state;

pub use block_builder::BuiltBlock;
pub use config::WorldStateConfig;
pub use error::{WorldStateError, WorldStateResult};
pub use tree_set::{TreeSet, TreeSnapshot};
pub use world_state::{ForkGuard, WorldState, WorldStateFork, WorldStateSnapshot, BLOCK_NUMBER_KEY};
