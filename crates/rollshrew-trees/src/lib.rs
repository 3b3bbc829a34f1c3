//! Append-only and indexed Merkle trees
//!
//! The trees in this crate are fixed-depth binary Merkle trees filled from
//! the left. [`AppendOnlyTree`] supports appends and sibling paths;
//! [`IndexedTree`] layers a sorted linked list of key/value leaves on top of
//! it and produces the low-leaf witnesses needed to prove non-membership and
//! insertion.
//!
//! # Copy-on-write layers
//!
//! Tree state lives in [`TreeLayer`]s. A committed tree is an
//! `Arc<TreeLayer>`; opening a tree on top of it with `from_committed` gives a
//! private writable layer, so forks are cheap and readers of the committed
//! state never observe in-progress writes. Committing a fork freezes its layer
//! into a new `Arc`, flattening long chains to keep lookups bounded.
//!
//! # Persistence
//!
//! [`persist`] stages layers into any [`KeyValueStoreLike`] backend using the
//! key layout in [`key_utils`]: leaf preimages by `(tree, index)`, one meta
//! record per tree and a multi-value `key -> [index]` index. [`MemStore`] is
//! the in-memory backend; a RocksDB backend is available behind the `rocksdb`
//! feature.

pub mod append_only;
pub mod error;
pub mod hasher;
pub mod indexed;
pub mod key_utils;
pub mod layer;
pub mod leaf;
pub mod mem_store;
pub mod persist;
#[cfg(feature = "rocksdb")]
pub mod rocksdb_store;
pub mod traits;
pub mod types;

pub use append_only::AppendOnlyTree;
pub use error::{TreeError, TreeResult};
pub use hasher::{Hasher, Sha256Hasher};
pub use indexed::IndexedTree;
pub use layer::TreeLayer;
pub use leaf::{IndexedLeaf, IndexedLeafPreimage, TreeLeaf};
pub use mem_store::{MemStore, MemStoreBatch};
#[cfg(feature = "rocksdb")]
pub use rocksdb_store::RocksDbStore;
pub use traits::{BatchLike, KeyValueStoreLike};
pub use types::*;
