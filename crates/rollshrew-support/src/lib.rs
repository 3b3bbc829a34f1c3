//! Support library shared by the rollshrew crates
//!
//! This crate holds the plain data types that every layer of the node passes
//! around: field elements, transactions and their side effects, blocks, block
//! headers and proposals. It also carries the small byte-level helpers used to
//! give those types a fixed binary encoding.
//!
//! # Modules
//!
//! - [`fr`]: 32-byte field element used for keys, leaves and hashes
//! - [`hash`]: sha256 domain hashing helpers
//! - [`tx`]: transactions, tx hashes and tx effects
//! - [`block`]: block headers, blocks, block ids, chain tips and proposals
//! - [`utils`]: cursor-based decoding helpers

pub mod block;
pub mod fr;
pub mod hash;
pub mod tx;
pub mod utils;

pub use block::{BlockHeader, BlockProposal, L2Block, L2BlockId, L2Tips};
pub use fr::Fr;
pub use hash::sha256_fr;
pub use tx::{PublicDataWrite, Tx, TxEffect, TxHash};
