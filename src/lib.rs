//! Rollshrew Test Suite
//!
//! Cross-crate scenarios for the rollup node core: block streams driving a
//! world state through reorgs, the batch tx requester against mixed peer
//! sets, proposal validation end to end and persisted state reloads.

pub mod tests;

pub use tests::{TestConfig, TestUtils};
