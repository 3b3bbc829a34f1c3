//! Block proposal validation
//!
//! [`ProposalValidator`] decides whether a node should attest to a block
//! proposal. It checks the proposer against the epoch committee, hydrates
//! the proposal's txs from the local pool or from peers through the
//! batch tx requester, and re-executes them on a simulation fork of the
//! parent block's world state.

pub mod committee;
pub mod config;
pub mod error;
pub mod validator;

pub use committee::{CommitteeCache, CommitteeSource, StaticCommittee};
pub use config::ValidatorConfig;
pub use error::{ValidatorError, ValidatorResult};
pub use validator::{ProposalValidator, ValidationOutcome};
