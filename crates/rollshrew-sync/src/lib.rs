//! Block stream synchronization
//!
//! [`L2BlockStream`] reconciles what a consumer has processed with what a
//! block source has published. Each pass walks back to the last block both
//! sides agree on, reports a prune when the local chain diverged, then feeds
//! the missing blocks forward in batches and announces proven and finalized
//! tips as they advance.
//!
//! Consumers plug in through [`L2BlockStreamLocalDataProvider`] and
//! [`L2BlockStreamEventHandler`]. [`L2TipsStore`] is the minimal consumer
//! that only tracks hashes; [`WorldStateSynchronizer`] re-executes every
//! block against a world state and rejects blocks it cannot reproduce.

pub mod block_stream;
pub mod config;
pub mod error;
pub mod mock;
pub mod synchronizer;
pub mod tips_store;
pub mod traits;
pub mod types;

pub use block_stream::L2BlockStream;
pub use config::BlockStreamConfig;
pub use error::{SyncError, SyncResult};
pub use synchronizer::WorldStateSynchronizer;
pub use tips_store::L2TipsStore;
pub use traits::{L2BlockSource, L2BlockStreamEventHandler, L2BlockStreamLocalDataProvider};
pub use types::L2BlockStreamEvent;
