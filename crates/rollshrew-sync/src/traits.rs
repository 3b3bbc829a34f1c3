//! Capabilities the block stream is wired to

use crate::error::SyncResult;
use crate::types::L2BlockStreamEvent;
use async_trait::async_trait;
use rollshrew_support::{BlockHeader, Fr, L2Block, L2Tips};

/// Where published blocks come from (an archiver or a remote node).
#[async_trait]
pub trait L2BlockSource: Send + Sync {
    async fn get_l2_tips(&self) -> SyncResult<L2Tips>;

    /// Up to `limit` consecutive blocks starting at `from`. With
    /// `proven_only`, nothing past the proven tip is returned.
    async fn get_published_blocks(
        &self,
        from: u32,
        limit: u32,
        proven_only: bool,
    ) -> SyncResult<Vec<L2Block>>;

    /// Header of block `number`, or of the latest block when `None`.
    async fn get_block_header(&self, number: Option<u32>) -> SyncResult<Option<BlockHeader>>;
}

/// What the consumer has already processed.
#[async_trait]
pub trait L2BlockStreamLocalDataProvider: Send + Sync {
    async fn get_l2_tips(&self) -> SyncResult<L2Tips>;

    async fn get_l2_block_hash(&self, number: u32) -> SyncResult<Option<Fr>>;
}

/// Receives the events emitted by `L2BlockStream::work`.
///
/// Events may be delivered more than once after a failed pass, so handlers
/// have to be idempotent.
#[async_trait]
pub trait L2BlockStreamEventHandler: Send + Sync {
    async fn handle_block_stream_event(&self, event: L2BlockStreamEvent) -> SyncResult<()>;
}
