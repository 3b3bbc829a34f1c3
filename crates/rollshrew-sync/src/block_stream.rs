//! Reconciling local chain state with a block source
//!
//! Each [`L2BlockStream::work`] pass compares the local tips with the
//! source's, walks back to the last common block when the local chain
//! diverged, then feeds the missing blocks to the handler in batches. Local
//! pointers are owned by the handler side: a pass that fails part way leaves
//! them where the last successful event put them, and the next pass resumes
//! from there.

use crate::config::BlockStreamConfig;
use crate::error::SyncResult;
use crate::traits::{L2BlockSource, L2BlockStreamEventHandler, L2BlockStreamLocalDataProvider};
use crate::types::L2BlockStreamEvent;
use log::{debug, error, info, warn};
use rollshrew_support::{Fr, L2BlockId, L2Tips};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

pub struct L2BlockStream<S, L, E>
where
    S: L2BlockSource,
    L: L2BlockStreamLocalDataProvider,
    E: L2BlockStreamEventHandler,
{
    source: Arc<S>,
    local: Arc<L>,
    handler: Arc<E>,
    config: BlockStreamConfig,
    running: AtomicBool,
    stop_requested: AtomicBool,
    wakeup: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S, L, E> L2BlockStream<S, L, E>
where
    S: L2BlockSource + 'static,
    L: L2BlockStreamLocalDataProvider + 'static,
    E: L2BlockStreamEventHandler + 'static,
{
    pub fn new(source: Arc<S>, local: Arc<L>, handler: Arc<E>, config: BlockStreamConfig) -> Self {
        Self {
            source,
            local,
            handler,
            config,
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            wakeup: Notify::new(),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask an in-progress pass to stop at the next batch boundary.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Run `work()` on a background task every `poll_interval`.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Block stream already running");
            return;
        }
        self.stop_requested.store(false, Ordering::SeqCst);
        info!(
            "Starting block stream (batch size {}, poll interval {:?})",
            self.config.batch_size, self.config.poll_interval
        );

        let stream = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while stream.is_running() {
                if let Err(e) = stream.work().await {
                    error!("Block stream pass failed: {}", e);
                }
                tokio::select! {
                    _ = tokio::time::sleep(stream.config.poll_interval) => {}
                    _ = stream.wakeup.notified() => {}
                }
            }
            debug!("Block stream loop exited");
        });
        *self.task.lock().await = Some(handle);
    }

    /// Stop the background loop and wait for it to exit.
    pub async fn stop(&self) {
        self.request_stop();
        self.running.store(false, Ordering::SeqCst);
        self.wakeup.notify_waiters();
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Block stream task ended abnormally: {}", e);
            }
        }
        info!("Block stream stopped");
    }

    /// One pass, clearing any earlier stop request first.
    pub async fn sync(&self) -> SyncResult<()> {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.work().await
    }

    pub async fn work(&self) -> SyncResult<()> {
        let source_tips = self.source.get_l2_tips().await?;
        let local_tips = self.local.get_l2_tips().await?;
        let mut latest = local_tips.latest.number;
        debug!(
            "Block stream pass: local latest {}, source latest {}",
            latest, source_tips.latest.number
        );

        let past_start = self
            .config
            .starting_block
            .map_or(true, |start| latest >= start);
        if past_start {
            while !self.hashes_equal_at(latest, &source_tips).await? {
                latest -= 1;
            }
            if latest < local_tips.latest.number {
                let pruned_to = latest.min(source_tips.latest.number);
                let hash = self
                    .source_block_hash(pruned_to, &source_tips)
                    .await?
                    .or(self.local.get_l2_block_hash(pruned_to).await?)
                    .unwrap_or(Fr::ZERO);
                info!(
                    "Reorg detected: local chain at {} diverged after block {}",
                    local_tips.latest.number, pruned_to
                );
                self.emit(L2BlockStreamEvent::ChainPruned {
                    block: L2BlockId::new(pruned_to, hash),
                })
                .await?;
                latest = pruned_to;
            }
        }

        if latest == 0 {
            if let Some(start) = self.config.starting_block {
                latest = start.saturating_sub(1);
            }
        }

        if self.config.skip_finalized
            && source_tips.finalized.number > latest.saturating_add(self.config.batch_size)
        {
            info!(
                "Skipping from block {} to finalized block {}",
                latest, source_tips.finalized.number
            );
            latest = source_tips.finalized.number;
        }

        let target = if self.config.proven_only {
            source_tips.proven.number
        } else {
            source_tips.latest.number
        };
        let batch_size = self.config.batch_size.max(1);
        while latest < target {
            if self.stop_requested.load(Ordering::SeqCst) {
                debug!("Stop requested, leaving block stream pass at {}", latest);
                return Ok(());
            }
            let from = latest + 1;
            let limit = batch_size.min(target - from + 1);
            let blocks = self
                .source
                .get_published_blocks(from, limit, self.config.proven_only)
                .await?;
            let Some(last) = blocks.last() else {
                debug!("Source returned no blocks from {}", from);
                break;
            };
            let last_number = last.number();
            debug!("Emitting blocks {}..={}", from, last_number);
            self.emit(L2BlockStreamEvent::BlocksAdded { blocks }).await?;
            latest = last_number;
        }

        if source_tips.proven.number > local_tips.proven.number {
            self.emit(L2BlockStreamEvent::ChainProven {
                block: source_tips.proven,
            })
            .await?;
        }
        if source_tips.finalized.number > local_tips.finalized.number {
            self.emit(L2BlockStreamEvent::ChainFinalized {
                block: source_tips.finalized,
            })
            .await?;
        }
        Ok(())
    }

    async fn source_block_hash(&self, number: u32, source_tips: &L2Tips) -> SyncResult<Option<Fr>> {
        if number == source_tips.latest.number {
            return Ok(Some(source_tips.latest.hash));
        }
        Ok(self
            .source
            .get_block_header(Some(number))
            .await?
            .map(|header| header.hash()))
    }

    async fn hashes_equal_at(&self, number: u32, source_tips: &L2Tips) -> SyncResult<bool> {
        if number == 0 {
            return Ok(true);
        }
        let local = self.local.get_l2_block_hash(number).await?;
        let source = self.source_block_hash(number, source_tips).await?;
        Ok(local == source)
    }

    async fn emit(&self, event: L2BlockStreamEvent) -> SyncResult<()> {
        let kind = event.kind();
        self.handler
            .handle_block_stream_event(event)
            .await
            .map_err(|e| {
                error!("Handler failed on {} event: {}", kind, e);
                e
            })
    }
}
