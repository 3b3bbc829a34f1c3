//! Fetching the missing txs of a block proposal from many peers at once
//!
//! A run drives two worker groups against the same shared tracker:
//!
//! - dumb workers cycle over every peer that has not yet answered usefully,
//!   asking each for fixed-size batches of the still-missing hashes. Peer and
//!   batch advance independently, so each peer sees every batch before any
//!   batch is sent to the same peer twice.
//! - smart workers only query peers whose last valid response showed they
//!   hold some of the missing txs, asking each for exactly those. A pinned
//!   peer is treated as holding everything until it answers.
//!
//! Workers check the stop condition at the top of each iteration. A request
//! in flight when the run stops is not cancelled; its late result only marks
//! txs that are already fetched.

use crate::config::BatchTxRequesterConfig;
use crate::error::P2pResult;
use crate::peer::PeerId;
use crate::protocol::{BlockTxsRequest, BlockTxsResponse, ReqRespStatus, ReqRespSubProtocol};
use crate::transport::ReqRespTransport;
use futures::future::join_all;
use log::{debug, info, warn};
use rollshrew_support::{BlockProposal, Tx, TxHash};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequesterState {
    Initialized,
    Running,
    Complete,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTxRequesterResult {
    /// Fetched txs, in proposal order.
    pub txs: Vec<Tx>,
    /// Hashes still missing when the run stopped.
    pub missing: Vec<TxHash>,
    pub state: RequesterState,
}

/// Stops a run at the next worker iteration.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
    wakeup: Arc<Notify>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.wakeup.notify_waiters();
    }
}

#[derive(Debug, Clone, Default)]
struct MissingTxMetadata {
    tx: Option<Tx>,
    in_flight: bool,
    requested_times: u32,
    peers: HashSet<PeerId>,
}

impl MissingTxMetadata {
    fn fetched(&self) -> bool {
        self.tx.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DumbStep {
    Request(PeerId, Vec<TxHash>),
    /// A full pass is done; the next one starts at this instant.
    WaitUntil(Instant),
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseOutcome {
    Discarded,
    Accepted { new_txs: usize, new_smart_peer: bool },
}

struct RequestTracker {
    proposal: BlockProposal,
    /// Hashes being chased, in the order they were requested.
    order: Vec<TxHash>,
    metadata: HashMap<TxHash, MissingTxMetadata>,
    smart_peers: BTreeSet<PeerId>,
    peers_to_txs: HashMap<PeerId, HashSet<TxHash>>,
    dumb_cursor: usize,
    dumb_rounds: u32,
    next_dumb_round: Option<Instant>,
    smart_cursor: usize,
}

impl RequestTracker {
    fn new(proposal: BlockProposal, missing: Vec<TxHash>) -> Self {
        let mut order = Vec::with_capacity(missing.len());
        let mut metadata = HashMap::new();
        for hash in missing {
            if metadata.insert(hash, MissingTxMetadata::default()).is_none() {
                order.push(hash);
            }
        }
        Self {
            proposal,
            order,
            metadata,
            smart_peers: BTreeSet::new(),
            peers_to_txs: HashMap::new(),
            dumb_cursor: 0,
            dumb_rounds: 0,
            next_dumb_round: None,
            smart_cursor: 0,
        }
    }

    fn unfetched(&self) -> impl Iterator<Item = &TxHash> {
        self.order
            .iter()
            .filter(|hash| self.metadata.get(*hash).is_some_and(|m| !m.fetched()))
    }

    fn all_fetched(&self) -> bool {
        self.unfetched().next().is_none()
    }

    fn mark_requested(&mut self, hashes: &[TxHash], in_flight: bool) {
        for hash in hashes {
            if let Some(meta) = self.metadata.get_mut(hash) {
                meta.requested_times += 1;
                if in_flight {
                    meta.in_flight = true;
                }
            }
        }
    }

    fn clear_in_flight(&mut self, hashes: &[TxHash]) {
        for hash in hashes {
            if let Some(meta) = self.metadata.get_mut(hash) {
                meta.in_flight = false;
            }
        }
    }

    /// Next step for a dumb worker.
    ///
    /// A pass hands out every `(peer, batch)` pair once. Once a pass is
    /// handed out, no request is issued until `round_interval` has elapsed.
    fn next_dumb_request(
        &mut self,
        candidates: &[PeerId],
        pinned: Option<&PeerId>,
        batch_size: usize,
        round_interval: Duration,
        now: Instant,
    ) -> DumbStep {
        let peers: Vec<&PeerId> = candidates
            .iter()
            .filter(|peer| !self.smart_peers.contains(*peer) && Some(*peer) != pinned)
            .collect();
        if peers.is_empty() {
            return DumbStep::Idle;
        }
        let unfetched: Vec<TxHash> = self.unfetched().copied().collect();
        let batches: Vec<&[TxHash]> = unfetched.chunks(batch_size).collect();
        if batches.is_empty() {
            return DumbStep::Idle;
        }
        if let Some(resume) = self.next_dumb_round {
            if now < resume {
                return DumbStep::WaitUntil(resume);
            }
            self.next_dumb_round = None;
        }

        let k = self.dumb_cursor;
        let peer = peers[k % peers.len()].clone();
        let batch = batches[(k % peers.len() + k / peers.len()) % batches.len()].to_vec();
        self.mark_requested(&batch, false);

        self.dumb_cursor += 1;
        if self.dumb_cursor >= peers.len() * batches.len() {
            self.dumb_cursor = 0;
            self.dumb_rounds += 1;
            self.next_dumb_round = Some(now + round_interval);
            debug!(
                "Dumb pass {} handed out over {} peers and {} batches",
                self.dumb_rounds,
                peers.len(),
                batches.len()
            );
        }
        DumbStep::Request(peer, batch)
    }

    /// Next `(peer, batch)` for a smart worker: the next smart peer, round
    /// robin, that holds unfetched txs not already being asked for.
    fn next_smart_request(&mut self, batch_size: usize) -> Option<(PeerId, Vec<TxHash>)> {
        let peers: Vec<PeerId> = self.smart_peers.iter().cloned().collect();
        for offset in 0..peers.len() {
            let index = (self.smart_cursor + offset) % peers.len();
            let peer = &peers[index];
            let Some(known) = self.peers_to_txs.get(peer) else {
                continue;
            };
            let batch: Vec<TxHash> = self
                .order
                .iter()
                .filter(|hash| known.contains(*hash))
                .filter(|hash| {
                    self.metadata
                        .get(*hash)
                        .is_some_and(|m| !m.fetched() && !m.in_flight)
                })
                .take(batch_size)
                .copied()
                .collect();
            if !batch.is_empty() {
                self.smart_cursor = index + 1;
                self.mark_requested(&batch, true);
                return Some((peer.clone(), batch));
            }
        }
        None
    }

    /// Apply a peer's response. Responses for another block, with a bitmap
    /// of the wrong length or claiming to hold nothing are discarded without
    /// touching any state.
    fn handle_response(&mut self, peer: &PeerId, response: BlockTxsResponse) -> ResponseOutcome {
        let proposal_hashes = &self.proposal.tx_hashes;
        if response.block_hash != self.proposal.archive_root
            || response.tx_indices.len() != proposal_hashes.len()
            || response.tx_indices.count_ones() == 0
        {
            return ResponseOutcome::Discarded;
        }

        let known: HashSet<TxHash> = response
            .tx_indices
            .indices()
            .into_iter()
            .map(|index| proposal_hashes[index])
            .collect();
        for hash in &known {
            if let Some(meta) = self.metadata.get_mut(hash) {
                meta.peers.insert(peer.clone());
            }
        }
        self.peers_to_txs.insert(peer.clone(), known);
        let new_smart_peer = self.smart_peers.insert(peer.clone());

        let mut new_txs = 0;
        for tx in response.txs {
            if let Some(meta) = self.metadata.get_mut(&tx.hash()) {
                if !meta.fetched() {
                    meta.tx = Some(tx);
                    new_txs += 1;
                }
            }
        }
        ResponseOutcome::Accepted {
            new_txs,
            new_smart_peer,
        }
    }

    fn result(&self, state: RequesterState) -> BatchTxRequesterResult {
        let mut txs = Vec::new();
        let mut missing = Vec::new();
        for hash in &self.order {
            let Some(meta) = self.metadata.get(hash) else {
                continue;
            };
            match &meta.tx {
                Some(tx) => txs.push(tx.clone()),
                None => {
                    debug!(
                        "{} still missing after {} requests, announced by {} peers",
                        hash,
                        meta.requested_times,
                        meta.peers.len()
                    );
                    missing.push(*hash);
                }
            }
        }
        BatchTxRequesterResult { txs, missing, state }
    }
}

/// One fetch run for the missing txs of a single proposal.
pub struct BatchTxRequester<T: ReqRespTransport> {
    transport: Arc<T>,
    config: BatchTxRequesterConfig,
    pinned_peer: Option<PeerId>,
    peers: Vec<PeerId>,
    deadline: Instant,
    tracker: Mutex<RequestTracker>,
    state: Mutex<RequesterState>,
    aborted: Arc<AtomicBool>,
    done: AtomicBool,
    wakeup: Arc<Notify>,
}

impl<T: ReqRespTransport> BatchTxRequester<T> {
    /// `peers` is expected least-loaded first (see `rank_peers_by_load`).
    pub fn new(
        proposal: BlockProposal,
        missing: Vec<TxHash>,
        pinned_peer: Option<PeerId>,
        peers: Vec<PeerId>,
        deadline: Instant,
        transport: Arc<T>,
        config: BatchTxRequesterConfig,
    ) -> P2pResult<Self> {
        config.validate()?;
        let mut tracker = RequestTracker::new(proposal, missing);
        if let Some(pinned) = &pinned_peer {
            let everything: HashSet<TxHash> = tracker.order.iter().copied().collect();
            tracker.peers_to_txs.insert(pinned.clone(), everything);
            tracker.smart_peers.insert(pinned.clone());
        }
        let done = tracker.order.is_empty();
        Ok(Self {
            transport,
            config,
            pinned_peer,
            peers,
            deadline,
            tracker: Mutex::new(tracker),
            state: Mutex::new(RequesterState::Initialized),
            aborted: Arc::new(AtomicBool::new(false)),
            done: AtomicBool::new(done),
            wakeup: Arc::new(Notify::new()),
        })
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            flag: self.aborted.clone(),
            wakeup: self.wakeup.clone(),
        }
    }

    pub async fn state(&self) -> RequesterState {
        *self.state.lock().await
    }

    /// Peers that have answered with a valid, non-empty response so far.
    pub async fn smart_peers(&self) -> Vec<PeerId> {
        self.tracker.lock().await.smart_peers.iter().cloned().collect()
    }

    fn should_stop(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
            || self.done.load(Ordering::SeqCst)
            || Instant::now() >= self.deadline
    }

    pub async fn run(&self) -> BatchTxRequesterResult {
        *self.state.lock().await = RequesterState::Running;
        let (block_number, wanted) = {
            let tracker = self.tracker.lock().await;
            (tracker.proposal.block_number, tracker.order.len())
        };
        info!(
            "Requesting {} missing txs for block {} from {} peers",
            wanted,
            block_number,
            self.peers.len() + usize::from(self.pinned_peer.is_some())
        );

        if !self.should_stop() {
            let dumb = join_all((0..self.config.dumb_workers).map(|id| self.dumb_worker(id)));
            let smart = join_all((0..self.config.smart_workers).map(|id| self.smart_worker(id)));
            futures::future::join(dumb, smart).await;
        }

        let tracker = self.tracker.lock().await;
        let state = if tracker.all_fetched() {
            RequesterState::Complete
        } else {
            RequesterState::TimedOut
        };
        *self.state.lock().await = state;
        let result = tracker.result(state);
        info!(
            "Requester for block {} finished {:?}: fetched {}, missing {}",
            block_number,
            state,
            result.txs.len(),
            result.missing.len()
        );
        result
    }

    async fn dumb_worker(&self, id: usize) {
        while !self.should_stop() {
            let next = self.tracker.lock().await.next_dumb_request(
                &self.peers,
                self.pinned_peer.as_ref(),
                self.config.tx_batch_size,
                self.config.dumb_round_interval,
                Instant::now(),
            );
            match next {
                DumbStep::Request(peer, batch) => {
                    self.request_and_apply(&peer, batch, false).await
                }
                DumbStep::WaitUntil(resume) => {
                    let wait = resume.min(self.deadline).saturating_duration_since(Instant::now());
                    let _ = timeout(wait, self.wakeup.notified()).await;
                }
                DumbStep::Idle => {
                    debug!("Dumb worker {} has no peers left to try", id);
                    return;
                }
            }
        }
    }

    async fn smart_worker(&self, id: usize) {
        while !self.should_stop() {
            let next = self
                .tracker
                .lock()
                .await
                .next_smart_request(self.config.tx_batch_size);
            match next {
                Some((peer, batch)) => self.request_and_apply(&peer, batch, true).await,
                None => {
                    let remaining = self.deadline.saturating_duration_since(Instant::now());
                    let wait = self.config.smart_poll_interval.min(remaining);
                    let _ = timeout(wait, self.wakeup.notified()).await;
                }
            }
        }
        debug!("Smart worker {} stopped", id);
    }

    async fn request_and_apply(&self, peer: &PeerId, batch: Vec<TxHash>, in_flight: bool) {
        let response = self.request_from_peer(peer, &batch).await;
        let mut tracker = self.tracker.lock().await;
        if in_flight {
            tracker.clear_in_flight(&batch);
        }
        let Some(response) = response else {
            return;
        };
        match tracker.handle_response(peer, response) {
            ResponseOutcome::Discarded => {
                warn!("Discarding mismatching block txs response from {}", peer);
            }
            ResponseOutcome::Accepted {
                new_txs,
                new_smart_peer,
            } => {
                debug!("{} returned {} new txs", peer, new_txs);
                if tracker.all_fetched() {
                    self.done.store(true, Ordering::SeqCst);
                }
                if new_smart_peer || self.done.load(Ordering::SeqCst) {
                    self.wakeup.notify_waiters();
                }
            }
        }
    }

    /// One request to one peer. Any failure is logged and yields `None`.
    async fn request_from_peer(&self, peer: &PeerId, batch: &[TxHash]) -> Option<BlockTxsResponse> {
        let archive_root = self.tracker.lock().await.proposal.archive_root;
        let request = BlockTxsRequest {
            archive_root,
            tx_hashes: batch.to_vec(),
        };
        let bytes = match request.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode block txs request: {}", e);
                return None;
            }
        };

        let remaining = self.deadline.saturating_duration_since(Instant::now());
        let limit = self.config.individual_request_timeout.min(remaining);
        debug!("Requesting {} txs from {}", batch.len(), peer);
        let response = match timeout(
            limit,
            self.transport
                .send_request_to_peer(peer, ReqRespSubProtocol::BlockTxs, bytes),
        )
        .await
        {
            Err(_) => {
                warn!("Request to {} timed out after {:?}", peer, limit);
                return None;
            }
            Ok(Err(e)) => {
                warn!("Request to {} failed: {}", peer, e);
                return None;
            }
            Ok(Ok(response)) => response,
        };

        if response.status != ReqRespStatus::Success {
            debug!("{} refused block txs request", peer);
            return None;
        }
        match BlockTxsResponse::from_bytes(&response.data) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!("Undecodable block txs response from {}: {}", peer, e);
                None
            }
        }
    }
}
