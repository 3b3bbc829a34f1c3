//! In-memory request/response network for tests

use crate::error::{P2pError, P2pResult};
use crate::handler::BlockTxsRequestHandler;
use crate::peer::PeerId;
use crate::protocol::{BlockTxsRequest, ReqRespResponse, ReqRespSubProtocol};
use crate::transport::ReqRespTransport;
use async_trait::async_trait;
use log::debug;
use rollshrew_support::Fr;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// How a mock peer treats incoming requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Serve from the peer's handler.
    Honest,
    /// Serve, but claim a different block hash.
    WrongArchive,
    /// Fail every request at the transport level.
    Failing,
    /// Serve honestly after a delay.
    Slow(Duration),
    /// Answer with undecodable bytes.
    Garbage,
}

struct MockPeer {
    behavior: PeerBehavior,
    handler: BlockTxsRequestHandler,
}

/// Routes requests to per-peer handlers and counts them.
#[derive(Clone, Default)]
pub struct InMemoryReqResp {
    peers: Arc<RwLock<HashMap<PeerId, MockPeer>>>,
    requests: Arc<RwLock<HashMap<PeerId, usize>>>,
}

impl InMemoryReqResp {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_peer(
        &self,
        peer: PeerId,
        behavior: PeerBehavior,
        handler: BlockTxsRequestHandler,
    ) {
        self.peers
            .write()
            .await
            .insert(peer, MockPeer { behavior, handler });
    }

    pub async fn set_behavior(&self, peer: &PeerId, behavior: PeerBehavior) {
        if let Some(mock) = self.peers.write().await.get_mut(peer) {
            mock.behavior = behavior;
        }
    }

    pub async fn requests_to(&self, peer: &PeerId) -> usize {
        self.requests.read().await.get(peer).copied().unwrap_or(0)
    }

    pub async fn total_requests(&self) -> usize {
        self.requests.read().await.values().sum()
    }
}

#[async_trait]
impl ReqRespTransport for InMemoryReqResp {
    async fn send_request_to_peer(
        &self,
        peer: &PeerId,
        protocol: ReqRespSubProtocol,
        request: Vec<u8>,
    ) -> P2pResult<ReqRespResponse> {
        *self.requests.write().await.entry(peer.clone()).or_insert(0) += 1;
        tokio::task::yield_now().await;

        let (behavior, handler) = {
            let peers = self.peers.read().await;
            let mock = peers.get(peer).ok_or_else(|| P2pError::Transport {
                peer: peer.to_string(),
                message: "unknown peer".to_string(),
            })?;
            (mock.behavior.clone(), mock.handler.clone())
        };
        debug!("{} request to {} ({} bytes)", protocol, peer, request.len());

        match behavior {
            PeerBehavior::Honest => Ok(handler.handle(&request).await),
            PeerBehavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(handler.handle(&request).await)
            }
            PeerBehavior::Failing => Err(P2pError::Transport {
                peer: peer.to_string(),
                message: "connection reset".to_string(),
            }),
            PeerBehavior::Garbage => Ok(ReqRespResponse::success(vec![0xde, 0xad, 0xbe, 0xef])),
            PeerBehavior::WrongArchive => {
                let request = BlockTxsRequest::from_bytes(&request)?;
                let mut response = handler.respond(&request).await;
                response.block_hash = Fr::from(0xbad_u64);
                Ok(ReqRespResponse::success(response.to_bytes()?))
            }
        }
    }
}
