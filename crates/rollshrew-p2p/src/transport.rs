//! Request/response transport capability

use crate::error::P2pResult;
use crate::peer::PeerId;
use crate::protocol::{ReqRespResponse, ReqRespSubProtocol};
use async_trait::async_trait;
use std::sync::Arc;

/// Sends one request to one peer and waits for its response.
///
/// Implementations report connection-level failures as errors; a peer that
/// answered but refused the request yields a `Failure` status instead.
#[async_trait]
pub trait ReqRespTransport: Send + Sync {
    async fn send_request_to_peer(
        &self,
        peer: &PeerId,
        protocol: ReqRespSubProtocol,
        request: Vec<u8>,
    ) -> P2pResult<ReqRespResponse>;
}

#[async_trait]
impl<T: ReqRespTransport + ?Sized> ReqRespTransport for Arc<T> {
    async fn send_request_to_peer(
        &self,
        peer: &PeerId,
        protocol: ReqRespSubProtocol,
        request: Vec<u8>,
    ) -> P2pResult<ReqRespResponse> {
        (**self).send_request_to_peer(peer, protocol, request).await
    }
}
