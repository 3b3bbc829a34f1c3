//! Peer-to-peer transaction retrieval
//!
//! Validators receive block proposals carrying only tx hashes. This crate
//! fetches the txs they do not have from connected peers over the
//! `BlockTxs` request/response protocol:
//!
//! - [`protocol`]: request and response messages with their snappy-compressed
//!   binary frames, plus the [`BitVector`] presence bitmap
//! - [`transport`]: the [`ReqRespTransport`] capability the requester sends
//!   through
//! - [`requester`]: the [`BatchTxRequester`] that drives concurrent dumb and
//!   smart worker groups until every tx is fetched or the deadline passes
//! - [`handler`]: the serving side, answering requests from a [`TxPool`]
//! - [`mock`]: an in-memory network with configurable peer behaviours

pub mod bitvector;
pub mod config;
pub mod epoch_cache;
pub mod error;
pub mod handler;
pub mod mock;
pub mod peer;
pub mod protocol;
pub mod requester;
pub mod transport;
pub mod tx_pool;

pub use bitvector::BitVector;
pub use config::BatchTxRequesterConfig;
pub use epoch_cache::EpochCache;
pub use error::{P2pError, P2pResult};
pub use handler::{handle_block_txs_request, BlockTxsRequestHandler};
pub use mock::{InMemoryReqResp, PeerBehavior};
pub use peer::{rank_peers_by_load, PeerConnection, PeerId};
pub use protocol::{
    BlockTxsRequest, BlockTxsResponse, ReqRespResponse, ReqRespStatus, ReqRespSubProtocol,
};
pub use requester::{AbortHandle, BatchTxRequester, BatchTxRequesterResult, RequesterState};
pub use transport::ReqRespTransport;
pub use tx_pool::TxPool;
