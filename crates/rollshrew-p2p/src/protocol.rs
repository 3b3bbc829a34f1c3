//! Request/response protocol messages and their wire frames
//!
//! Frames are fixed-width big-endian binary, snappy-compressed as a whole.

use crate::bitvector::BitVector;
use crate::error::{P2pError, P2pResult};
use rollshrew_support::utils::{consume_fr, consume_fr_list, consume_u32, is_empty, write_fr_list};
use rollshrew_support::{Fr, Tx, TxHash};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReqRespSubProtocol {
    BlockTxs,
}

impl fmt::Display for ReqRespSubProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReqRespSubProtocol::BlockTxs => f.write_str("/rollshrew/req/block_txs/1.0.0"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReqRespStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReqRespResponse {
    pub status: ReqRespStatus,
    pub data: Vec<u8>,
}

impl ReqRespResponse {
    pub fn success(data: Vec<u8>) -> Self {
        Self {
            status: ReqRespStatus::Success,
            data,
        }
    }

    pub fn failure() -> Self {
        Self {
            status: ReqRespStatus::Failure,
            data: Vec::new(),
        }
    }
}

fn compress(raw: &[u8]) -> P2pResult<Vec<u8>> {
    snap::raw::Encoder::new()
        .compress_vec(raw)
        .map_err(|e| P2pError::Codec(format!("compress: {}", e)))
}

fn decompress(bytes: &[u8]) -> P2pResult<Cursor<Vec<u8>>> {
    let raw = snap::raw::Decoder::new()
        .decompress_vec(bytes)
        .map_err(|e| P2pError::Codec(format!("decompress: {}", e)))?;
    Ok(Cursor::new(raw))
}

fn codec_error(err: anyhow::Error) -> P2pError {
    P2pError::Codec(err.to_string())
}

fn expect_end(cursor: &mut Cursor<Vec<u8>>) -> P2pResult<()> {
    if is_empty(cursor) {
        Ok(())
    } else {
        Err(P2pError::Codec("trailing bytes after frame".to_string()))
    }
}

/// Ask a peer for the txs of the proposal identified by `archive_root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTxsRequest {
    pub archive_root: Fr,
    pub tx_hashes: Vec<TxHash>,
}

impl BlockTxsRequest {
    pub fn to_bytes(&self) -> P2pResult<Vec<u8>> {
        let mut raw = Vec::with_capacity(Fr::SIZE * (self.tx_hashes.len() + 1) + 4);
        raw.extend_from_slice(self.archive_root.as_bytes());
        let hashes: Vec<Fr> = self.tx_hashes.iter().map(|h| h.0).collect();
        write_fr_list(&mut raw, &hashes);
        compress(&raw)
    }

    pub fn from_bytes(bytes: &[u8]) -> P2pResult<Self> {
        let mut cursor = decompress(bytes)?;
        let archive_root = consume_fr(&mut cursor).map_err(codec_error)?;
        let tx_hashes = consume_fr_list(&mut cursor)
            .map_err(codec_error)?
            .into_iter()
            .map(TxHash)
            .collect();
        expect_end(&mut cursor)?;
        Ok(Self {
            archive_root,
            tx_hashes,
        })
    }
}

/// A peer's answer: which of the proposal's txs it holds, plus the requested
/// ones it could serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTxsResponse {
    pub block_hash: Fr,
    /// Bit `i` set when the peer holds the proposal's `i`-th tx.
    pub tx_indices: BitVector,
    pub txs: Vec<Tx>,
}

impl BlockTxsResponse {
    /// Response of a peer that does not know the block at all.
    pub fn empty() -> Self {
        Self {
            block_hash: Fr::ZERO,
            tx_indices: BitVector::default(),
            txs: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> P2pResult<Vec<u8>> {
        let mut raw = Vec::new();
        raw.extend_from_slice(self.block_hash.as_bytes());
        self.tx_indices.encode(&mut raw);
        raw.extend_from_slice(&(self.txs.len() as u32).to_be_bytes());
        for tx in &self.txs {
            raw.extend_from_slice(&tx.to_bytes());
        }
        compress(&raw)
    }

    pub fn from_bytes(bytes: &[u8]) -> P2pResult<Self> {
        let mut cursor = decompress(bytes)?;
        let block_hash = consume_fr(&mut cursor).map_err(codec_error)?;
        let tx_indices = BitVector::decode(&mut cursor).map_err(codec_error)?;
        let count = consume_u32(&mut cursor).map_err(codec_error)?;
        let mut txs = Vec::new();
        for _ in 0..count {
            txs.push(Tx::decode(&mut cursor).map_err(codec_error)?);
        }
        expect_end(&mut cursor)?;
        Ok(Self {
            block_hash,
            tx_indices,
            txs,
        })
    }
}
