//! Epoch committees and slot proposers

use crate::error::{ValidatorError, ValidatorResult};
use async_trait::async_trait;
use log::debug;
use rollshrew_p2p::{EpochCache, PeerId};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where epoch committees come from (usually the L1 rollup contract).
#[async_trait]
pub trait CommitteeSource: Send + Sync {
    async fn get_committee(&self, epoch: u64) -> ValidatorResult<Vec<PeerId>>;
}

#[async_trait]
impl<T: CommitteeSource + ?Sized> CommitteeSource for Arc<T> {
    async fn get_committee(&self, epoch: u64) -> ValidatorResult<Vec<PeerId>> {
        (**self).get_committee(epoch).await
    }
}

/// A committee that never changes.
#[derive(Debug, Clone)]
pub struct StaticCommittee {
    members: Vec<PeerId>,
}

impl StaticCommittee {
    pub fn new(members: Vec<PeerId>) -> Self {
        Self { members }
    }
}

#[async_trait]
impl CommitteeSource for StaticCommittee {
    async fn get_committee(&self, _epoch: u64) -> ValidatorResult<Vec<PeerId>> {
        Ok(self.members.clone())
    }
}

/// Committee lookups backed by a bounded per-epoch cache.
pub struct CommitteeCache<C: CommitteeSource> {
    source: C,
    cache: Mutex<EpochCache<Vec<PeerId>>>,
}

impl<C: CommitteeSource> CommitteeCache<C> {
    pub fn new(source: C, capacity: usize) -> Self {
        Self {
            source,
            cache: Mutex::new(EpochCache::new(capacity)),
        }
    }

    pub async fn committee(&self, epoch: u64) -> ValidatorResult<Vec<PeerId>> {
        if let Some(committee) = self.cache.lock().await.get(epoch) {
            return Ok(committee.clone());
        }
        let committee = self.source.get_committee(epoch).await?;
        debug!("Fetched committee of {} for epoch {}", committee.len(), epoch);
        self.cache.lock().await.insert(epoch, committee.clone());
        Ok(committee)
    }

    /// The committee member allowed to propose in `slot`.
    pub async fn proposer(&self, epoch: u64, slot: u64) -> ValidatorResult<PeerId> {
        let committee = self.committee(epoch).await?;
        if committee.is_empty() {
            return Err(ValidatorError::Committee(format!(
                "empty committee for epoch {}",
                epoch
            )));
        }
        Ok(committee[(slot % committee.len() as u64) as usize].clone())
    }

    pub async fn cached_epochs(&self) -> Vec<u64> {
        self.cache.lock().await.epochs()
    }
}
