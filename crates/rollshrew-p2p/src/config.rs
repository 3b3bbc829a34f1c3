//! Requester configuration

use crate::error::{P2pError, P2pResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchTxRequesterConfig {
    /// Tx hashes per request.
    pub tx_batch_size: usize,
    /// Concurrent workers cycling over every peer.
    pub dumb_workers: usize,
    /// Concurrent workers querying peers known to hold txs.
    pub smart_workers: usize,
    /// Upper bound for a single request; also capped by the run deadline.
    pub individual_request_timeout: Duration,
    /// How long an idle smart worker sleeps before rechecking for work.
    pub smart_poll_interval: Duration,
    /// Pause between two full dumb passes over every peer and batch.
    pub dumb_round_interval: Duration,
}

impl Default for BatchTxRequesterConfig {
    fn default() -> Self {
        Self {
            tx_batch_size: 8,
            dumb_workers: 10,
            smart_workers: 10,
            individual_request_timeout: Duration::from_secs(2),
            smart_poll_interval: Duration::from_millis(50),
            dumb_round_interval: Duration::from_millis(500),
        }
    }
}

impl BatchTxRequesterConfig {
    pub fn validate(&self) -> P2pResult<()> {
        if self.tx_batch_size == 0 {
            return Err(P2pError::Config("tx_batch_size must be positive".to_string()));
        }
        if self.dumb_workers == 0 && self.smart_workers == 0 {
            return Err(P2pError::Config("at least one worker is required".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_validation() {
        let config = BatchTxRequesterConfig::default();
        assert_eq!(config.tx_batch_size, 8);
        assert_eq!(config.dumb_workers, 10);
        assert_eq!(config.smart_workers, 10);
        assert_eq!(config.dumb_round_interval, Duration::from_millis(500));
        assert!(config.validate().is_ok());

        let parsed: BatchTxRequesterConfig =
            serde_json::from_str(r#"{"tx_batch_size": 0}"#).unwrap();
        assert_eq!(parsed.smart_workers, 10);
        assert!(parsed.validate().is_err());
    }
}
