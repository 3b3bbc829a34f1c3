//! Validator configuration

use crate::error::{ValidatorError, ValidatorResult};
use rollshrew_p2p::BatchTxRequesterConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// How long a proposal's missing txs may be fetched for.
    pub tx_fetch_deadline: Duration,
    /// Slots per epoch.
    pub epoch_duration: u64,
    /// Epoch committees kept in memory.
    pub committee_cache_size: usize,
    pub requester: BatchTxRequesterConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            tx_fetch_deadline: Duration::from_secs(6),
            epoch_duration: 32,
            committee_cache_size: 8,
            requester: BatchTxRequesterConfig::default(),
        }
    }
}

impl ValidatorConfig {
    pub fn validate(&self) -> ValidatorResult<()> {
        if self.epoch_duration == 0 {
            return Err(ValidatorError::Config(
                "epoch_duration must be positive".to_string(),
            ));
        }
        self.requester.validate()?;
        Ok(())
    }

    pub fn epoch_of(&self, slot: u64) -> u64 {
        slot / self.epoch_duration.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json() {
        let config: ValidatorConfig =
            serde_json::from_str(r#"{"epoch_duration": 4, "committee_cache_size": 2}"#).unwrap();
        assert_eq!(config.epoch_duration, 4);
        assert_eq!(config.epoch_of(9), 2);
        assert_eq!(config.requester, BatchTxRequesterConfig::default());
        assert!(config.validate().is_ok());

        let zero = ValidatorConfig {
            epoch_duration: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(ValidatorError::Config(_))));
    }
}
