//! Block stream configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockStreamConfig {
    /// Blocks requested from the source per `blocks-added` event.
    pub batch_size: u32,
    /// Delay between `work()` passes of the background loop.
    pub poll_interval: Duration,
    /// Jump straight to the source's finalized block when more than one
    /// batch behind it.
    pub skip_finalized: bool,
    /// First block to fetch when the local chain is empty.
    pub starting_block: Option<u32>,
    /// Follow the proven chain instead of the latest one.
    pub proven_only: bool,
}

impl Default for BlockStreamConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            poll_interval: Duration::from_secs(1),
            skip_finalized: false,
            starting_block: None,
            proven_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json() {
        let config: BlockStreamConfig =
            serde_json::from_str(r#"{"batch_size": 5, "starting_block": 10}"#).unwrap();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.starting_block, Some(10));
        assert!(!config.skip_finalized);
    }
}
