//! World state configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldStateConfig {
    pub note_hash_tree_depth: u8,
    pub nullifier_tree_depth: u8,
    pub public_data_tree_depth: u8,
    pub l1_to_l2_message_tree_depth: u8,
    pub archive_tree_depth: u8,
    /// Prefilled leaves in the nullifier tree, keys `0..n`.
    pub initial_nullifier_tree_size: u64,
    /// Prefilled leaves in the public data tree, keys `0..n`.
    pub initial_public_data_tree_size: u64,
    /// Each tx's nullifiers are batch-inserted as one subtree of this height.
    pub nullifier_subtree_height: u8,
    /// Committed snapshots retained for historical reads and unwinding.
    pub history_length: usize,
    /// Committed layer chains longer than this are flattened.
    pub max_layer_chain: usize,
}

impl Default for WorldStateConfig {
    fn default() -> Self {
        Self {
            note_hash_tree_depth: 40,
            nullifier_tree_depth: 40,
            public_data_tree_depth: 40,
            l1_to_l2_message_tree_depth: 39,
            archive_tree_depth: 29,
            initial_nullifier_tree_size: 128,
            initial_public_data_tree_size: 128,
            nullifier_subtree_height: 6,
            history_length: 64,
            max_layer_chain: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: WorldStateConfig =
            serde_json::from_str(r#"{"archive_tree_depth": 16, "history_length": 8}"#).unwrap();
        assert_eq!(config.archive_tree_depth, 16);
        assert_eq!(config.history_length, 8);
        assert_eq!(config.nullifier_tree_depth, WorldStateConfig::default().nullifier_tree_depth);
    }
}
