//! Node configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime configuration for a node, loadable from TOML.
///
/// Every field has a default, so a missing or partial file still yields a
/// working local configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Directory for node-local data.
    pub data_dir: PathBuf,
    /// Difficulty target for blocks this node mines.
    pub difficulty: u64,
    /// The encoded address credited on mined blocks.
    pub miner_address: String,
    /// Build image groups as parallel tasks within a mining attempt.
    pub async_groups: bool,
    /// Cap on transactions mined per image group per block.
    pub max_txs_per_group: usize,
    /// Wall-clock bound on one sandbox execution, in seconds.
    pub sandbox_timeout_secs: u64,
    /// Verify mined blocks received from peers before accepting them.
    ///
    /// Verification is not implemented yet and rejects every block, so this
    /// stays off until it lands; locally mined blocks are always accepted.
    pub verify_received_blocks: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./caravel-data"),
            difficulty: 5,
            miner_address: String::new(),
            async_groups: true,
            max_txs_per_group: caravel_miner::service::DEFAULT_MAX_TXS_PER_GROUP,
            sandbox_timeout_secs: 60,
            verify_received_blocks: false,
        }
    }
}

impl NodeConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: NodeConfig = toml::from_str("difficulty = 2").unwrap();
        assert_eq!(config.difficulty, 2);
        assert!(config.async_groups);
        assert!(!config.verify_received_blocks);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "miner_address = \"abc\"\ndifficulty = 1\n").unwrap();
        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.miner_address, "abc");
        assert_eq!(config.difficulty, 1);
    }
}
