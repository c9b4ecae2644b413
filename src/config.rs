//! Simulator configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

const fn default_parallel_vm_reset() -> bool {
    true
}

/// Settings applied when a [`Blockchain`](crate::Blockchain) is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockchainConfig {
    /// Chain time at start, in milliseconds.
    #[serde(default)]
    pub initial_time_ms: u64,

    #[serde(default)]
    pub initial_block_num: f64,

    /// Compute storage deltas for every transaction.
    #[serde(default)]
    pub storage_deltas: bool,

    /// Rebuild account VMs on the rayon pool instead of one after another.
    #[serde(default = "default_parallel_vm_reset")]
    pub parallel_vm_reset: bool,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            initial_time_ms: 0,
            initial_block_num: 0.0,
            storage_deltas: false,
            parallel_vm_reset: default_parallel_vm_reset(),
        }
    }
}

impl BlockchainConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SimError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
