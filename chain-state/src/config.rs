//! On-disk layout and tuning knobs for the consensus state core.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default number of entries the UTXO read-through cache holds before it
/// stops accepting new insertions.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Configuration for where and how the state core stores its data.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The root directory under which `blocks/` and `txindex/` are created.
    pub data_dir: PathBuf,

    /// Maximum number of entries the UTXO cache holds.
    pub cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("chain-state"),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl Config {
    pub fn blocks_dir(&self) -> PathBuf {
        self.data_dir.join("blocks")
    }

    pub fn txindex_dir(&self) -> PathBuf {
        self.data_dir.join("txindex")
    }

    /// Convenience constructor for tests: an ephemeral config rooted at `dir`.
    pub fn ephemeral(dir: impl AsRef<Path>) -> Self {
        Config { data_dir: dir.as_ref().to_path_buf(), cache_capacity: DEFAULT_CACHE_CAPACITY }
    }
}
