//! TOML configuration for the indexer binary.

use std::{
    collections::{HashMap, HashSet},
    path::Path
};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chain:   ChainConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub server:  ServerConfig
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoints; with more than one, every block is
    /// cross-checked between them.
    pub endpoints: Vec<String>
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    pub enable_sync:          bool,
    pub sync_start_block:     u64,
    pub sync_threads_num:     u64,
    pub enable_handle:        bool,
    pub handle_end_block:     u64,
    pub handle_queue_size:    usize,
    pub invalid_tx_hash_path: Option<String>,
    pub fee_start_block:      u64
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub rpc_addr: String
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { rpc_addr: "127.0.0.1:9008".to_string() }
    }
}

impl Config {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Loads the invalid transaction hash list: a JSON object mapping labels
    /// to hash arrays.
    pub fn load_invalid_tx_hashes(&self) -> eyre::Result<HashSet<String>> {
        let Some(path) = &self.runtime.invalid_tx_hash_path else {
            return Ok(HashSet::new());
        };

        let raw = std::fs::read_to_string(path)?;
        let records: HashMap<String, Vec<String>> = serde_json::from_str(&raw)?;

        let mut hashes = HashSet::new();
        for group in records.into_values() {
            for hash in group {
                if !hashes.insert(hash.clone()) {
                    tracing::info!(hash, "repeated invalid tx hash");
                }
            }
        }

        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses() {
        let config: Config = toml::from_str(
            r#"
            [chain]
            endpoints = ["http://localhost:8545"]
            "#
        )
        .unwrap();

        assert_eq!(config.chain.endpoints.len(), 1);
        assert!(!config.runtime.enable_sync);
        assert_eq!(config.server.rpc_addr, "127.0.0.1:9008");
    }

    #[test]
    fn full_config_parses() {
        let config: Config = toml::from_str(
            r#"
            [chain]
            endpoints = ["http://a:8545", "http://b:8545"]

            [runtime]
            enable_sync = true
            sync_start_block = 18130000
            sync_threads_num = 50
            enable_handle = true
            handle_end_block = 0
            handle_queue_size = 32
            fee_start_block = 18660000

            [server]
            rpc_addr = "0.0.0.0:9100"
            "#
        )
        .unwrap();

        assert!(config.runtime.enable_sync);
        assert_eq!(config.runtime.sync_threads_num, 50);
        assert_eq!(config.server.rpc_addr, "0.0.0.0:9100");
    }
}
