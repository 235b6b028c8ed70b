//! Configuration management for the VAA relayer
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::chain::{ChainFamily, ChainId};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub relayer: RelayerConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub plugins: HashMap<String, PluginConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    pub instance_id: String,
    /// Per-attempt processing deadline, unset means no deadline
    #[serde(default)]
    pub processing_timeout_ms: Option<u64>,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    /// Custom label names kept from the label customizer
    #[serde(default)]
    pub label_names: Vec<String>,
    /// Histogram buckets in milliseconds
    #[serde(default)]
    pub processing_time_buckets: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Wormhole chain id
    pub chain_id: ChainId,
    pub name: String,
    pub family: ChainFamily,
    /// Native EVM chain id used for transaction signing
    #[serde(default)]
    pub evm_chain_id: Option<u64>,
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    /// Hex-encoded signing keys, usually injected via `${VAR}`
    #[serde(default)]
    pub private_keys: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Everything else in the table is handed to the plugin factory untouched
    #[serde(flatten)]
    pub env: toml::Table,
}

fn default_enabled() -> bool {
    true
}

fn default_health_check_interval() -> u64 {
    30
}

/// Configuration shared with every plugin factory
#[derive(Debug, Clone)]
pub struct CommonConfig {
    pub instance_id: String,
    pub supported_chains: Vec<ChainId>,
}

impl Settings {
    /// Load settings from the file named by `VAA_RELAYER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("VAA_RELAYER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml_str(input: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        let mut seen = HashSet::new();
        for (name, chain) in self.enabled_chains() {
            if !seen.insert(chain.chain_id) {
                anyhow::bail!("Chain id {} configured more than once", chain.chain_id);
            }
            if chain.family == ChainFamily::Evm {
                if chain.rpc_urls.is_empty() {
                    anyhow::bail!("Chain {} has no RPC URLs configured", name);
                }
                if chain.evm_chain_id.is_none() {
                    anyhow::bail!("EVM chain {} has no evm_chain_id configured", name);
                }
            }
            if chain.private_keys.is_empty() {
                tracing::warn!("Chain {} has no private keys - actions on it will fail", name);
            }
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get list of enabled plugins
    pub fn enabled_plugins(&self) -> Vec<(&String, &PluginConfig)> {
        self.plugins.iter().filter(|(_, p)| p.enabled).collect()
    }

    /// Get chain config by wormhole chain ID
    pub fn get_chain_by_id(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains
            .values()
            .find(|c| c.enabled && c.chain_id == chain_id)
    }

    /// Configuration handed to plugin factories
    pub fn common(&self) -> CommonConfig {
        let mut supported_chains: Vec<ChainId> =
            self.enabled_chains().iter().map(|(_, c)| c.chain_id).collect();
        supported_chains.sort_unstable();

        CommonConfig {
            instance_id: self.relayer.instance_id.clone(),
            supported_chains,
        }
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
