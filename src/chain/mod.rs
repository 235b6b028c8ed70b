//! Chain module - chain identities, families and read-only connection handles
//!
//! This module provides:
//! - Wormhole chain ids and their mapping to chain families
//! - Multi-RPC EVM providers with automatic failover
//! - The `Providers` bundle handed to plugins and action bodies

pub mod provider;

pub use provider::{EvmProvider, SolanaConnection, UntypedProvider};

use crate::config::Settings;
use crate::error::{RelayerError, RelayerResult};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Wormhole chain id
pub type ChainId = u16;

pub const CHAIN_ID_SOLANA: ChainId = 1;
pub const CHAIN_ID_ETHEREUM: ChainId = 2;
pub const CHAIN_ID_TERRA: ChainId = 3;
pub const CHAIN_ID_BSC: ChainId = 4;
pub const CHAIN_ID_POLYGON: ChainId = 5;
pub const CHAIN_ID_AVAX: ChainId = 6;
pub const CHAIN_ID_OASIS: ChainId = 7;
pub const CHAIN_ID_AURORA: ChainId = 9;
pub const CHAIN_ID_FANTOM: ChainId = 10;
pub const CHAIN_ID_KARURA: ChainId = 11;
pub const CHAIN_ID_ACALA: ChainId = 12;
pub const CHAIN_ID_KLAYTN: ChainId = 13;
pub const CHAIN_ID_CELO: ChainId = 14;
pub const CHAIN_ID_MOONBEAM: ChainId = 16;
pub const CHAIN_ID_TERRA2: ChainId = 18;
pub const CHAIN_ID_INJECTIVE: ChainId = 19;
pub const CHAIN_ID_SUI: ChainId = 21;
pub const CHAIN_ID_APTOS: ChainId = 22;
pub const CHAIN_ID_ARBITRUM: ChainId = 23;
pub const CHAIN_ID_OPTIMISM: ChainId = 24;
pub const CHAIN_ID_XPLA: ChainId = 28;
pub const CHAIN_ID_BASE: ChainId = 30;
pub const CHAIN_ID_SEI: ChainId = 32;

/// Closed set of chain families the relayer knows how to hold wallets for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Solana,
    Sui,
    Aptos,
    Cosmos,
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainFamily::Evm => "evm",
            ChainFamily::Solana => "solana",
            ChainFamily::Sui => "sui",
            ChainFamily::Aptos => "aptos",
            ChainFamily::Cosmos => "cosmos",
        };
        f.write_str(name)
    }
}

/// Resolve the family of a wormhole chain id
pub fn chain_family(chain_id: ChainId) -> Option<ChainFamily> {
    match chain_id {
        CHAIN_ID_SOLANA => Some(ChainFamily::Solana),
        CHAIN_ID_ETHEREUM | CHAIN_ID_BSC | CHAIN_ID_POLYGON | CHAIN_ID_AVAX | CHAIN_ID_OASIS
        | CHAIN_ID_AURORA | CHAIN_ID_FANTOM | CHAIN_ID_KARURA | CHAIN_ID_ACALA
        | CHAIN_ID_KLAYTN | CHAIN_ID_CELO | CHAIN_ID_MOONBEAM | CHAIN_ID_ARBITRUM
        | CHAIN_ID_OPTIMISM | CHAIN_ID_BASE => Some(ChainFamily::Evm),
        CHAIN_ID_TERRA | CHAIN_ID_TERRA2 | CHAIN_ID_INJECTIVE | CHAIN_ID_XPLA | CHAIN_ID_SEI => {
            Some(ChainFamily::Cosmos)
        }
        CHAIN_ID_SUI => Some(ChainFamily::Sui),
        CHAIN_ID_APTOS => Some(ChainFamily::Aptos),
        _ => None,
    }
}

/// Read-only connection handles for every configured chain
#[derive(Default)]
pub struct Providers {
    pub evm: HashMap<ChainId, Arc<EvmProvider>>,
    pub solana: Vec<SolanaConnection>,
    pub untyped: HashMap<ChainId, Vec<UntypedProvider>>,
}

impl Providers {
    /// Build providers for all enabled chains
    pub fn from_settings(settings: &Settings) -> RelayerResult<Self> {
        let mut providers = Providers::default();

        for (name, chain) in settings.enabled_chains() {
            if let Some(expected) = chain_family(chain.chain_id) {
                if expected != chain.family {
                    return Err(RelayerError::Config(format!(
                        "Chain {} (ID: {}) is a {} chain, configured as {}",
                        name, chain.chain_id, expected, chain.family
                    )));
                }
            }

            match chain.family {
                ChainFamily::Evm => {
                    let provider = EvmProvider::new(chain.clone())?;
                    providers.evm.insert(chain.chain_id, Arc::new(provider));
                }
                ChainFamily::Solana => {
                    for url in &chain.rpc_urls {
                        providers.solana.push(SolanaConnection::new(url));
                    }
                }
                ChainFamily::Sui | ChainFamily::Aptos | ChainFamily::Cosmos => {
                    providers.untyped.insert(
                        chain.chain_id,
                        chain.rpc_urls.iter().map(UntypedProvider::new).collect(),
                    );
                }
            }

            info!("Chain {} (ID: {}) providers initialized", chain.name, chain.chain_id);
        }

        if providers.solana.is_empty() && settings.get_chain_by_id(CHAIN_ID_SOLANA).is_some() {
            warn!("Solana enabled without RPC URLs");
        }

        Ok(providers)
    }

    /// EVM provider for a chain
    pub fn evm(&self, chain_id: ChainId) -> Option<&Arc<EvmProvider>> {
        self.evm.get(&chain_id)
    }

    /// Chain ids with at least one connection handle
    pub fn connected_chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = self
            .evm
            .keys()
            .chain(self.untyped.keys())
            .copied()
            .collect();
        if !self.solana.is_empty() {
            chains.push(CHAIN_ID_SOLANA);
        }
        chains.sort_unstable();
        chains.dedup();
        chains
    }

    /// Health check for all EVM chains
    pub async fn health_check(&self) -> Vec<(ChainId, bool)> {
        let mut results = Vec::new();

        for (chain_id, provider) in &self.evm {
            results.push((*chain_id, provider.health_check().await));
        }

        results.sort_unstable_by_key(|(id, _)| *id);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_family_resolution() {
        assert_eq!(chain_family(CHAIN_ID_ETHEREUM), Some(ChainFamily::Evm));
        assert_eq!(chain_family(CHAIN_ID_BASE), Some(ChainFamily::Evm));
        assert_eq!(chain_family(CHAIN_ID_SOLANA), Some(ChainFamily::Solana));
        assert_eq!(chain_family(CHAIN_ID_SEI), Some(ChainFamily::Cosmos));
        assert_eq!(chain_family(CHAIN_ID_SUI), Some(ChainFamily::Sui));
        assert_eq!(chain_family(9999), None);
    }

    #[test]
    fn test_family_display_matches_config_names() {
        assert_eq!(ChainFamily::Evm.to_string(), "evm");
        assert_eq!(ChainFamily::Cosmos.to_string(), "cosmos");
    }

    #[test]
    fn test_connected_chains_includes_solana_and_untyped() {
        let mut providers = Providers::default();
        providers.solana.push(SolanaConnection::new("http://localhost:8899"));
        providers
            .untyped
            .insert(CHAIN_ID_SUI, vec![UntypedProvider::new("http://localhost:9000")]);

        assert_eq!(providers.connected_chains(), vec![CHAIN_ID_SOLANA, CHAIN_ID_SUI]);
    }
}
