//! Chain providers: multi-RPC EVM failover plus plain connection handles

use super::ChainId;
use crate::config::ChainConfig;
use crate::error::{RelayerError, RelayerResult};

use ethers::providers::{Http, Middleware, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Multi-provider wrapper with automatic failover
pub struct EvmProvider {
    /// Wormhole chain id
    chain_id: ChainId,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl EvmProvider {
    /// Create a new EVM provider without touching the network
    pub fn new(config: ChainConfig) -> RelayerResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(RelayerError::ChainConnection {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            chain_id: config.chain_id,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain_id, next);
    }

    /// Get current block number with failover
    pub async fn get_block_number(&self) -> RelayerResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!(
                        "Failed to get block number from chain {}: {}",
                        self.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(RelayerError::ChainConnection {
            chain_id: self.chain_id,
            message: "All providers failed".to_string(),
        })
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.chain_id, e);
                false
            }
        }
    }

    /// Get chain ID
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Number of configured RPC endpoints
    pub fn endpoint_count(&self) -> usize {
        self.http_providers.len()
    }
}

/// Solana RPC connection handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolanaConnection {
    pub rpc_url: String,
    pub commitment: String,
}

impl SolanaConnection {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            commitment: "confirmed".to_string(),
        }
    }
}

/// Endpoint for chains without a typed client yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntypedProvider {
    pub rpc_url: String,
}

impl UntypedProvider {
    pub fn new(rpc_url: impl AsRef<str>) -> Self {
        Self {
            rpc_url: rpc_url.as_ref().to_string(),
        }
    }
}
