//! Wallet manager resolving toolboxes from configured keys

use super::{AnyWallet, EmptyWallet, EvmWallet, Keypair, SolanaWallet, WalletResolver, WalletToolBox};
use crate::chain::{ChainFamily, ChainId, Providers};
use crate::config::Settings;
use crate::error::{RelayerError, RelayerResult, ResolutionError};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Holds every configured wallet and rotates through them per chain
pub struct WalletManager {
    providers: Arc<Providers>,
    wallets: HashMap<ChainId, Vec<AnyWallet>>,
    cursors: HashMap<ChainId, AtomicUsize>,
}

impl WalletManager {
    /// Load wallets for all enabled chains
    pub fn from_settings(settings: &Settings, providers: Arc<Providers>) -> RelayerResult<Self> {
        let mut wallets: HashMap<ChainId, Vec<AnyWallet>> = HashMap::new();

        for (name, chain) in settings.enabled_chains() {
            let keys: Vec<&String> = chain.private_keys.iter().filter(|k| !k.is_empty()).collect();

            let loaded = match chain.family {
                ChainFamily::Evm => {
                    let provider = providers.evm(chain.chain_id).ok_or_else(|| {
                        RelayerError::Config(format!("No EVM provider for chain {}", name))
                    })?;
                    let evm_chain_id = chain.evm_chain_id.ok_or_else(|| {
                        RelayerError::Config(format!("EVM chain {} has no evm_chain_id", name))
                    })?;

                    keys.iter()
                        .map(|key| {
                            let wallet = key
                                .parse::<LocalWallet>()
                                .map_err(|e| {
                                    RelayerError::Wallet(format!(
                                        "Invalid private key for chain {}: {}",
                                        name, e
                                    ))
                                })?
                                .with_chain_id(evm_chain_id);
                            debug!("Loaded EVM wallet {:?} for chain {}", wallet.address(), name);
                            Ok(AnyWallet::Evm(EvmWallet::new(provider.http().clone(), wallet)))
                        })
                        .collect::<RelayerResult<Vec<_>>>()?
                }
                ChainFamily::Solana => {
                    let Some(connection) = providers.solana.first() else {
                        warn!("No Solana connection configured, skipping wallets for {}", name);
                        continue;
                    };

                    keys.iter()
                        .map(|key| {
                            Ok(AnyWallet::Solana(SolanaWallet {
                                connection: connection.clone(),
                                keypair: Keypair::from_hex(key)?,
                            }))
                        })
                        .collect::<RelayerResult<Vec<_>>>()?
                }
                ChainFamily::Sui | ChainFamily::Aptos | ChainFamily::Cosmos => {
                    vec![AnyWallet::Empty(EmptyWallet)]
                }
            };

            info!("Loaded {} wallet(s) for chain {}", loaded.len(), name);
            if !loaded.is_empty() {
                wallets.insert(chain.chain_id, loaded);
            }
        }

        Ok(Self::new(providers, wallets))
    }

    /// Build a manager from already constructed wallets
    pub fn new(providers: Arc<Providers>, wallets: HashMap<ChainId, Vec<AnyWallet>>) -> Self {
        let cursors = wallets
            .keys()
            .map(|chain_id| (*chain_id, AtomicUsize::new(0)))
            .collect();

        Self {
            providers,
            wallets,
            cursors,
        }
    }

    /// Number of wallets available on a chain
    pub fn wallet_count(&self, chain_id: ChainId) -> usize {
        self.wallets.get(&chain_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl WalletResolver for WalletManager {
    async fn resolve(
        &self,
        chain_id: ChainId,
    ) -> Result<WalletToolBox<AnyWallet>, ResolutionError> {
        let wallets = self
            .wallets
            .get(&chain_id)
            .filter(|w| !w.is_empty())
            .ok_or(ResolutionError::WalletUnavailable { chain_id })?;

        let idx = self
            .cursors
            .get(&chain_id)
            .map_or(0, |c| c.fetch_add(1, Ordering::Relaxed));

        Ok(WalletToolBox {
            providers: self.providers.clone(),
            wallet: wallets[idx % wallets.len()].clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{SolanaConnection, CHAIN_ID_ETHEREUM, CHAIN_ID_SOLANA, CHAIN_ID_SUI};

    fn keypair(fill: u8) -> Keypair {
        Keypair::from_hex(&hex::encode([fill; 64])).unwrap()
    }

    fn solana(fill: u8) -> AnyWallet {
        AnyWallet::Solana(SolanaWallet {
            connection: SolanaConnection::new("http://localhost:8899"),
            keypair: keypair(fill),
        })
    }

    #[tokio::test]
    async fn test_resolve_unknown_chain_is_unavailable() {
        let manager = WalletManager::new(Arc::new(Providers::default()), HashMap::new());

        let err = manager.resolve(CHAIN_ID_ETHEREUM).await.err().unwrap();
        assert_eq!(err, ResolutionError::WalletUnavailable { chain_id: CHAIN_ID_ETHEREUM });
    }

    #[tokio::test]
    async fn test_resolve_rotates_wallets() {
        let mut wallets = HashMap::new();
        wallets.insert(CHAIN_ID_SOLANA, vec![solana(1), solana(2)]);
        let manager = WalletManager::new(Arc::new(Providers::default()), wallets);

        let mut seen = Vec::new();
        for _ in 0..3 {
            let toolbox = manager.resolve(CHAIN_ID_SOLANA).await.unwrap();
            match toolbox.wallet {
                AnyWallet::Solana(w) => seen.push(w.keypair.secret()[0]),
                other => panic!("unexpected wallet {:?}", other),
            }
        }

        assert_eq!(seen, vec![1, 2, 1]);
    }

    #[test]
    fn test_from_settings_loads_placeholder_and_evm_wallets() {
        let settings = Settings::from_toml_str(
            r#"
            [relayer]
            instance_id = "x"
            [api]
            host = "127.0.0.1"
            port = 8080
            [metrics]
            enabled = false
            port = 9090
            [chains.ethereum]
            chain_id = 2
            name = "Ethereum"
            family = "evm"
            evm_chain_id = 1
            rpc_urls = ["http://localhost:8545"]
            private_keys = ["0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"]
            [chains.sui]
            chain_id = 21
            name = "Sui"
            family = "sui"
            "#,
        )
        .unwrap();

        let providers = Arc::new(Providers::from_settings(&settings).unwrap());
        let manager = WalletManager::from_settings(&settings, providers).unwrap();

        assert_eq!(manager.wallet_count(CHAIN_ID_ETHEREUM), 1);
        assert_eq!(manager.wallet_count(CHAIN_ID_SUI), 1);
        assert_eq!(manager.wallet_count(CHAIN_ID_SOLANA), 0);
    }
}
