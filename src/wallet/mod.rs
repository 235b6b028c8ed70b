//! Wallets and toolboxes handed to action bodies
//!
//! A toolbox couples the read-only `Providers` bundle with exactly one
//! wallet able to sign for a single chain family. Wallets arrive from a
//! `WalletResolver` as an unnarrowed `AnyWallet`, and `WalletKind` narrows
//! them into the concrete variant an action was written against.

mod manager;

pub use manager::WalletManager;

use crate::chain::{ChainFamily, ChainId, Providers, SolanaConnection};
use crate::error::{RelayerError, RelayerResult, ResolutionError};

use async_trait::async_trait;
use ethers::prelude::{Address, Http, LocalWallet, Provider, Signer, SignerMiddleware};
use std::fmt;
use std::sync::Arc;

/// Signing middleware over an HTTP provider
pub type EvmSigner = SignerMiddleware<Provider<Http>, LocalWallet>;

/// EVM signer bound to one chain
#[derive(Clone)]
pub struct EvmWallet {
    signer: Arc<EvmSigner>,
}

impl EvmWallet {
    pub fn new(provider: Provider<Http>, wallet: LocalWallet) -> Self {
        Self {
            signer: Arc::new(SignerMiddleware::new(provider, wallet)),
        }
    }

    pub fn signer(&self) -> &Arc<EvmSigner> {
        &self.signer
    }

    pub fn address(&self) -> Address {
        self.signer.signer().address()
    }
}

impl fmt::Debug for EvmWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmWallet")
            .field("address", &self.address())
            .finish()
    }
}

/// Ed25519 keypair in the 64-byte `secret || public` layout
#[derive(Clone)]
pub struct Keypair {
    bytes: [u8; 64],
}

impl Keypair {
    /// Parse a hex-encoded 64-byte keypair
    pub fn from_hex(input: &str) -> RelayerResult<Self> {
        let raw = hex::decode(input.trim_start_matches("0x"))
            .map_err(|e| RelayerError::Wallet(format!("Invalid keypair hex: {}", e)))?;
        let bytes: [u8; 64] = raw.try_into().map_err(|raw: Vec<u8>| {
            RelayerError::Wallet(format!("Keypair must be 64 bytes, got {}", raw.len()))
        })?;
        Ok(Self { bytes })
    }

    pub fn secret(&self) -> &[u8] {
        &self.bytes[..32]
    }

    pub fn public_key(&self) -> &[u8] {
        &self.bytes[32..]
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &hex::encode(self.public_key()))
            .finish()
    }
}

/// Solana connection plus the keypair that pays for and signs transactions
#[derive(Debug, Clone)]
pub struct SolanaWallet {
    pub connection: SolanaConnection,
    pub keypair: Keypair,
}

/// Placeholder for chains without a standardized toolbox yet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmptyWallet;

/// Any wallet a resolver can hand out
#[derive(Debug, Clone)]
pub enum AnyWallet {
    Evm(EvmWallet),
    Solana(SolanaWallet),
    Empty(EmptyWallet),
}

impl AnyWallet {
    /// Family this wallet signs for, `None` for the placeholder
    pub fn family(&self) -> Option<ChainFamily> {
        match self {
            AnyWallet::Evm(_) => Some(ChainFamily::Evm),
            AnyWallet::Solana(_) => Some(ChainFamily::Solana),
            AnyWallet::Empty(_) => None,
        }
    }
}

/// Wallet variant an action can be written against
pub trait WalletKind: Send + Sized + 'static {
    /// Family the variant is pinned to, `None` when it accepts any chain
    const FAMILY: Option<ChainFamily>;

    /// Narrow a resolved wallet, handing it back on mismatch
    fn narrow(wallet: AnyWallet) -> Result<Self, AnyWallet>;
}

impl WalletKind for AnyWallet {
    const FAMILY: Option<ChainFamily> = None;

    fn narrow(wallet: AnyWallet) -> Result<Self, AnyWallet> {
        Ok(wallet)
    }
}

impl WalletKind for EvmWallet {
    const FAMILY: Option<ChainFamily> = Some(ChainFamily::Evm);

    fn narrow(wallet: AnyWallet) -> Result<Self, AnyWallet> {
        match wallet {
            AnyWallet::Evm(w) => Ok(w),
            other => Err(other),
        }
    }
}

impl WalletKind for SolanaWallet {
    const FAMILY: Option<ChainFamily> = Some(ChainFamily::Solana);

    fn narrow(wallet: AnyWallet) -> Result<Self, AnyWallet> {
        match wallet {
            AnyWallet::Solana(w) => Ok(w),
            other => Err(other),
        }
    }
}

impl WalletKind for EmptyWallet {
    const FAMILY: Option<ChainFamily> = None;

    fn narrow(wallet: AnyWallet) -> Result<Self, AnyWallet> {
        match wallet {
            AnyWallet::Empty(w) => Ok(w),
            other => Err(other),
        }
    }
}

/// Providers bundle plus one wallet for a single chain family
#[derive(Clone)]
pub struct WalletToolBox<W> {
    pub providers: Arc<Providers>,
    pub wallet: W,
}

impl WalletToolBox<AnyWallet> {
    /// Narrow the wallet to `W`, returning the toolbox untouched on mismatch
    pub fn narrow<W: WalletKind>(self) -> Result<WalletToolBox<W>, WalletToolBox<AnyWallet>> {
        let providers = self.providers;
        match W::narrow(self.wallet) {
            Ok(wallet) => Ok(WalletToolBox { providers, wallet }),
            Err(wallet) => Err(WalletToolBox { providers, wallet }),
        }
    }
}

/// Produces the toolbox for a chain, or fails if no wallet can sign there
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletResolver: Send + Sync {
    async fn resolve(&self, chain_id: ChainId)
        -> Result<WalletToolBox<AnyWallet>, ResolutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYPAIR_HEX: &str = concat!(
        "0101010101010101010101010101010101010101010101010101010101010101",
        "0202020202020202020202020202020202020202020202020202020202020202"
    );

    fn solana_wallet() -> AnyWallet {
        AnyWallet::Solana(SolanaWallet {
            connection: SolanaConnection::new("http://localhost:8899"),
            keypair: Keypair::from_hex(KEYPAIR_HEX).unwrap(),
        })
    }

    #[test]
    fn test_keypair_layout() {
        let keypair = Keypair::from_hex(KEYPAIR_HEX).unwrap();
        assert_eq!(keypair.secret(), &[1u8; 32]);
        assert_eq!(keypair.public_key(), &[2u8; 32]);
        assert!(!format!("{:?}", keypair).contains("0101"));
    }

    #[test]
    fn test_keypair_rejects_wrong_length() {
        let err = Keypair::from_hex("0xabcd").unwrap_err();
        assert!(err.to_string().contains("64 bytes"));
    }

    #[test]
    fn test_narrowing_matches_variant() {
        assert!(SolanaWallet::narrow(solana_wallet()).is_ok());
        assert!(EmptyWallet::narrow(AnyWallet::Empty(EmptyWallet)).is_ok());
        assert!(AnyWallet::narrow(solana_wallet()).is_ok());

        let back = EvmWallet::narrow(solana_wallet()).unwrap_err();
        assert_eq!(back.family(), Some(ChainFamily::Solana));
    }

    #[test]
    fn test_toolbox_narrow_keeps_providers() {
        let providers = Arc::new(Providers::default());
        let toolbox = WalletToolBox {
            providers: providers.clone(),
            wallet: solana_wallet(),
        };

        let narrowed = match toolbox.narrow::<SolanaWallet>() {
            Ok(narrowed) => narrowed,
            Err(_) => panic!("solana wallet did not narrow"),
        };
        assert!(Arc::ptr_eq(&narrowed.providers, &providers));
        assert_eq!(narrowed.wallet.keypair.public_key(), &[2u8; 32]);
    }
}
