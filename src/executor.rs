//! Action executor routing chain-bound actions to wallet toolboxes

use crate::chain::{chain_family, ChainFamily, ChainId};
use crate::error::{ActionError, ResolutionError};
use crate::wallet::{
    AnyWallet, EmptyWallet, EvmWallet, SolanaWallet, WalletKind, WalletResolver, WalletToolBox,
};

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

type ActionFn<T, W> =
    Box<dyn FnOnce(WalletToolBox<W>, ChainId) -> BoxFuture<'static, anyhow::Result<T>> + Send>;

/// One unit of chain-specific work
pub struct Action<T, W = AnyWallet> {
    pub chain_id: ChainId,
    f: ActionFn<T, W>,
}

impl<T: Send + 'static, W: WalletKind> Action<T, W> {
    pub fn new<F, Fut>(chain_id: ChainId, f: F) -> Self
    where
        F: FnOnce(WalletToolBox<W>, ChainId) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            chain_id,
            f: Box::new(move |toolbox, chain_id| Box::pin(f(toolbox, chain_id))),
        }
    }
}

/// Runs actions against toolboxes from a [`WalletResolver`].
///
/// Each action body runs at most once per call. Ordering and concurrency
/// across actions are up to the caller.
#[derive(Clone)]
pub struct ActionExecutor {
    resolver: Arc<dyn WalletResolver>,
}

impl ActionExecutor {
    pub fn new(resolver: Arc<dyn WalletResolver>) -> Self {
        Self { resolver }
    }

    /// Resolve the toolbox for the action's chain and run the action
    pub async fn execute<T: Send + 'static, W: WalletKind>(
        &self,
        action: Action<T, W>,
    ) -> Result<T, ActionError> {
        let Action { chain_id, f } = action;

        if let Some(expected) = W::FAMILY {
            let actual = chain_family(chain_id).ok_or(ResolutionError::UnknownChain { chain_id })?;
            if actual != expected {
                return Err(ResolutionError::FamilyMismatch {
                    chain_id,
                    expected,
                    actual,
                }
                .into());
            }
        }

        let toolbox = self.resolver.resolve(chain_id).await?;
        let toolbox = toolbox.narrow::<W>().map_err(|toolbox| {
            match (W::FAMILY, toolbox.wallet.family()) {
                (Some(expected), Some(actual)) => ResolutionError::FamilyMismatch {
                    chain_id,
                    expected,
                    actual,
                },
                _ => ResolutionError::WalletUnavailable { chain_id },
            }
        })?;

        debug!("Executing action on chain {}", chain_id);
        f(toolbox, chain_id).await.map_err(ActionError::Failed)
    }

    /// Run an action that needs an EVM signer
    pub async fn on_evm<T: Send + 'static>(
        &self,
        action: Action<T, EvmWallet>,
    ) -> Result<T, ActionError> {
        self.execute(action).await
    }

    /// Run an action that needs a Solana keypair
    pub async fn on_solana<T: Send + 'static>(
        &self,
        action: Action<T, SolanaWallet>,
    ) -> Result<T, ActionError> {
        self.execute(action).await
    }

    /// Run an action on a chain without a typed toolbox
    pub async fn on_untyped<T: Send + 'static>(
        &self,
        action: Action<T, EmptyWallet>,
    ) -> Result<T, ActionError> {
        match chain_family(action.chain_id) {
            Some(ChainFamily::Evm) | Some(ChainFamily::Solana) => {
                Err(ResolutionError::WalletUnavailable {
                    chain_id: action.chain_id,
                }
                .into())
            }
            _ => self.execute(action).await,
        }
    }
}
