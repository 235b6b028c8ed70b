//! Error types for the VAA relayer

use crate::chain::{ChainFamily, ChainId};
use thiserror::Error;

/// Main error type for the relayer
#[derive(Error, Debug)]
pub enum RelayerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: ChainId, message: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Plugin {plugin} failed to consume VAA")]
    Consume {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Workflow {workflow_id} of plugin {plugin} failed")]
    Workflow {
        plugin: String,
        workflow_id: uuid::Uuid,
        #[source]
        source: anyhow::Error,
    },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Unknown plugin {0}")]
    UnknownPlugin(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayerError {
    /// Check if the error comes from a processing deadline rather than the work itself
    pub fn is_timeout(&self) -> bool {
        matches!(self, RelayerError::Timeout { .. })
    }
}

/// Failure to obtain a wallet toolbox for a chain.
///
/// Returned before an action body runs, so callers can tell
/// "could not attempt" apart from "attempted and failed".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Chain {chain_id} has no known chain family")]
    UnknownChain { chain_id: ChainId },

    #[error("Wallet unavailable for chain {chain_id}")]
    WalletUnavailable { chain_id: ChainId },

    #[error("Chain {chain_id} belongs to {actual}, action expects {expected}")]
    FamilyMismatch {
        chain_id: ChainId,
        expected: ChainFamily,
        actual: ChainFamily,
    },
}

/// Outcome of executing a single action
#[derive(Error, Debug)]
pub enum ActionError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Error raised by the action body, carried unchanged
    #[error(transparent)]
    Failed(anyhow::Error),
}

impl ActionError {
    /// True when the action body never ran
    pub fn is_resolution(&self) -> bool {
        matches!(self, ActionError::Resolution(_))
    }

    /// Unwrap the body's own error, if the body ran
    pub fn into_failure(self) -> Option<anyhow::Error> {
        match self {
            ActionError::Failed(e) => Some(e),
            ActionError::Resolution(_) => None,
        }
    }
}

/// Result type for relayer operations
pub type RelayerResult<T> = Result<T, RelayerError>;
