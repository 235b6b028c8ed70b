//! VAA relayer
//!
//! Receives Wormhole VAAs, runs each one through a middleware pipeline and
//! lets plugins turn them into chain actions executed with the configured
//! wallets.

pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod pipeline;
pub mod plugin;
pub mod relay;
pub mod service;
pub mod wallet;
pub mod workflow;

pub use error::{RelayerError, RelayerResult};
