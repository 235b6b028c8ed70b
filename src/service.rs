//! Relayer service wiring
//!
//! Deployments register their plugin factories and hand them to [`run`]:
//!
//! ```ignore
//! let mut plugins = PluginRegistry::new();
//! plugins.register(Arc::new(TokenBridgeFactory));
//! vaa_relayer::service::run(Settings::load()?, plugins).await?;
//! ```

use crate::api;
use crate::chain::Providers;
use crate::config::Settings;
use crate::error::RelayerResult;
use crate::metrics::MetricsServer;
use crate::plugin::PluginRegistry;
use crate::relay::{Relayer, RelayerOptions};
use crate::wallet::WalletManager;

use prometheus::Registry;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Fully wired relayer, ready to serve
pub struct Service {
    settings: Settings,
    registry: Registry,
    providers: Arc<Providers>,
    relayer: Arc<Relayer>,
}

impl Service {
    /// Connect chains, load wallets and instantiate the enabled plugins
    pub fn build(settings: Settings, plugins: &PluginRegistry) -> RelayerResult<Self> {
        let registry = Registry::new();

        let providers = Arc::new(Providers::from_settings(&settings)?);
        let wallets = Arc::new(WalletManager::from_settings(&settings, providers.clone())?);
        info!("Chain connections initialized");

        let plugins = plugins.instantiate(&settings)?;
        if plugins.is_empty() {
            warn!("No plugins enabled - VAAs will be accepted but not relayed");
        }

        let relayer = Arc::new(Relayer::new(
            plugins,
            providers.clone(),
            wallets,
            RelayerOptions::from_settings(&settings, registry.clone()),
        )?);
        info!("Relay pipeline initialized");

        Ok(Self {
            settings,
            registry,
            providers,
            relayer,
        })
    }

    pub fn relayer(&self) -> &Arc<Relayer> {
        &self.relayer
    }

    /// Serve the API and metrics until a shutdown signal arrives
    pub async fn run(self) -> RelayerResult<()> {
        let Service {
            settings,
            registry,
            providers,
            relayer,
        } = self;

        // Start API server
        let api_handle = tokio::spawn({
            let config = settings.api.clone();
            let providers = providers.clone();
            async move {
                if let Err(e) = api::run_server(config, relayer, providers).await {
                    error!("API server error: {}", e);
                }
            }
        });

        // Start metrics server
        let metrics_handle = if settings.metrics.enabled {
            let server = MetricsServer::new(settings.metrics.port, registry);
            Some(tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    error!("Metrics server error: {}", e);
                }
            }))
        } else {
            None
        };

        // Health check loop
        let health_handle = tokio::spawn({
            let interval = settings.relayer.health_check_interval_secs;
            async move {
                loop {
                    tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;

                    for (chain_id, healthy) in providers.health_check().await {
                        if !healthy {
                            warn!("Chain {} health check failed", chain_id);
                        }
                    }
                }
            }
        });

        info!("VAA Relayer is running");
        info!("API server: http://{}:{}", settings.api.host, settings.api.port);
        if settings.metrics.enabled {
            info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        }

        shutdown_signal().await;

        info!("Shutdown signal received, stopping...");

        api_handle.abort();
        health_handle.abort();
        if let Some(h) = metrics_handle {
            h.abort();
        }

        Ok(())
    }
}

/// Build and run the relayer with the given plugin factories
pub async fn run(settings: Settings, plugins: PluginRegistry) -> RelayerResult<()> {
    Service::build(settings, &plugins)?.run().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
