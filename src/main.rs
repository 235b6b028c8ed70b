//! VAA Relayer - Wormhole message relaying through plugin workflows
//!
//! This binary ships without plugin factories, so it accepts VAAs without
//! relaying them and rejects any `[plugins.*]` table. Deployments embed the
//! library and call [`vaa_relayer::service::run`] with their own
//! [`PluginRegistry`].

use anyhow::Result;
use tracing::info;

use vaa_relayer::config::Settings;
use vaa_relayer::plugin::PluginRegistry;
use vaa_relayer::service;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting VAA Relayer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains",
        settings.enabled_chains().len()
    );

    service::run(settings, PluginRegistry::new()).await?;

    info!("VAA Relayer stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vaa_relayer=debug,hyper=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("VAA_RELAYER_LOG_JSON").is_ok() {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}
