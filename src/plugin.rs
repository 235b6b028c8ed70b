//! Plugin boundary: the contract plugins implement and the registry that
//! instantiates them from configuration

use crate::chain::Providers;
use crate::config::{CommonConfig, Settings};
use crate::error::{RelayerError, RelayerResult};
use crate::executor::ActionExecutor;
use crate::relay::VaaEnvelope;
use crate::workflow::{ContractFilter, StagingArea, Workflow};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, info_span, Span};

/// Result of a plugin consuming one VAA
#[derive(Debug, Clone, Default)]
pub struct ConsumedEvent {
    /// Payload of the workflow to run, `None` when the VAA needs no action
    pub workflow_data: Option<Value>,
    /// Staging area handed to the next `consume_event` call
    pub next_staging: StagingArea,
}

/// Translates VAAs into chain actions
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Emitters this plugin wants VAAs from
    fn filters(&self) -> Vec<ContractFilter>;

    async fn consume_event(
        &self,
        vaa: &VaaEnvelope,
        staging: StagingArea,
        providers: &Providers,
    ) -> anyhow::Result<ConsumedEvent>;

    async fn handle_workflow(
        &self,
        workflow: &Workflow,
        providers: &Providers,
        executor: &ActionExecutor,
    ) -> anyhow::Result<()>;
}

/// Builds a plugin from its configuration table.
///
/// `create` must reject invalid configuration instead of returning a
/// partially configured plugin.
pub trait PluginFactory: Send + Sync {
    fn plugin_name(&self) -> &str;

    fn create(
        &self,
        common: &CommonConfig,
        env: &toml::Table,
        logger: Span,
    ) -> anyhow::Result<Arc<dyn Plugin>>;
}

/// Known plugin factories, keyed by plugin name
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, Arc<dyn PluginFactory>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn PluginFactory>) -> &mut Self {
        self.factories
            .insert(factory.plugin_name().to_string(), factory);
        self
    }

    /// Create every enabled plugin in `settings`, in name order
    pub fn instantiate(&self, settings: &Settings) -> RelayerResult<Vec<Arc<dyn Plugin>>> {
        let common = settings.common();
        let mut enabled = settings.enabled_plugins();
        enabled.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut plugins = Vec::with_capacity(enabled.len());
        for (name, config) in enabled {
            let factory = self
                .factories
                .get(name.as_str())
                .ok_or_else(|| RelayerError::UnknownPlugin(name.clone()))?;

            let logger = info_span!("plugin", name = %name);
            let plugin = factory
                .create(&common, &config.env, logger)
                .map_err(|e| {
                    RelayerError::Config(format!("Plugin {} rejected its configuration: {:#}", name, e))
                })?;

            info!("Plugin {} created with {} filter(s)", name, plugin.filters().len());
            plugins.push(plugin);
        }

        Ok(plugins)
    }
}
