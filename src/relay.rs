//! VAA relay engine
//!
//! Builds the processing pipeline for incoming VAAs:
//!
//! ```text
//! MetricsMiddleware -> [TimeoutMiddleware] -> PluginStage
//! ```
//!
//! The plugin stage routes each VAA to the plugins whose filters match its
//! emitter, threads every plugin's staging area from one VAA to the next and
//! runs the resulting workflows through the [`ActionExecutor`]. Retries of a
//! VAA resume per plugin instead of starting over.

use crate::chain::{ChainId, Providers};
use crate::config::Settings;
use crate::error::{RelayerError, RelayerResult};
use crate::executor::ActionExecutor;
use crate::metrics::{LabelOptions, MetricLabels, MetricsMiddleware, MetricsOptions};
use crate::pipeline::{
    compose, Job, Middleware, Next, Pipeline, ProcessingContext, TimeoutMiddleware,
};
use crate::plugin::Plugin;
use crate::wallet::WalletResolver;
use crate::workflow::{StagingArea, StagingStore, Workflow};

use async_trait::async_trait;
use dashmap::DashMap;
use prometheus::Registry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

pub const EMITTER_CHAIN_LABEL: &str = "emitter_chain";
pub const EMITTER_ADDRESS_LABEL: &str = "emitter_address";

/// A signed VAA together with the header fields used for routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaaEnvelope {
    pub emitter_chain: ChainId,
    pub emitter_address: String,
    pub sequence: u64,
    pub bytes: Vec<u8>,
}

impl VaaEnvelope {
    /// `chain/emitter/sequence` identifier of the message
    pub fn id(&self) -> String {
        format!(
            "{}/{}/{}",
            self.emitter_chain, self.emitter_address, self.sequence
        )
    }
}

pub type RelayContext = ProcessingContext<VaaEnvelope>;

/// Label customizer exposing the VAA emitter
pub fn vaa_labels(ctx: &RelayContext) -> anyhow::Result<MetricLabels> {
    let mut labels = MetricLabels::new();
    labels.insert(EMITTER_CHAIN_LABEL.to_string(), ctx.ext.emitter_chain.into());
    labels.insert(
        EMITTER_ADDRESS_LABEL.to_string(),
        ctx.ext.emitter_address.as_str().into(),
    );
    Ok(labels)
}

/// How far a plugin got with one VAA
#[derive(Debug, Clone)]
enum Progress {
    /// Consumed, workflow not yet completed
    Pending(Workflow),
    Done,
}

/// Last pipeline stage: hands the VAA to the subscribed plugins.
///
/// Each plugin is its own unit of work. A retried VAA skips plugins that
/// already finished it and only reruns the workflow of a plugin whose
/// consume step succeeded, so staging advances once per VAA.
pub struct PluginStage {
    plugins: Vec<Arc<dyn Plugin>>,
    staging: Arc<StagingStore>,
    providers: Arc<Providers>,
    executor: ActionExecutor,
    /// Keyed by VAA id and plugin name, cleared once the VAA settles
    progress: DashMap<(String, String), Progress>,
}

impl PluginStage {
    pub fn new(
        plugins: Vec<Arc<dyn Plugin>>,
        staging: Arc<StagingStore>,
        providers: Arc<Providers>,
        executor: ActionExecutor,
    ) -> Self {
        Self {
            plugins,
            staging,
            providers,
            executor,
            progress: DashMap::new(),
        }
    }

    async fn dispatch(&self, plugin: &dyn Plugin, vaa: &VaaEnvelope) -> RelayerResult<()> {
        let name = plugin.name();
        let key = (vaa.id(), name.to_string());

        let workflow = match self.progress.get(&key).map(|p| p.value().clone()) {
            Some(Progress::Done) => {
                debug!("Plugin {} already handled VAA {}", name, key.0);
                return Ok(());
            }
            Some(Progress::Pending(workflow)) => {
                debug!("Plugin {} retrying workflow {}", name, workflow.id);
                workflow
            }
            None => {
                let workflow_data = {
                    // Held until the next staging area is committed
                    let mut staging = self.staging.lock(name).await;
                    let consumed = plugin
                        .consume_event(vaa, staging.clone(), &self.providers)
                        .await
                        .map_err(|source| RelayerError::Consume {
                            plugin: name.to_string(),
                            source,
                        })?;
                    *staging = consumed.next_staging;
                    consumed.workflow_data
                };

                let Some(data) = workflow_data else {
                    debug!("Plugin {} produced no workflow", name);
                    self.progress.insert(key, Progress::Done);
                    return Ok(());
                };

                let workflow = Workflow::new(name, data);
                self.progress
                    .insert(key.clone(), Progress::Pending(workflow.clone()));
                workflow
            }
        };

        info!("Plugin {} running workflow {}", name, workflow.id);
        plugin
            .handle_workflow(&workflow, &self.providers, &self.executor)
            .await
            .map_err(|source| RelayerError::Workflow {
                plugin: name.to_string(),
                workflow_id: workflow.id,
                source,
            })?;

        self.progress.insert(key, Progress::Done);
        Ok(())
    }

    fn forget(&self, vaa_id: &str, plugins: &[String]) {
        for name in plugins {
            self.progress.remove(&(vaa_id.to_string(), name.clone()));
        }
    }
}

#[async_trait]
impl Middleware<RelayContext> for PluginStage {
    async fn handle(
        &self,
        ctx: &mut RelayContext,
        next: Next<'_, RelayContext>,
    ) -> RelayerResult<()> {
        let vaa = &ctx.ext;
        let vaa_id = vaa.id();
        let subscribed: Vec<&Arc<dyn Plugin>> = self
            .plugins
            .iter()
            .filter(|p| {
                p.filters()
                    .iter()
                    .any(|f| f.matches(vaa.emitter_chain, &vaa.emitter_address))
            })
            .collect();

        if subscribed.is_empty() {
            debug!("No plugin subscribed to emitter {}", vaa_id);
        }

        // A failing plugin does not hold back the others
        let mut failure = None;
        for &plugin in &subscribed {
            if let Err(e) = self.dispatch(plugin.as_ref(), vaa).await {
                if failure.is_some() {
                    warn!("Plugin {} failed on VAA {}: {}", plugin.name(), vaa_id, e);
                } else {
                    failure = Some(e);
                }
            }
        }

        let names: Vec<String> = subscribed.iter().map(|p| p.name().to_string()).collect();
        match failure {
            None => {
                self.forget(&vaa_id, &names);
                next.run(ctx).await
            }
            Some(e) => {
                if ctx.job.is_terminal() {
                    self.forget(&vaa_id, &names);
                }
                Err(e)
            }
        }
    }
}

#[derive(Default)]
pub struct RelayerOptions {
    pub metrics: MetricsOptions<VaaEnvelope>,
    pub processing_timeout: Option<Duration>,
}

impl RelayerOptions {
    pub fn from_settings(settings: &Settings, registry: Registry) -> Self {
        let mut metrics = MetricsOptions {
            registry,
            labels: LabelOptions {
                label_names: settings.metrics.label_names.clone(),
                customizer: Some(Arc::new(vaa_labels)),
            },
            ..Default::default()
        };
        if let Some(buckets) = &settings.metrics.processing_time_buckets {
            metrics.processing_time_buckets = buckets.clone();
        }

        Self {
            metrics,
            processing_timeout: settings
                .relayer
                .processing_timeout_ms
                .map(Duration::from_millis),
        }
    }
}

/// Processes VAA jobs through the relay pipeline
pub struct Relayer {
    pipeline: Pipeline<RelayContext>,
    staging: Arc<StagingStore>,
    plugin_names: Vec<String>,
}

impl Relayer {
    pub fn new(
        plugins: Vec<Arc<dyn Plugin>>,
        providers: Arc<Providers>,
        resolver: Arc<dyn WalletResolver>,
        options: RelayerOptions,
    ) -> RelayerResult<Self> {
        let staging = Arc::new(StagingStore::new());
        let plugin_names = plugins.iter().map(|p| p.name().to_string()).collect();

        let mut handlers: Vec<Arc<dyn Middleware<RelayContext>>> =
            vec![Arc::new(MetricsMiddleware::new(options.metrics)?)];
        if let Some(limit) = options.processing_timeout {
            handlers.push(Arc::new(TimeoutMiddleware::new(limit)));
        }
        handlers.push(Arc::new(PluginStage::new(
            plugins,
            staging.clone(),
            providers,
            ActionExecutor::new(resolver),
        )));

        Ok(Self {
            pipeline: compose(handlers),
            staging,
            plugin_names,
        })
    }

    /// Run one attempt of `job` for `vaa`
    pub async fn process(&self, job: Job, vaa: VaaEnvelope) -> RelayerResult<()> {
        let span = info_span!(
            "vaa",
            job_id = %job.id,
            emitter_chain = vaa.emitter_chain,
            sequence = vaa.sequence
        );
        let mut ctx = RelayContext::new(job, vaa).with_logger(span.clone());

        self.pipeline.run(&mut ctx).instrument(span).await
    }

    pub fn plugin_names(&self) -> &[String] {
        &self.plugin_names
    }

    /// Current staging area of a plugin
    pub async fn staging(&self, plugin: &str) -> StagingArea {
        self.staging.snapshot(plugin).await
    }
}
