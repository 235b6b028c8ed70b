//! Pipeline stage recording per-job prometheus metrics

use crate::error::{RelayerError, RelayerResult};
use crate::pipeline::{Middleware, Next, ProcessingContext};

use async_trait::async_trait;
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

pub const PROCESSED_TOTAL: &str = "vaas_processed_total";
pub const FINISHED_TOTAL: &str = "vaas_finished_total";
pub const PROCESSING_DURATION: &str = "vaas_processing_duration";

pub const STATUS_LABEL: &str = "status";
pub const TERMINAL_LABEL: &str = "terminal";

const SUCCEEDED: &str = "succeeded";
const FAILED: &str = "failed";

/// Histogram buckets in milliseconds
pub const DEFAULT_PROCESSING_TIME_BUCKETS: [f64; 8] =
    [6000.0, 7000.0, 7500.0, 8000.0, 8500.0, 9000.0, 10000.0, 12000.0];

/// Value of a custom label
#[derive(Debug, Clone, PartialEq)]
pub enum LabelValue {
    Str(String),
    Num(f64),
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelValue::Str(s) => f.write_str(s),
            LabelValue::Num(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for LabelValue {
    fn from(value: &str) -> Self {
        LabelValue::Str(value.to_string())
    }
}

impl From<String> for LabelValue {
    fn from(value: String) -> Self {
        LabelValue::Str(value)
    }
}

impl From<u16> for LabelValue {
    fn from(value: u16) -> Self {
        LabelValue::Num(f64::from(value))
    }
}

impl From<u32> for LabelValue {
    fn from(value: u32) -> Self {
        LabelValue::Num(f64::from(value))
    }
}

impl From<u64> for LabelValue {
    fn from(value: u64) -> Self {
        LabelValue::Num(value as f64)
    }
}

impl From<f64> for LabelValue {
    fn from(value: f64) -> Self {
        LabelValue::Num(value)
    }
}

pub type MetricLabels = BTreeMap<String, LabelValue>;

/// Computes custom labels for a finished attempt
#[async_trait]
pub trait LabelCustomizer<X>: Send + Sync {
    async fn customize(&self, ctx: &ProcessingContext<X>) -> anyhow::Result<MetricLabels>;
}

#[async_trait]
impl<X, F> LabelCustomizer<X> for F
where
    X: Send + Sync + 'static,
    F: Fn(&ProcessingContext<X>) -> anyhow::Result<MetricLabels> + Send + Sync,
{
    async fn customize(&self, ctx: &ProcessingContext<X>) -> anyhow::Result<MetricLabels> {
        self(ctx)
    }
}

pub struct LabelOptions<X> {
    /// Allow-list of custom label names
    pub label_names: Vec<String>,
    pub customizer: Option<Arc<dyn LabelCustomizer<X>>>,
}

impl<X> Default for LabelOptions<X> {
    fn default() -> Self {
        Self {
            label_names: Vec::new(),
            customizer: None,
        }
    }
}

pub struct MetricsOptions<X> {
    pub registry: Registry,
    pub labels: LabelOptions<X>,
    pub processing_time_buckets: Vec<f64>,
}

impl<X> Default for MetricsOptions<X> {
    fn default() -> Self {
        Self {
            registry: Registry::new(),
            labels: LabelOptions::default(),
            processing_time_buckets: DEFAULT_PROCESSING_TIME_BUCKETS.to_vec(),
        }
    }
}

/// Counts, times and labels every attempt passing through it.
///
/// Downstream results are returned unchanged; label computation failures
/// are logged and never fail the job.
pub struct MetricsMiddleware<X> {
    processed: CounterVec,
    finished: CounterVec,
    duration: HistogramVec,
    label_names: Vec<String>,
    customizer: Option<Arc<dyn LabelCustomizer<X>>>,
}

impl<X> MetricsMiddleware<X> {
    /// Create the metrics and register them with `options.registry`
    pub fn new(options: MetricsOptions<X>) -> RelayerResult<Self> {
        let MetricsOptions {
            registry,
            labels,
            processing_time_buckets,
        } = options;

        if let Some(reserved) = labels
            .label_names
            .iter()
            .find(|n| *n == STATUS_LABEL || *n == TERMINAL_LABEL)
        {
            return Err(RelayerError::Config(format!(
                "Label name {} is reserved",
                reserved
            )));
        }

        let custom: Vec<&str> = labels.label_names.iter().map(String::as_str).collect();
        let with_status: Vec<&str> = custom.iter().copied().chain([STATUS_LABEL]).collect();
        let with_terminal: Vec<&str> =
            with_status.iter().copied().chain([TERMINAL_LABEL]).collect();

        let processed = CounterVec::new(
            Opts::new(PROCESSED_TOTAL, "Number of VAAs picked up for processing"),
            &custom,
        )?;
        let finished = CounterVec::new(
            Opts::new(FINISHED_TOTAL, "Number of VAAs that finished processing"),
            &with_terminal,
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(PROCESSING_DURATION, "Processing time in ms for VAA jobs")
                .buckets(processing_time_buckets),
            &with_status,
        )?;

        registry.register(Box::new(processed.clone()))?;
        registry.register(Box::new(finished.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            processed,
            finished,
            duration,
            label_names: labels.label_names,
            customizer: labels.customizer,
        })
    }
}

impl<X: Send + Sync + 'static> MetricsMiddleware<X> {
    /// Custom label values in `label_names` order, empty where unset
    async fn custom_label_values(&self, ctx: &ProcessingContext<X>) -> Vec<String> {
        let custom = match &self.customizer {
            Some(customizer) => match customizer.customize(ctx).await {
                Ok(labels) => labels,
                Err(e) => {
                    ctx.in_scope(|| {
                        error!("Failed to compute metric labels, using defaults: {:#}", e)
                    });
                    MetricLabels::new()
                }
            },
            None => MetricLabels::new(),
        };

        self.label_names
            .iter()
            .map(|name| custom.get(name).map(ToString::to_string).unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl<X: Send + Sync + 'static> Middleware<ProcessingContext<X>> for MetricsMiddleware<X> {
    async fn handle(
        &self,
        ctx: &mut ProcessingContext<X>,
        next: Next<'_, ProcessingContext<X>>,
    ) -> RelayerResult<()> {
        // Custom labels are unknown until the attempt finishes
        let unlabeled = vec![""; self.label_names.len()];
        self.processed.with_label_values(&unlabeled).inc();

        let started = Instant::now();
        let result = next.run(ctx).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let custom = self.custom_label_values(ctx).await;
        let mut values: Vec<&str> = custom.iter().map(String::as_str).collect();
        values.push(if result.is_ok() { SUCCEEDED } else { FAILED });

        self.duration.with_label_values(&values).observe(elapsed_ms);

        match &result {
            Ok(()) => values.push(""),
            Err(e) => {
                let terminal = ctx.job.is_terminal();
                ctx.in_scope(|| {
                    error!(
                        job_id = %ctx.job.id,
                        terminal,
                        "Processing attempt failed: {}", e
                    )
                });
                values.push(if terminal { "true" } else { "false" });
            }
        }

        self.finished.with_label_values(&values).inc();

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{compose, Job};
    use prometheus::proto::Metric;

    type Ctx = ProcessingContext<f64>;

    fn matches_labels(metric: &Metric, expected: &[(&str, &str)]) -> bool {
        expected.iter().all(|(name, value)| {
            metric
                .get_label()
                .iter()
                .any(|l| l.get_name() == *name && l.get_value() == *value)
        })
    }

    fn metrics(registry: &Registry, name: &str) -> Vec<Metric> {
        registry
            .gather()
            .into_iter()
            .filter(|mf| mf.get_name() == name)
            .flat_map(|mf| mf.get_metric().to_vec())
            .collect()
    }

    fn counter(registry: &Registry, name: &str, labels: &[(&str, &str)]) -> f64 {
        metrics(registry, name)
            .iter()
            .filter(|m| matches_labels(m, labels))
            .map(|m| m.get_counter().get_value())
            .sum()
    }

    fn observations(registry: &Registry, labels: &[(&str, &str)]) -> u64 {
        metrics(registry, PROCESSING_DURATION)
            .iter()
            .filter(|m| matches_labels(m, labels))
            .map(|m| m.get_histogram().get_sample_count())
            .sum()
    }

    fn label_names(metric: &Metric) -> Vec<String> {
        let mut names: Vec<String> = metric
            .get_label()
            .iter()
            .map(|l| l.get_name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Stores the processed count seen from downstream into the context
    struct Probe(Registry);

    #[async_trait]
    impl Middleware<Ctx> for Probe {
        async fn handle(&self, ctx: &mut Ctx, next: Next<'_, Ctx>) -> RelayerResult<()> {
            ctx.ext = counter(&self.0, PROCESSED_TOTAL, &[]);
            next.run(ctx).await
        }
    }

    struct Fail;

    #[async_trait]
    impl Middleware<Ctx> for Fail {
        async fn handle(&self, _ctx: &mut Ctx, _next: Next<'_, Ctx>) -> RelayerResult<()> {
            Err(RelayerError::Internal("downstream".to_string()))
        }
    }

    fn pipeline_with(
        options: MetricsOptions<f64>,
        fail: bool,
    ) -> crate::pipeline::Pipeline<Ctx> {
        let registry = options.registry.clone();
        let mut handlers: Vec<Arc<dyn Middleware<Ctx>>> = vec![
            Arc::new(MetricsMiddleware::new(options).unwrap()),
            Arc::new(Probe(registry)),
        ];
        if fail {
            handlers.push(Arc::new(Fail));
        }
        compose(handlers)
    }

    fn ctx(attempts: u32, max_attempts: u32) -> Ctx {
        ProcessingContext::new(Job::new("job-1").with_attempts(attempts, max_attempts), 0.0)
    }

    #[tokio::test]
    async fn test_processed_counted_before_downstream() {
        let registry = Registry::new();
        let pipeline = pipeline_with(
            MetricsOptions {
                registry: registry.clone(),
                ..Default::default()
            },
            false,
        );

        let mut first = ctx(1, 3);
        pipeline.run(&mut first).await.unwrap();
        assert_eq!(first.ext, 1.0);

        let mut second = ctx(1, 3);
        pipeline.run(&mut second).await.unwrap();
        assert_eq!(second.ext, 2.0);
        assert_eq!(counter(&registry, PROCESSED_TOTAL, &[]), 2.0);
    }

    #[tokio::test]
    async fn test_success_records_without_terminal_value() {
        let registry = Registry::new();
        let pipeline = pipeline_with(
            MetricsOptions {
                registry: registry.clone(),
                ..Default::default()
            },
            false,
        );

        pipeline.run(&mut ctx(3, 3)).await.unwrap();

        assert_eq!(
            counter(&registry, FINISHED_TOTAL, &[("status", "succeeded"), ("terminal", "")]),
            1.0
        );
        assert_eq!(observations(&registry, &[("status", "succeeded")]), 1);
        assert_eq!(observations(&registry, &[("status", "failed")]), 0);
    }

    #[tokio::test]
    async fn test_failure_on_last_attempt_is_terminal() {
        let registry = Registry::new();
        let pipeline = pipeline_with(
            MetricsOptions {
                registry: registry.clone(),
                ..Default::default()
            },
            true,
        );

        let err = pipeline.run(&mut ctx(3, 3)).await.unwrap_err();

        assert!(matches!(err, RelayerError::Internal(ref m) if m == "downstream"));
        assert_eq!(
            counter(&registry, FINISHED_TOTAL, &[("status", "failed"), ("terminal", "true")]),
            1.0
        );
        assert_eq!(observations(&registry, &[("status", "failed")]), 1);
    }

    #[tokio::test]
    async fn test_failure_with_retries_left_is_not_terminal() {
        let registry = Registry::new();
        let pipeline = pipeline_with(
            MetricsOptions {
                registry: registry.clone(),
                ..Default::default()
            },
            true,
        );

        assert!(pipeline.run(&mut ctx(1, 3)).await.is_err());

        assert_eq!(
            counter(&registry, FINISHED_TOTAL, &[("status", "failed"), ("terminal", "false")]),
            1.0
        );
        assert_eq!(counter(&registry, FINISHED_TOTAL, &[("terminal", "true")]), 0.0);
    }

    #[tokio::test]
    async fn test_unknown_attempts_are_not_terminal() {
        let registry = Registry::new();
        let pipeline = pipeline_with(
            MetricsOptions {
                registry: registry.clone(),
                ..Default::default()
            },
            true,
        );

        let mut unknown = ProcessingContext::new(Job::new("job-2"), 0.0);
        assert!(pipeline.run(&mut unknown).await.is_err());

        assert_eq!(counter(&registry, FINISHED_TOTAL, &[("terminal", "false")]), 1.0);
    }

    #[tokio::test]
    async fn test_labels_filtered_to_allow_list_and_status_overridden() {
        let registry = Registry::new();
        let customizer = |_ctx: &Ctx| -> anyhow::Result<MetricLabels> {
            let mut labels = MetricLabels::new();
            labels.insert("a".to_string(), LabelValue::from(1u32));
            labels.insert("b".to_string(), LabelValue::from(2u32));
            labels.insert("status".to_string(), LabelValue::from("bogus"));
            Ok(labels)
        };
        let pipeline = pipeline_with(
            MetricsOptions {
                registry: registry.clone(),
                labels: LabelOptions {
                    label_names: vec!["a".to_string()],
                    customizer: Some(Arc::new(customizer)),
                },
                ..Default::default()
            },
            false,
        );

        pipeline.run(&mut ctx(1, 3)).await.unwrap();

        let durations = metrics(&registry, PROCESSING_DURATION);
        assert_eq!(durations.len(), 1);
        assert_eq!(label_names(&durations[0]), vec!["a", "status"]);
        assert!(matches_labels(&durations[0], &[("a", "1"), ("status", "succeeded")]));

        let finished = metrics(&registry, FINISHED_TOTAL);
        assert_eq!(finished.len(), 1);
        assert_eq!(label_names(&finished[0]), vec!["a", "status", "terminal"]);
        assert!(matches_labels(&finished[0], &[("a", "1"), ("status", "succeeded")]));
    }

    #[tokio::test]
    async fn test_customizer_error_falls_back_to_status_only() {
        let customizer = |_ctx: &Ctx| -> anyhow::Result<MetricLabels> {
            anyhow::bail!("label source unavailable")
        };

        for fail in [false, true] {
            let registry = Registry::new();
            let pipeline = pipeline_with(
                MetricsOptions {
                    registry: registry.clone(),
                    labels: LabelOptions {
                        label_names: vec!["a".to_string()],
                        customizer: Some(Arc::new(customizer)),
                    },
                    ..Default::default()
                },
                fail,
            );

            let result = pipeline.run(&mut ctx(1, 3)).await;
            assert_eq!(result.is_err(), fail);

            let status = if fail { "failed" } else { "succeeded" };
            assert_eq!(observations(&registry, &[("a", ""), ("status", status)]), 1);
            assert_eq!(
                counter(&registry, FINISHED_TOTAL, &[("a", ""), ("status", status)]),
                1.0
            );
        }
    }

    #[test]
    fn test_reserved_label_names_rejected() {
        let options = MetricsOptions::<()> {
            labels: LabelOptions {
                label_names: vec!["status".to_string()],
                customizer: None,
            },
            ..Default::default()
        };

        let err = MetricsMiddleware::new(options).err().unwrap();
        assert!(matches!(err, RelayerError::Config(_)));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        let first = MetricsOptions::<()> {
            registry: registry.clone(),
            ..Default::default()
        };
        let second = MetricsOptions::<()> {
            registry,
            ..Default::default()
        };

        assert!(MetricsMiddleware::new(first).is_ok());
        assert!(matches!(
            MetricsMiddleware::new(second),
            Err(RelayerError::Metrics(_))
        ));
    }

    #[test]
    fn test_label_value_display() {
        assert_eq!(LabelValue::from(2u16).to_string(), "2");
        assert_eq!(LabelValue::from(1.5).to_string(), "1.5");
        assert_eq!(LabelValue::from("eth").to_string(), "eth");
    }
}
