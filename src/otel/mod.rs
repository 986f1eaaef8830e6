//! Observability for release-radar
//!
//! Sets up the tracing subscriber and, when enabled, OTLP export of spans
//! and metrics. With export disabled the meter provider has no reader, so
//! instruments are cheap no-ops.

use crate::config::{LoggingConfig, OtelConfig};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, MeterProvider as _},
    trace::TracerProvider as TracerProviderTrait,
    KeyValue,
};
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::TracerProvider, Resource};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// OpenTelemetry error types
#[derive(Debug, Error)]
pub enum OtelError {
    /// Failed to initialize tracer
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize meter
    #[error("Failed to initialize meter: {0}")]
    MeterInit(String),

    /// Failed to shutdown
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Owns the tracer and meter providers for the process lifetime
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    config: OtelConfig,
}

impl OtelProvider {
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let resource = Resource::new(vec![
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ]);

        let (tracer_provider, meter_provider) = match (config.enabled, &config.endpoint) {
            (false, _) => (
                None,
                SdkMeterProvider::builder().with_resource(resource).build(),
            ),
            (true, None) => {
                return Err(OtelError::Config(
                    "OTLP endpoint is required when enabled".into(),
                ))
            }
            (true, Some(endpoint)) => (
                Some(Self::init_tracer_provider(endpoint, &resource)?),
                Self::init_meter_provider(endpoint, &resource)?,
            ),
        };

        if let Some(ref tp) = tracer_provider {
            global::set_tracer_provider(tp.clone());
        }

        Ok(Self {
            tracer_provider,
            meter_provider,
            config: config.clone(),
        })
    }

    fn init_tracer_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<TracerProvider, OtelError> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::runtime;
        use opentelemetry_sdk::trace::{Config, Sampler};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .build_span_exporter()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;

        Ok(TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(
                Config::default()
                    .with_sampler(Sampler::AlwaysOn)
                    .with_resource(resource.clone()),
            )
            .build())
    }

    fn init_meter_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<SdkMeterProvider, OtelError> {
        use opentelemetry_otlp::{MetricsExporterBuilder, WithExportConfig};
        use opentelemetry_sdk::metrics::reader::{
            DefaultAggregationSelector, DefaultTemporalitySelector,
        };
        use opentelemetry_sdk::{metrics::PeriodicReader, runtime};

        let exporter = MetricsExporterBuilder::from(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .build_metrics_exporter(
            Box::new(DefaultTemporalitySelector::new()),
            Box::new(DefaultAggregationSelector::new()),
        )
        .map_err(|e| OtelError::MeterInit(e.to_string()))?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();

        Ok(SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build())
    }

    /// Tracer for the OpenTelemetry layer; no-op when export is disabled
    pub fn tracer(&self, name: &'static str) -> opentelemetry_sdk::trace::Tracer {
        match self.tracer_provider {
            Some(ref tp) => tp.tracer(name),
            None => TracerProvider::builder().build().tracer(name),
        }
    }

    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(self.config.service_name.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Flush spans and stop the metric reader
    pub fn shutdown(&self) -> Result<(), OtelError> {
        self.meter_provider
            .shutdown()
            .map_err(|e| OtelError::Shutdown(format!("Meter shutdown failed: {:?}", e)))?;

        if let Some(ref tp) = self.tracer_provider {
            for result in tp.force_flush() {
                result
                    .map_err(|e| OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)))?;
            }
        }

        Ok(())
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Engine metrics
pub struct Metrics {
    /// Scheduled or manual batches started
    pub batches_total: Counter<u64>,

    /// Task runs by outcome (completed, failed, skipped)
    pub tasks_total: Counter<u64>,

    /// Tracks appended to destination playlists
    pub tracks_added_total: Counter<u64>,

    /// 429 responses seen by the retry wrapper
    pub rate_limited_total: Counter<u64>,

    /// Duration of a single task run
    pub task_duration: Histogram<f64>,

    /// Duration of a whole batch
    pub batch_duration: Histogram<f64>,
}

impl Metrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            batches_total: meter
                .u64_counter("release_radar_batches_total")
                .with_description("Number of batches started")
                .init(),
            tasks_total: meter
                .u64_counter("release_radar_tasks_total")
                .with_description("Number of task runs by outcome")
                .init(),
            tracks_added_total: meter
                .u64_counter("release_radar_tracks_added_total")
                .with_description("Number of tracks appended to playlists")
                .init(),
            rate_limited_total: meter
                .u64_counter("release_radar_rate_limited_total")
                .with_description("Number of rate-limited catalog calls")
                .init(),
            task_duration: meter
                .f64_histogram("release_radar_task_duration_seconds")
                .with_description("Task run duration in seconds")
                .init(),
            batch_duration: meter
                .f64_histogram("release_radar_batch_duration_seconds")
                .with_description("Batch duration in seconds")
                .init(),
        }
    }

    pub fn record_batch(&self, duration_secs: f64) {
        self.batches_total.add(1, &[]);
        self.batch_duration.record(duration_secs, &[]);
    }

    pub fn record_task(&self, outcome: &str, tracks_added: u64, duration_secs: f64) {
        let attrs = [KeyValue::new("outcome", outcome.to_string())];
        self.tasks_total.add(1, &attrs);
        self.task_duration.record(duration_secs, &attrs);
        if tracks_added > 0 {
            self.tracks_added_total.add(tracks_added, &[]);
        }
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.add(1, &[]);
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides `logging.level` when set. `logging.format` selects
/// `json` (default) or `pretty` output.
pub fn init_tracing(otel: &OtelProvider, logging: &LoggingConfig) -> Result<(), OtelError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(normalize_level(&logging.level)))
        .map_err(|e| OtelError::Config(e.to_string()))?;

    let otel_layer = otel
        .is_enabled()
        .then(|| tracing_opentelemetry::layer().with_tracer(otel.tracer("release-radar")));

    let pretty = logging.format.eq_ignore_ascii_case("pretty");
    let json_layer = (!pretty).then(|| tracing_subscriber::fmt::layer().json());
    let pretty_layer = pretty.then(|| tracing_subscriber::fmt::layer().pretty());

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| OtelError::TracerInit(e.to_string()))
}

fn normalize_level(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}
