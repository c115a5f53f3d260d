//! Prometheus metrics for mittari
//!
//! One histogram, `{namespace}_{subsystem}_request_duration_seconds`,
//! labelled `grpc_service`, `grpc_method`, `grpc_code`. [`GrpcMetrics`] is the
//! Prometheus-backed [`LatencyObserver`].

use crate::config::{MetricsConfig, validate_buckets};
use mittari_core::{
    Code, LABEL_NAMES, Labels, LatencyObserver, MittariError, Result, code_name,
};
use prometheus::{Encoder, HistogramOpts, HistogramVec, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global metrics instance, registered in the default registry
static METRICS: OnceLock<GrpcMetrics> = OnceLock::new();

/// Request latency histogram
#[derive(Clone)]
pub struct GrpcMetrics {
    /// Call latency in seconds (by service, method, code)
    pub request_duration_seconds: HistogramVec,
}

impl std::fmt::Debug for GrpcMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcMetrics").finish_non_exhaustive()
    }
}

impl GrpcMetrics {
    /// Build the histogram without registering it anywhere
    pub fn new(config: &MetricsConfig) -> Result<Self> {
        validate_buckets(&config.buckets)?;

        let opts = HistogramOpts::new(
            "request_duration_seconds",
            "Histogram of latencies for gRPC requests",
        )
        .namespace(config.namespace.clone())
        .subsystem(config.subsystem.clone())
        .buckets(config.buckets.clone());

        let request_duration_seconds = HistogramVec::new(opts, &LABEL_NAMES)
            .map_err(|e| MittariError::Metrics(format!("request_duration_seconds: {e}")))?;

        Ok(Self {
            request_duration_seconds,
        })
    }

    /// Build and register in `registry`
    ///
    /// Fails if a collector with the same fully-qualified name is already
    /// registered there.
    pub fn register(registry: &Registry, config: &MetricsConfig) -> Result<Self> {
        let metrics = Self::new(config)?;
        registry
            .register(Box::new(metrics.request_duration_seconds.clone()))
            .map_err(|e| MittariError::Metrics(format!("request_duration_seconds: {e}")))?;
        Ok(metrics)
    }

    /// Initialize the global instance in the default registry (call once at startup)
    ///
    /// Subsequent calls return the instance from the first successful call,
    /// whatever `config` they pass.
    pub fn init(config: &MetricsConfig) -> Result<&'static GrpcMetrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Self::register(prometheus::default_registry(), config)?;

        // Set the metrics (only succeeds once)
        let _ = METRICS.set(metrics);

        METRICS
            .get()
            .ok_or_else(|| MittariError::Metrics("Failed to initialize metrics".to_string()))
    }

    /// Get the global metrics instance
    ///
    /// Returns None if metrics haven't been initialized yet.
    pub fn get() -> Option<&'static GrpcMetrics> {
        METRICS.get()
    }

    /// Pre-create zero-valued series for every method and code
    ///
    /// Without this a series only appears after its first call, which makes
    /// rate queries and alerts on rare codes unreliable. `methods` holds
    /// `(service, method)` pairs.
    pub fn prime<'a, I>(&self, methods: I, codes: &[Code])
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (service, method) in methods {
            for code in codes {
                // Creating the child is enough; nothing is observed
                let _ = self
                    .request_duration_seconds
                    .with_label_values(&[service, method, code_name(*code)]);
            }
        }
    }

    /// Number of observations recorded for one label combination
    pub fn sample_count(&self, labels: &Labels) -> u64 {
        self.request_duration_seconds
            .with_label_values(&labels.values())
            .get_sample_count()
    }
}

impl LatencyObserver for GrpcMetrics {
    fn observe(&self, labels: &Labels, value: f64) {
        self.request_duration_seconds
            .with_label_values(&labels.values())
            .observe(value);
    }
}

/// Gather the default registry and encode as Prometheus text format
pub fn gather() -> String {
    encode(&prometheus::gather())
}

/// Gather `registry` and encode as Prometheus text format
pub fn gather_registry(registry: &Registry) -> String {
    encode(&registry.gather())
}

fn encode(families: &[prometheus::proto::MetricFamily]) -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
