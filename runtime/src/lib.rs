//! mittari runtime - one-call instrumentation bootstrap
//!
//! Provides [`init()`] for zero-boilerplate setup, and [`RuntimeBuilder`] for
//! users who need control over the metrics port, priming, etc.
//!
//! # Quick start
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let instrumentation = mittari_runtime::init()?;
//!
//!     Server::builder()
//!         .layer(instrumentation.layer())
//!         .add_service(my_service)
//!         .serve(addr)
//!         .await?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

use anyhow::Context;
use mittari_core::{EXPECTED_CODES, LatencyHandler};
use mittari_gateway::config::{Config, LogFormat};
use mittari_gateway::metrics::GrpcMetrics;
use mittari_gateway::metrics_server::MetricsServer;
use mittari_gateway::StatsLayer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Set up instrumentation with default settings.
///
/// Loads configuration from environment variables, initialises tracing and
/// the global metrics, and starts the metrics HTTP server. Must be called
/// from within a Tokio runtime.
pub fn init() -> anyhow::Result<Instrumentation> {
    RuntimeBuilder::new().build()
}

/// Power-user builder for controlling runtime behaviour.
///
/// # Example
///
/// ```ignore
/// let instrumentation = RuntimeBuilder::new()
///     .metrics_port(9464)
///     .prime("grpc.health.v1.Health", "Check")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config: Option<Config>,
    metrics_port: Option<u16>,
    serve_metrics: bool,
    prime: Vec<(String, String)>,
}

impl RuntimeBuilder {
    /// Create a new builder with defaults from environment variables.
    pub fn new() -> Self {
        Self {
            config: None,
            metrics_port: None,
            serve_metrics: true,
            prime: Vec::new(),
        }
    }

    /// Use `config` instead of reading the environment.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the metrics HTTP server port.
    ///
    /// Default: the port of `MITTARI_METRICS_ADDR`, or `9090`.
    pub fn metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }

    /// Don't start the metrics HTTP server.
    ///
    /// For processes that already expose the default Prometheus registry.
    pub fn disable_metrics_server(mut self) -> Self {
        self.serve_metrics = false;
        self
    }

    /// Pre-create zero-valued series for a method under every expected code.
    pub fn prime(mut self, service: impl Into<String>, method: impl Into<String>) -> Self {
        self.prime.push((service.into(), method.into()));
        self
    }

    /// Initialise everything and hand back the layer to install.
    pub fn build(self) -> anyhow::Result<Instrumentation> {
        // ── 1. Load config ───────────────────────────────────────
        let config = match self.config {
            Some(config) => config,
            None => Config::from_env()?,
        };

        // ── 2. Init tracing ──────────────────────────────────────
        init_tracing(&config);

        // ── 3. Init metrics ──────────────────────────────────────
        let metrics = GrpcMetrics::init(&config.metrics)?;
        metrics.prime(
            self.prime.iter().map(|(s, m)| (s.as_str(), m.as_str())),
            EXPECTED_CODES,
        );

        let handler = LatencyHandler::builder()
            .observer(Arc::new(metrics.clone()))
            .build()?;

        // ── 4. Metrics HTTP server ───────────────────────────────
        let metrics_handle = if self.serve_metrics {
            tokio::runtime::Handle::try_current()
                .context("the metrics server needs a Tokio runtime")?;

            let mut addr = config.metrics_addr;
            if let Some(port) = self.metrics_port {
                addr.set_port(port);
            }
            Some(MetricsServer::start_on(addr))
        } else {
            None
        };

        info!(
            namespace = %config.metrics.namespace,
            subsystem = %config.metrics.subsystem,
            buckets = config.metrics.buckets.len(),
            primed = self.prime.len(),
            metrics_server = metrics_handle.is_some(),
            "mittari instrumentation ready"
        );

        Ok(Instrumentation {
            layer: StatsLayer::new(handler),
            metrics,
            metrics_addr: config.metrics_addr,
            metrics_handle,
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Live instrumentation: the layer, the metrics and the metrics server task.
///
/// Dropping it stops the metrics server; layers handed out keep working.
pub struct Instrumentation {
    layer: StatsLayer<LatencyHandler>,
    metrics: &'static GrpcMetrics,
    metrics_addr: SocketAddr,
    metrics_handle: Option<JoinHandle<()>>,
}

impl Instrumentation {
    /// Layer for `tonic::transport::Server::builder().layer(..)`
    pub fn layer(&self) -> StatsLayer<LatencyHandler> {
        self.layer.clone()
    }

    pub fn metrics(&self) -> &'static GrpcMetrics {
        self.metrics
    }

    /// Configured metrics address (before any port override)
    pub fn metrics_addr(&self) -> SocketAddr {
        self.metrics_addr
    }

    pub fn serves_metrics(&self) -> bool {
        self.metrics_handle.is_some()
    }
}

impl Drop for Instrumentation {
    fn drop(&mut self) {
        if let Some(handle) = self.metrics_handle.take() {
            handle.abort();
        }
    }
}

/// Initialise the tracing subscriber based on config.
///
/// `RUST_LOG` takes precedence over `MITTARI_LOG_LEVEL`. Only the first call
/// installs a subscriber; later calls are no-ops.
pub fn init_tracing(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
