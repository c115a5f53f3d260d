//! mittari-gateway - serving-side wiring for mittari
//!
//! Plugs the core latency handler into a tonic server and exposes the result
//! to Prometheus.
//!
//! ```text
//! tonic Server ──► StatsLayer ──► LatencyHandler ──► GrpcMetrics ──► /metrics
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod config;
pub mod layer;
pub mod metrics;
pub mod metrics_server;

pub use config::{Config, LogFormat, MetricsConfig};
pub use layer::{InstrumentedBody, StatsLayer, StatsService};
pub use metrics::GrpcMetrics;
pub use metrics_server::MetricsServer;
