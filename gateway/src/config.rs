//! Configuration loaded from environment variables
//!
//! | variable | default |
//! |---|---|
//! | `MITTARI_METRICS_ADDR` | `0.0.0.0:9090` |
//! | `MITTARI_METRICS_NAMESPACE` | `mittari` |
//! | `MITTARI_METRICS_SUBSYSTEM` | `grpc` |
//! | `MITTARI_LATENCY_BUCKETS` | `0.001,0.004,0.016,0.064,0.256,1.024,4.096,16.384` |
//! | `MITTARI_LOG_LEVEL` | `info` |
//! | `MITTARI_LOG_FORMAT` | `pretty` (or `json`) |

use mittari_core::{MittariError, Result};
use std::net::SocketAddr;
use std::str::FromStr;

/// Default latency buckets in seconds: 1ms growing by 4x up to ~16s
pub const DEFAULT_BUCKETS: &[f64] = &[0.001, 0.004, 0.016, 0.064, 0.256, 1.024, 4.096, 16.384];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = MittariError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(MittariError::Config(format!(
                "MITTARI_LOG_FORMAT: expected 'pretty' or 'json', got '{other}'"
            ))),
        }
    }
}

/// Histogram naming and bucket layout
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub namespace: String,
    pub subsystem: String,
    /// Upper bounds in seconds, strictly increasing
    pub buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "mittari".to_string(),
            subsystem: "grpc".to_string(),
            buckets: DEFAULT_BUCKETS.to_vec(),
        }
    }
}

/// Full runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub metrics_addr: SocketAddr,
    pub metrics: MetricsConfig,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            metrics: MetricsConfig::default(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup; unset keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let metrics_addr = match get("MITTARI_METRICS_ADDR") {
            Some(v) => v.trim().parse().map_err(|e| {
                MittariError::Config(format!("MITTARI_METRICS_ADDR: invalid address '{v}': {e}"))
            })?,
            None => defaults.metrics_addr,
        };

        let buckets = match get("MITTARI_LATENCY_BUCKETS") {
            Some(v) => parse_buckets(&v)?,
            None => defaults.metrics.buckets,
        };

        let log_format = match get("MITTARI_LOG_FORMAT") {
            Some(v) => v.trim().parse()?,
            None => defaults.log_format,
        };

        Ok(Config {
            metrics_addr,
            metrics: MetricsConfig {
                namespace: get("MITTARI_METRICS_NAMESPACE").unwrap_or(defaults.metrics.namespace),
                subsystem: get("MITTARI_METRICS_SUBSYSTEM").unwrap_or(defaults.metrics.subsystem),
                buckets,
            },
            log_level: get("MITTARI_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
        })
    }
}

/// Parse a comma-separated, strictly increasing list of finite bucket bounds
pub fn parse_buckets(raw: &str) -> Result<Vec<f64>> {
    let buckets = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>().map_err(|e| {
                MittariError::Config(format!("MITTARI_LATENCY_BUCKETS: invalid bound '{s}': {e}"))
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    validate_buckets(&buckets)?;
    Ok(buckets)
}

/// Check that buckets are non-empty, finite and strictly increasing
pub fn validate_buckets(buckets: &[f64]) -> Result<()> {
    if buckets.is_empty() {
        return Err(MittariError::Config(
            "MITTARI_LATENCY_BUCKETS: at least one bucket is required".to_string(),
        ));
    }
    if let Some(bad) = buckets.iter().find(|b| !b.is_finite()) {
        return Err(MittariError::Config(format!(
            "MITTARI_LATENCY_BUCKETS: bound {bad} is not finite"
        )));
    }
    if buckets.windows(2).any(|w| w[0] >= w[1]) {
        return Err(MittariError::Config(
            "MITTARI_LATENCY_BUCKETS: bounds must be strictly increasing".to_string(),
        ));
    }
    Ok(())
}
