//! Error types for mittari

use thiserror::Error;

/// Result type alias for mittari operations
pub type Result<T> = std::result::Result<T, MittariError>;

/// Construction and setup errors
///
/// Nothing on the call path returns these: once a handler is built,
/// instrumentation problems degrade to `unknown` labels instead of failing
/// the call.
#[derive(Error, Debug)]
pub enum MittariError {
    /// Handler built without an observer to report to
    #[error("latency observer is required")]
    MissingObserver,

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Metric registration or encoding failed
    #[error("metrics error: {0}")]
    Metrics(String),
}
