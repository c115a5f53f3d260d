//! Observation sink for completed calls
//!
//! The [`LatencyObserver`] trait is the only thing the handler needs from a
//! metrics backend: "record this value under these labels". The Prometheus
//! adapter lives in `mittari-gateway`; [`RecordingObserver`] keeps every
//! observation in memory for assertions.

use parking_lot::Mutex;

/// Label name for the service segment
pub const LABEL_GRPC_SERVICE: &str = "grpc_service";

/// Label name for the method segment
pub const LABEL_GRPC_METHOD: &str = "grpc_method";

/// Label name for the outcome code
pub const LABEL_GRPC_CODE: &str = "grpc_code";

/// Label names in the order [`Labels::values`] returns them
pub const LABEL_NAMES: [&str; 3] = [LABEL_GRPC_SERVICE, LABEL_GRPC_METHOD, LABEL_GRPC_CODE];

/// Dimensions of one observation
///
/// Bounded cardinality: service and method come from the deployed API
/// surface (or `unknown`), code from the fixed set of status codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels {
    pub service: String,
    pub method: String,
    pub code: &'static str,
}

impl Labels {
    /// Label values ordered like [`LABEL_NAMES`]
    pub fn values(&self) -> [&str; 3] {
        [self.service.as_str(), self.method.as_str(), self.code]
    }
}

/// A single latency measurement
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Elapsed seconds
    pub value: f64,
    pub labels: Labels,
}

/// Records latency observations
///
/// Called once per completed call, potentially from many tasks at once, so
/// implementations must be internally synchronized.
///
/// # Example
///
/// ```
/// use mittari_core::{Labels, LatencyObserver};
///
/// struct LogObserver;
///
/// impl LatencyObserver for LogObserver {
///     fn observe(&self, labels: &Labels, value: f64) {
///         println!("{}/{} {} {value}s", labels.service, labels.method, labels.code);
///     }
/// }
/// ```
pub trait LatencyObserver: Send + Sync {
    /// Record `value` (seconds) under `labels`
    fn observe(&self, labels: &Labels, value: f64);
}

/// Observer that keeps every observation, in arrival order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    observations: Mutex<Vec<Observation>>,
}

impl RecordingObserver {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().clone()
    }

    /// Number of observations recorded
    pub fn len(&self) -> usize {
        self.observations.lock().len()
    }

    /// True when nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.observations.lock().is_empty()
    }

    /// Drop everything recorded so far
    pub fn clear(&self) {
        self.observations.lock().clear();
    }
}

impl LatencyObserver for RecordingObserver {
    fn observe(&self, labels: &Labels, value: f64) {
        self.observations.lock().push(Observation {
            value,
            labels: labels.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn labels(code: &'static str) -> Labels {
        Labels {
            service: "svc".to_string(),
            method: "m".to_string(),
            code,
        }
    }

    #[test]
    fn test_values_follow_label_names() {
        let l = labels("OK");
        assert_eq!(l.values(), ["svc", "m", "OK"]);
        assert_eq!(LABEL_NAMES, ["grpc_service", "grpc_method", "grpc_code"]);
    }

    #[test]
    fn test_recording_observer_keeps_order() {
        let rec = RecordingObserver::new();
        assert!(rec.is_empty());

        rec.observe(&labels("OK"), 1.0);
        rec.observe(&labels("Canceled"), 2.5);

        let seen = rec.observations();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].labels.code, "OK");
        assert_eq!(seen[1].value, 2.5);

        rec.clear();
        assert!(rec.is_empty());
    }

    #[test]
    fn test_observer_is_object_safe() {
        let rec = Arc::new(RecordingObserver::new());
        let observer: Arc<dyn LatencyObserver> = rec.clone();
        observer.observe(&labels("Unknown"), 0.25);
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn test_recording_observer_concurrent() {
        let rec = Arc::new(RecordingObserver::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rec = Arc::clone(&rec);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        rec.observe(&labels("OK"), 0.1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("observer thread panicked");
        }
        assert_eq!(rec.len(), 800);
    }
}
