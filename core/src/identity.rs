//! Call identity derived from a fully-qualified RPC name
//!
//! gRPC names every call `/{service}/{method}`, where the service is the
//! package-qualified name (`grpc.health.v1.Health`) and is kept whole.

use std::fmt;
use std::sync::Arc;

/// Sentinel used for both service and method when a name cannot be parsed
pub const UNKNOWN: &str = "unknown";

/// The `{service, method}` pair describing a single call
///
/// Created once per call and never mutated. Cloning is cheap, so the
/// identity can ride along in a [`CallContext`](crate::CallContext).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallIdentity {
    service: Arc<str>,
    method: Arc<str>,
}

impl CallIdentity {
    /// Build an identity from already-split segments
    pub fn new(service: impl Into<Arc<str>>, method: impl Into<Arc<str>>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }

    /// The `unknown`/`unknown` identity
    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN)
    }

    /// Parse a fully-qualified method name
    ///
    /// A single leading `/` is optional. Anything other than exactly two
    /// non-empty segments degrades to [`CallIdentity::unknown`]; this never
    /// fails.
    ///
    /// ```
    /// use mittari_core::CallIdentity;
    ///
    /// let id = CallIdentity::parse("/some.service.path/method");
    /// assert_eq!(id.service(), "some.service.path");
    /// assert_eq!(id.method(), "method");
    ///
    /// assert!(CallIdentity::parse("").is_unknown());
    /// ```
    pub fn parse(full_method_name: &str) -> Self {
        let trimmed = full_method_name
            .strip_prefix('/')
            .unwrap_or(full_method_name);

        match trimmed.split_once('/') {
            Some((service, method))
                if !service.is_empty() && !method.is_empty() && !method.contains('/') =>
            {
                Self::new(service, method)
            }
            _ => Self::unknown(),
        }
    }

    /// Service segment, e.g. `some.service.path`
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Method segment
    pub fn method(&self) -> &str {
        &self.method
    }

    /// True for the sentinel identity
    pub fn is_unknown(&self) -> bool {
        &*self.service == UNKNOWN && &*self.method == UNKNOWN
    }
}

impl fmt::Display for CallIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.service, self.method)
    }
}
