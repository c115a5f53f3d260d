//! Per-call context threaded from tag time to the terminal event

use crate::identity::CallIdentity;
use http::Extensions;

/// Information available when a call begins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcTagInfo {
    /// Fully-qualified method name, normally `/{service}/{method}`
    pub full_method_name: String,
}

impl RpcTagInfo {
    /// Tag info for the given method name
    pub fn new(full_method_name: impl Into<String>) -> Self {
        Self {
            full_method_name: full_method_name.into(),
        }
    }
}

/// Immutable per-call value bag
///
/// Each call owns its own context. Deriving a value with
/// [`with_value`](Self::with_value) returns a new context and leaves the
/// receiver untouched, so contexts can be shared freely across the tasks
/// that deliver one call's events. Values are keyed by type.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    values: Extensions,
}

impl CallContext {
    /// Empty root context
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a context carrying `value`, replacing any value of the same type
    pub fn with_value<T>(&self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut values = self.values.clone();
        values.insert(value);
        Self { values }
    }

    /// Look up a value by type
    pub fn value<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.values.get::<T>()
    }

    /// Derive a context carrying a call identity
    pub fn with_identity(&self, identity: CallIdentity) -> Self {
        self.with_value(identity)
    }

    /// The call identity attached by the tagger, if any
    pub fn identity(&self) -> Option<&CallIdentity> {
        self.value::<CallIdentity>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_identity_does_not_mutate_parent() {
        let root = CallContext::new();
        let tagged = root.with_identity(CallIdentity::new("svc", "m"));

        assert!(root.identity().is_none());
        assert_eq!(tagged.identity().map(|id| id.method()), Some("m"));
    }

    #[test]
    fn test_with_value_replaces_same_type() {
        let ctx = CallContext::new()
            .with_identity(CallIdentity::new("a", "b"))
            .with_identity(CallIdentity::new("c", "d"));
        assert_eq!(ctx.identity().map(|id| id.service()), Some("c"));
    }

    #[test]
    fn test_unrelated_values_coexist() {
        #[derive(Clone, Debug, PartialEq)]
        struct Attempt(u32);

        let ctx = CallContext::new()
            .with_value(Attempt(2))
            .with_identity(CallIdentity::unknown());

        assert_eq!(ctx.value::<Attempt>(), Some(&Attempt(2)));
        assert!(ctx.identity().is_some_and(CallIdentity::is_unknown));
    }

    #[test]
    fn test_context_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CallContext>();
    }
}
