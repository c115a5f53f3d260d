//! Per-call stats handling
//!
//! The call-execution layer drives a [`StatsHandler`] in two steps:
//!
//! ```text
//! tag_rpc(ctx, info) ──► ctx' ──► handle_rpc(ctx', Begin)
//!                                  handle_rpc(ctx', OutPayload)  (0..n)
//!                                  handle_rpc(ctx', End)         (0..1)
//! ```
//!
//! Drivers that see request frames may also send `InPayload`; the tonic
//! layer in mittari-gateway does not.
//!
//! [`LatencyHandler`] turns that stream into exactly one latency observation
//! per completed call. Everything it needs travels in the call's own
//! context, so no state is shared between calls.

use crate::context::{CallContext, RpcTagInfo};
use crate::error::{MittariError, Result};
use crate::event::{End, LifecycleEvent};
use crate::identity::CallIdentity;
use crate::sink::{Labels, LatencyObserver};
use crate::status::{code_name, outcome_code};
use std::sync::Arc;

/// Hooks invoked by the call-execution layer
///
/// Both methods are called concurrently for many calls and must not block.
pub trait StatsHandler: Send + Sync {
    /// Called once when a call begins; returns the context to use for the
    /// rest of the call's events
    fn tag_rpc(&self, ctx: &CallContext, info: &RpcTagInfo) -> CallContext;

    /// Called for every lifecycle event of a call
    fn handle_rpc(&self, ctx: &CallContext, event: &LifecycleEvent<'_>);
}

impl<H: StatsHandler + ?Sized> StatsHandler for Arc<H> {
    fn tag_rpc(&self, ctx: &CallContext, info: &RpcTagInfo) -> CallContext {
        (**self).tag_rpc(ctx, info)
    }

    fn handle_rpc(&self, ctx: &CallContext, event: &LifecycleEvent<'_>) {
        (**self).handle_rpc(ctx, event)
    }
}

/// Records one `{service, method, code}` latency observation per call
#[derive(Clone)]
pub struct LatencyHandler {
    observer: Arc<dyn LatencyObserver>,
}

impl std::fmt::Debug for LatencyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyHandler").finish_non_exhaustive()
    }
}

impl LatencyHandler {
    /// Start building a handler
    pub fn builder() -> LatencyHandlerBuilder {
        LatencyHandlerBuilder::default()
    }

    /// Handler reporting to `observer`
    pub fn new(observer: Arc<dyn LatencyObserver>) -> Self {
        Self { observer }
    }

    fn observe_end(&self, ctx: &CallContext, end: &End<'_>) {
        let identity = match ctx.identity() {
            Some(identity) => identity.clone(),
            None => {
                tracing::debug!("call completed without a tagged identity");
                CallIdentity::unknown()
            }
        };

        let code = outcome_code(end.error);
        let labels = Labels {
            service: identity.service().to_string(),
            method: identity.method().to_string(),
            code: code_name(code),
        };
        let value = end.elapsed_seconds();

        tracing::trace!(
            service = %labels.service,
            method = %labels.method,
            code = labels.code,
            seconds = value,
            "call observed"
        );

        self.observer.observe(&labels, value);
    }
}

impl StatsHandler for LatencyHandler {
    fn tag_rpc(&self, ctx: &CallContext, info: &RpcTagInfo) -> CallContext {
        let identity = CallIdentity::parse(&info.full_method_name);
        if identity.is_unknown() {
            tracing::debug!(
                full_method_name = %info.full_method_name,
                "unparseable method name, reporting as unknown"
            );
        }
        ctx.with_identity(identity)
    }

    fn handle_rpc(&self, ctx: &CallContext, event: &LifecycleEvent<'_>) {
        match event {
            LifecycleEvent::Begin(_) | LifecycleEvent::InPayload(_) | LifecycleEvent::OutPayload(_) => {}
            LifecycleEvent::End(end) => self.observe_end(ctx, end),
        }
    }
}

/// Builder for [`LatencyHandler`]
#[derive(Default)]
pub struct LatencyHandlerBuilder {
    observer: Option<Arc<dyn LatencyObserver>>,
}

impl LatencyHandlerBuilder {
    /// Observer that receives one observation per completed call
    pub fn observer(mut self, observer: Arc<dyn LatencyObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the handler
    ///
    /// Fails with [`MittariError::MissingObserver`] when no observer was set.
    pub fn build(self) -> Result<LatencyHandler> {
        let observer = self.observer.ok_or(MittariError::MissingObserver)?;
        Ok(LatencyHandler { observer })
    }
}
