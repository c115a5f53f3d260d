//! mittari-core - per-call RPC latency instrumentation
//!
//! Turns the lifecycle events of a remote procedure call into exactly one
//! latency observation labelled `{grpc_service, grpc_method, grpc_code}`:
//!
//! - [`CallIdentity`] - normalized `{service, method}` parsed from `/service/method`
//! - [`CallContext`] - immutable per-call value bag carrying the identity
//! - [`LifecycleEvent`] - `Begin`, `InPayload`, `OutPayload`, `End`
//! - [`StatsHandler`] / [`LatencyHandler`] - the tag and reduce hooks
//! - [`LatencyObserver`] - the sink capability; [`RecordingObserver`] for tests
//! - [`status`] - canonical outcome codes recovered from wrapped errors
//!
//! ```text
//! tag_rpc ──► CallContext{identity} ──► handle_rpc(End) ──► LatencyObserver::observe
//! ```
//!
//! The core never fails a call: unparseable names and status-less errors
//! degrade to `unknown` / `Unknown` labels.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

mod context;
mod error;
mod event;
mod handler;
mod identity;
mod sink;
/// Outcome codes recovered from call errors
pub mod status;

pub use context::{CallContext, RpcTagInfo};
pub use error::{MittariError, Result};
pub use event::{Begin, End, InPayload, LifecycleEvent, OutPayload};
pub use handler::{LatencyHandler, LatencyHandlerBuilder, StatsHandler};
pub use identity::{CallIdentity, UNKNOWN};
pub use sink::{
    LABEL_GRPC_CODE, LABEL_GRPC_METHOD, LABEL_GRPC_SERVICE, LABEL_NAMES, Labels, LatencyObserver,
    Observation, RecordingObserver,
};
pub use status::{EXPECTED_CODES, code_name, find_code, outcome_code};

/// Re-exported so callers can name codes without depending on tonic directly
pub use tonic::Code;
