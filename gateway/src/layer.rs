//! Tower layer that drives a [`StatsHandler`] from tonic server calls
//!
//! tonic has no per-call stats hooks, so the layer produces the lifecycle
//! events itself:
//!
//! ```text
//! request ──► tag_rpc(uri path) ──► Begin ──► inner service
//!                                                │
//! response body ──► OutPayload per data frame ───┤
//!               └─► End (grpc-status from trailers or trailers-only headers)
//! ```
//!
//! Request bodies pass through untouched, so `InPayload` is never emitted.
//!
//! # Example
//!
//! ```ignore
//! let metrics = GrpcMetrics::init(&MetricsConfig::default())?;
//! let handler = LatencyHandler::builder().observer(Arc::new(metrics.clone())).build()?;
//!
//! Server::builder()
//!     .layer(StatsLayer::new(handler))
//!     .add_service(my_service)
//!     .serve(addr)
//!     .await?;
//! ```

use bytes::Buf;
use http::{HeaderMap, Request, Response};
use http_body::{Body, Frame, SizeHint};
use mittari_core::{
    Begin, CallContext, End, LifecycleEvent, OutPayload, RpcTagInfo, StatsHandler,
};
use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::SystemTime;
use tonic::{Code, Status};
use tower::{BoxError, Layer, Service};

/// Layer wrapping services in [`StatsService`]
pub struct StatsLayer<H> {
    handler: Arc<H>,
}

impl<H> StatsLayer<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Layer sharing an existing handler
    pub fn from_shared(handler: Arc<H>) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }
}

impl<H> Clone for StatsLayer<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<S, H> Layer<S> for StatsLayer<H> {
    type Service = StatsService<S, H>;

    fn layer(&self, inner: S) -> Self::Service {
        StatsService {
            inner,
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Service reporting each call's lifecycle to a [`StatsHandler`]
pub struct StatsService<S, H> {
    inner: S,
    handler: Arc<H>,
}

impl<S: Clone, H> Clone for StatsService<S, H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<S, H, ReqBody, ResBody> Service<Request<ReqBody>> for StatsService<S, H>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
    H: StatsHandler,
    ResBody: Body + Unpin,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<InstrumentedBody<ResBody, H>>;
    type Error = BoxError;
    type Future = ResponseFuture<S::Future, H>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let begin_time = SystemTime::now();
        let ctx = self
            .handler
            .tag_rpc(&CallContext::new(), &RpcTagInfo::new(req.uri().path()));

        let call = CallState {
            ctx,
            handler: Arc::clone(&self.handler),
            begin_time,
        };
        call.emit(&LifecycleEvent::Begin(Begin::at(begin_time)));

        ResponseFuture {
            inner: Box::pin(self.inner.call(req)),
            call,
        }
    }
}

/// Everything needed to report events for one in-flight call
struct CallState<H> {
    ctx: CallContext,
    handler: Arc<H>,
    begin_time: SystemTime,
}

impl<H> Clone for CallState<H> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            handler: Arc::clone(&self.handler),
            begin_time: self.begin_time,
        }
    }
}

impl<H: StatsHandler> CallState<H> {
    fn emit(&self, event: &LifecycleEvent<'_>) {
        self.handler.handle_rpc(&self.ctx, event);
    }

    fn end(&self, error: Option<&(dyn Error + 'static)>) {
        self.emit(&LifecycleEvent::End(End {
            begin_time: self.begin_time,
            end_time: SystemTime::now(),
            error,
        }));
    }
}

/// Response future of [`StatsService`]
pub struct ResponseFuture<F, H> {
    inner: Pin<Box<F>>,
    call: CallState<H>,
}

impl<F, H, B, E> Future for ResponseFuture<F, H>
where
    F: Future<Output = Result<Response<B>, E>>,
    E: Into<BoxError>,
    H: StatsHandler,
    B: Body + Unpin,
{
    type Output = Result<Response<InstrumentedBody<B, H>>, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match ready!(this.inner.as_mut().poll(cx)) {
            Ok(response) => {
                let header_status = status_from_headers(response.status(), response.headers());
                let call = this.call.clone();
                Poll::Ready(Ok(
                    response.map(|body| InstrumentedBody::new(body, call, header_status))
                ))
            }
            Err(err) => {
                let err: BoxError = err.into();
                this.call.end(Some(err.as_ref()));
                Poll::Ready(Err(err))
            }
        }
    }
}

/// Status carried by the response head
///
/// Trailers-only responses put `grpc-status` in the headers. A non-2xx
/// response without one never reached a gRPC handler and counts as
/// `Unknown`.
fn status_from_headers(http_status: http::StatusCode, headers: &HeaderMap) -> Option<Status> {
    Status::from_header_map(headers).or_else(|| {
        (!http_status.is_success())
            .then(|| Status::unknown(format!("HTTP status {http_status} without grpc-status")))
    })
}

/// Status carried by the trailers
///
/// Trailers without `grpc-status` are a failed call for any gRPC client, so
/// they count as `Unknown` rather than `OK`.
fn status_from_trailers(trailers: &HeaderMap) -> Status {
    Status::from_header_map(trailers)
        .unwrap_or_else(|| Status::unknown("trailers without grpc-status"))
}

/// Response body that reports payloads and call completion
///
/// Emits `End` exactly once: on trailers, on end of stream, on a body error,
/// or on drop when the inner body had already reached end of stream. A body
/// dropped mid-stream (client went away) reports nothing.
pub struct InstrumentedBody<B: Body, H: StatsHandler> {
    inner: B,
    call: CallState<H>,
    header_status: Option<Status>,
    finished: bool,
}

impl<B: Body, H: StatsHandler> InstrumentedBody<B, H> {
    fn new(inner: B, call: CallState<H>, header_status: Option<Status>) -> Self {
        Self {
            inner,
            call,
            header_status,
            finished: false,
        }
    }

    fn finish(&mut self, status: Option<&Status>) {
        if self.finished {
            return;
        }
        self.finished = true;

        let error = status
            .filter(|s| s.code() != Code::Ok)
            .map(|s| s as &(dyn Error + 'static));
        self.call.end(error);
    }

    fn finish_with_error(&mut self, error: &(dyn Error + 'static)) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.call.end(Some(error));
    }

    fn finish_from_headers(&mut self) {
        let status = self.header_status.take();
        self.finish(status.as_ref());
    }
}

impl<B, H> Body for InstrumentedBody<B, H>
where
    B: Body + Unpin,
    B::Error: Into<BoxError>,
    H: StatsHandler,
{
    type Data = B::Data;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    let length = data.remaining();
                    this.call.emit(&LifecycleEvent::OutPayload(OutPayload {
                        length,
                        wire_length: length,
                        sent_time: SystemTime::now(),
                    }));
                } else if let Some(trailers) = frame.trailers_ref() {
                    // Trailers win over anything seen in the headers
                    let status = status_from_trailers(trailers);
                    this.finish(Some(&status));
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(err)) => {
                let err: BoxError = err.into();
                this.finish_with_error(err.as_ref());
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.finish_from_headers();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B: Body, H: StatsHandler> Drop for InstrumentedBody<B, H> {
    fn drop(&mut self) {
        if !self.finished && self.inner.is_end_stream() {
            self.finish_from_headers();
        }
    }
}
