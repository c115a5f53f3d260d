//! HTTP server for Prometheus scraping
//!
//! Runs on its own port, separate from the gRPC listener.
//!
//! # Endpoints
//!
//! - `GET /metrics` - Prometheus metrics from the default registry
//! - `GET /health` - Simple health check
//!
//! # Example
//!
//! ```ignore
//! use mittari_gateway::metrics_server::MetricsServer;
//!
//! let metrics_handle = MetricsServer::start(9090);
//! ```

use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Metrics HTTP server
pub struct MetricsServer;

impl MetricsServer {
    /// Start the metrics server on all interfaces at `port`
    ///
    /// Returns a JoinHandle that can be used to abort the server.
    /// The server runs until aborted or the process exits.
    pub fn start(port: u16) -> JoinHandle<()> {
        Self::start_on(SocketAddr::from(([0, 0, 0, 0], port)))
    }

    /// Start the metrics server on `addr`
    pub fn start_on(addr: SocketAddr) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(%addr, "Metrics server starting");

            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    error!(error = %e, %addr, "Failed to bind metrics server");
                    return;
                }
            };

            if let Err(e) = axum::serve(listener, router()).await {
                error!(error = %e, "Metrics server error");
            }
        })
    }
}

/// Routes served by [`MetricsServer`]
pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
}

async fn metrics_handler() -> impl IntoResponse {
    let body = crate::metrics::gather();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::MetricsConfig;
    use crate::metrics::GrpcMetrics;
    use axum::body::Body;
    use http::Request;
    use mittari_core::{Labels, LatencyObserver};
    use tower::ServiceExt;

    async fn get_path(path: &str) -> axum::response::Response {
        router()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_metrics_handler_returns_prometheus_format() {
        let metrics = GrpcMetrics::init(&MetricsConfig::default()).unwrap();
        metrics.observe(
            &Labels {
                service: "grpc.health.v1.Health".to_string(),
                method: "Check".to_string(),
                code: "OK",
            },
            0.01,
        );

        let response = get_path("/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));

        let body = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("_request_duration_seconds"));
        assert!(text.contains("grpc_method=\"Check\""));
    }

    #[tokio::test]
    async fn test_health_handler_returns_json() {
        let response = get_path("/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("application/json"));

        let body = axum::body::to_bytes(response.into_body(), 10_000)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let response = get_path("/pipeline").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_failure_ends_task() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let handle = MetricsServer::start_on(addr);
        // Task logs the bind error and returns instead of panicking
        handle.await.unwrap();
    }
}
