//! Real gRPC server tests
//!
//! These tests start an actual tonic server with the stats layer installed,
//! call it over the network and verify the latency observations.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use mittari_core::{LatencyHandler, Observation, RecordingObserver};
use mittari_gateway::{GrpcMetrics, MetricsConfig, StatsLayer};
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tonic::Code;
use tonic::transport::{Channel, Server};
use tonic_health::ServingStatus;
use tonic_health::pb::HealthCheckRequest;
use tonic_health::pb::health_client::HealthClient;

// ============================================================================
// Test Helpers
// ============================================================================

async fn start_server(handler: LatencyHandler) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let (mut reporter, health_service) = tonic_health::server::health_reporter();
    reporter
        .set_service_status("mittari.test.Echo", ServingStatus::Serving)
        .await;

    // Find available port
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let server_handle = tokio::spawn(async move {
        // Keep the reporter alive for the lifetime of the server
        let _reporter = reporter;
        Server::builder()
            .layer(StatsLayer::new(handler))
            .add_service(health_service)
            .serve(addr)
            .await
            .ok();
    });

    // Wait for server to be ready
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, server_handle)
}

async fn client(addr: SocketAddr) -> HealthClient<Channel> {
    let channel = Channel::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .unwrap();
    HealthClient::new(channel)
}

/// The server finishes the response body on its own task; poll until the
/// expected number of observations shows up
async fn wait_for(rec: &RecordingObserver, count: usize) -> Vec<Observation> {
    for _ in 0..100 {
        if rec.len() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    rec.observations()
}

fn recording_handler() -> (Arc<RecordingObserver>, LatencyHandler) {
    let rec = Arc::new(RecordingObserver::new());
    let handler = LatencyHandler::builder()
        .observer(rec.clone())
        .build()
        .unwrap();
    (rec, handler)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_successful_call_is_observed_once() {
    let (rec, handler) = recording_handler();
    let (addr, server) = start_server(handler).await;

    let response = client(addr)
        .await
        .check(HealthCheckRequest {
            service: String::new(),
        })
        .await
        .unwrap();
    assert_eq!(response.get_ref().status, ServingStatus::Serving as i32);

    let seen = wait_for(&rec, 1).await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].labels.service, "grpc.health.v1.Health");
    assert_eq!(seen[0].labels.method, "Check");
    assert_eq!(seen[0].labels.code, "OK");
    assert!(seen[0].value >= 0.0);
    assert!(seen[0].value < 5.0);

    server.abort();
}

#[tokio::test]
async fn test_error_status_is_labelled() {
    let (rec, handler) = recording_handler();
    let (addr, server) = start_server(handler).await;

    let status = client(addr)
        .await
        .check(HealthCheckRequest {
            service: "no.such.Service".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    let seen = wait_for(&rec, 1).await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].labels.method, "Check");
    assert_eq!(seen[0].labels.code, "NotFound");

    server.abort();
}

#[tokio::test]
async fn test_concurrent_calls_each_observed() {
    let (rec, handler) = recording_handler();
    let (addr, server) = start_server(handler).await;

    let mut tasks = Vec::new();
    for i in 0..20 {
        let mut client = client(addr).await;
        tasks.push(tokio::spawn(async move {
            let service = if i % 2 == 0 {
                "mittari.test.Echo".to_string()
            } else {
                "missing".to_string()
            };
            let _ = client.check(HealthCheckRequest { service }).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let seen = wait_for(&rec, 20).await;
    assert_eq!(seen.len(), 20);
    assert_eq!(seen.iter().filter(|o| o.labels.code == "OK").count(), 10);
    assert_eq!(
        seen.iter().filter(|o| o.labels.code == "NotFound").count(),
        10
    );

    server.abort();
}

#[tokio::test]
async fn test_prometheus_sink_end_to_end() {
    let registry = Registry::new();
    let metrics = GrpcMetrics::register(&registry, &MetricsConfig::default()).unwrap();
    let handler = LatencyHandler::builder()
        .observer(Arc::new(metrics.clone()))
        .build()
        .unwrap();
    let (addr, server) = start_server(handler).await;

    let mut client = client(addr).await;
    for _ in 0..3 {
        client
            .check(HealthCheckRequest {
                service: "mittari.test.Echo".to_string(),
            })
            .await
            .unwrap();
    }

    let labels = mittari_core::Labels {
        service: "grpc.health.v1.Health".to_string(),
        method: "Check".to_string(),
        code: "OK",
    };
    for _ in 0..100 {
        if metrics.sample_count(&labels) >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(metrics.sample_count(&labels), 3);

    let text = mittari_gateway::metrics::gather_registry(&registry);
    assert!(text.contains("mittari_grpc_request_duration_seconds_count"));

    server.abort();
}
