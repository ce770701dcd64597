//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{header, StatusCode},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use waf_gate::config::schema::{RuleConfig, RulePhase, RuleTarget};
use waf_gate::engine::Action;
use waf_gate::{BasicEngine, GatewayConfig, HttpServer, PathPolicyStore, Shutdown};

/// Response body the mock backend serves on `/secret`.
pub const SECRET_BODY: &str = "api_key=sk_live_0123456789";

/// Chunks the mock backend streams on `/stream`.
pub const STREAMED_CHUNKS: [&str; 2] = ["hello ", "world"];

/// Start a mock backend on an ephemeral port.
///
/// Routes: `/echo` returns the request body, `/secret` returns
/// [`SECRET_BODY`], `/stream` sends [`STREAMED_CHUNKS`] without a length,
/// anything else returns `ok`. The counter tracks how many
/// requests reached it.
pub async fn start_mock_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let app = Router::new()
        .route("/echo", any(|body: Bytes| async move { ([(header::CONTENT_TYPE, "text/plain")], body) }))
        .route("/secret", get(|| async { ([(header::CONTENT_TYPE, "text/plain")], SECRET_BODY) }))
        .route("/stream", get(|| async { ([(header::CONTENT_TYPE, "text/plain")], streamed_body()) }))
        .fallback(|| async { (StatusCode::OK, "ok") })
        .layer(axum::middleware::from_fn(move |req: axum::extract::Request, next: axum::middleware::Next| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { next.run(req).await }
        }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, hits)
}

/// A body with no known length, sent chunked on the wire.
fn streamed_body() -> Body {
    let chunks = STREAMED_CHUNKS
        .iter()
        .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes())));
    Body::from_stream(futures_util::stream::iter(chunks))
}

/// Start the gateway in front of `upstream`, returning its address, the
/// shutdown coordinator and the server task.
pub async fn start_gateway(
    mut config: GatewayConfig,
    upstream: SocketAddr,
) -> (SocketAddr, Shutdown, JoinHandle<()>) {
    config.upstream.address = upstream.to_string();

    let engine = Arc::new(BasicEngine::from_config(&config.engine).unwrap());
    let policies = Arc::new(PathPolicyStore::from_config(&config.paths));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(config, engine, policies);
    let handle = tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown, handle)
}

pub fn rule(id: u32, phase: RulePhase, target: RuleTarget, pattern: &str, status: u16) -> RuleConfig {
    RuleConfig {
        id,
        phase,
        target,
        pattern: pattern.to_string(),
        status,
        action: Action::Deny,
        msg: String::new(),
    }
}

/// Non-pooled client so each test sees fresh connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
