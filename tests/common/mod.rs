// tests/common/mod.rs
// In-process HTTP stand-ins for the messaging endpoint and the media host.
#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use feed_relay::config::{DeliveryConfig, MediaConfig};

#[derive(Clone, Default)]
pub struct Captured {
    inner: Arc<Mutex<Vec<(Instant, Value)>>>,
    reloads: Arc<AtomicUsize>,
}

impl Captured {
    fn push(&self, v: Value) {
        self.inner.lock().push((Instant::now(), v));
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.inner.lock().iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn times(&self) -> Vec<Instant> {
        self.inner.lock().iter().map(|(t, _)| *t).collect()
    }

    /// POSTs received on `/reload`.
    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Texts of every captured text segment, in arrival order.
    pub fn texts(&self) -> Vec<String> {
        self.bodies()
            .iter()
            .flat_map(|b| b["message"].as_array().cloned().unwrap_or_default())
            .filter(|seg| seg["type"] == "text")
            .filter_map(|seg| seg["data"]["text"].as_str().map(str::to_string))
            .collect()
    }

    pub async fn wait_for(&self, n: usize, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if self.len() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.len() >= n
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    /// Bodies POSTed to `/send` and `/reject`.
    pub captured: Captured,
}

impl MockServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn accept(State(c): State<Captured>, Json(v): Json<Value>) -> Json<Value> {
    c.push(v);
    Json(json!({"status": "ok", "retcode": 0}))
}

async fn reject(State(c): State<Captured>, Json(v): Json<Value>) -> (StatusCode, &'static str) {
    c.push(v);
    (StatusCode::INTERNAL_SERVER_ERROR, "rejected")
}

async fn image(Path(name): Path<String>, Query(q): Query<HashMap<String, String>>) -> Vec<u8> {
    let variant = q.get("name").cloned().unwrap_or_else(|| "orig".into());
    format!("img:{name}:{variant}").into_bytes()
}

pub const READY_SNAPSHOT: &str =
    r#"[{"time":"2024-01-01 00:00:01","username":"a","content":"hi"}]"#;

/// Snapshot sidecar stand-in: `ready`, `none` (204), `null`, `blank`, anything else 500.
async fn snapshot(Path(mode): Path<String>) -> (StatusCode, &'static str) {
    match mode.as_str() {
        "ready" => (StatusCode::OK, READY_SNAPSHOT),
        "none" => (StatusCode::NO_CONTENT, ""),
        "null" => (StatusCode::OK, "null"),
        "blank" => (StatusCode::OK, "  "),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "extraction failed"),
    }
}

async fn reload(State(c): State<Captured>) -> StatusCode {
    c.reloads.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(10)).await;
    "late"
}

pub async fn spawn_mock() -> MockServer {
    let captured = Captured::default();
    let app = Router::new()
        .route("/send", post(accept))
        .route("/reject", post(reject))
        .route("/img/{name}", get(image))
        .route("/missing/{name}", get(|| async { StatusCode::NOT_FOUND }))
        .route("/slow", get(slow))
        .route("/snapshot/{mode}", get(snapshot))
        .route("/reload", post(reload))
        .route(
            "/reload-fail",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        )
        .with_state(captured.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockServer { addr, captured }
}

/// Delivery settings with tiny jitter so tests do not wait seconds per message.
pub fn fast_delivery() -> DeliveryConfig {
    DeliveryConfig {
        min_delay_ms: 5,
        max_delay_ms: 10,
        timeout_secs: 5,
    }
}

pub fn media_config(timeout_secs: u64) -> MediaConfig {
    MediaConfig {
        timeout_secs,
        ..MediaConfig::default()
    }
}
