#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use chrono::TimeZone;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use waitlist_server::utils::ManualClock;
use waitlist_server::{Config, ServerState};

pub const NOODLE_BAR: i64 = 1;
pub const OWNER: i64 = 9;
pub const ALICE: i64 = 100;
pub const BOB: i64 = 101;
pub const CAROL: i64 = 102;

/// 2026-10-18 12:00 in Seoul
pub fn noon_seoul() -> i64 {
    chrono::Utc
        .with_ymd_and_hms(2026, 10, 18, 3, 0, 0)
        .unwrap()
        .timestamp_millis()
}

/// Work dir with a directory seed file
pub fn work_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let seed = json!({
        "members": [
            { "id": OWNER, "nickname": "owner" },
            { "id": ALICE, "nickname": "alice" },
            { "id": BOB, "nickname": "bob" },
            { "id": CAROL, "nickname": "carol" }
        ],
        "restaurants": [
            { "id": NOODLE_BAR, "name": "Noodle Bar", "ownerId": OWNER, "timezone": "Asia/Seoul" }
        ]
    });
    std::fs::write(dir.path().join("directory.json"), seed.to_string()).unwrap();
    dir
}

pub fn config_for(dir: &TempDir) -> Config {
    let mut config = Config::with_work_dir(dir.path().to_string_lossy().to_string());
    config.directory_seed_path = Some(
        dir.path()
            .join("directory.json")
            .to_string_lossy()
            .to_string(),
    );
    config
}

pub async fn state_for(dir: &TempDir, clock: Arc<ManualClock>) -> ServerState {
    ServerState::initialize_with_clock(&config_for(dir), clock)
        .await
        .unwrap()
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    member: Option<i64>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = member {
        builder = builder.header("X-Member-Id", id.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
