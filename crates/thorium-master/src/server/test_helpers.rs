//! Shared setup for HTTP route tests.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use thorium_core::config::SchedulerConfig;
use thorium_core::wire::{NewGameServer, NewGameServerResponse};
use tokio::net::TcpListener;
use tower::ServiceExt;

use super::routes::{AppState, build_router};
use crate::auth::TokenAuthority;
use crate::session::{SessionCache, SessionStore};
use crate::storage::MasterDatabase;

/// Listen port every fake worker reports for its game servers.
pub const GAME_PORT: u16 = 10100;

/// Build a router over an in-memory database and a fresh key pair.
pub async fn test_app() -> Router {
    let db = MasterDatabase::open_in_memory().await.unwrap();
    let tokens = Arc::new(TokenAuthority::generate().unwrap());
    let sessions = SessionStore::new(SessionCache::new(), Duration::from_secs(300));
    let config = SchedulerConfig {
        worker_timeout_secs: 2,
        ..SchedulerConfig::default()
    };
    let state = AppState::new(&db, &tokens, &sessions, config).unwrap();
    build_router(state)
}

/// Spawn a worker that accepts every launch, returning its port.
pub async fn spawn_accepting_worker() -> u16 {
    async fn launch(Json(req): Json<NewGameServer>) -> Json<NewGameServerResponse> {
        Json(NewGameServerResponse {
            machine_key: req.machine_key,
            listen_port: GAME_PORT,
        })
    }

    let app = Router::new().route("/games", post(launch));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

/// Send a request and collect the status and body text.
pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, String) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "127.0.0.1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Register an account and return its session key.
pub async fn register_client(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/clients/register",
            &serde_json::json!({"username": username, "password": "hunter22"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    json["sessionKey"].as_str().unwrap().to_string()
}

/// Register a machine whose service port is `worker_port`, returning
/// `(machine id, machine key)`.
pub async fn register_machine(app: &Router, worker_port: u16) -> (i64, String) {
    let (status, body) = send(
        app,
        post_json(
            "/machines/register",
            &serde_json::json!({"serviceListenPort": worker_port}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    (
        json["machineId"].as_i64().unwrap(),
        json["machineKey"].as_str().unwrap().to_string(),
    )
}
