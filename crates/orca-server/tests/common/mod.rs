#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use orca_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use orca_rooms::User;
use orca_server::{agents::AgentSupervisor, app, AppState};
use orca_voice::{LiveKitConfig, VoiceService};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const USERS: [&str; 7] = ["alice", "bob", "carol", "dave", "erin", "frank", "grace"];

/// In-memory pool with migrations applied and [`USERS`] seeded.
pub fn test_pool() -> DbPool {
    let pool = create_pool(
        ":memory:",
        DbRuntimeSettings {
            busy_timeout_ms: 5_000,
            pool_max_size: 1,
        },
    )
    .unwrap();
    let conn = pool.get().unwrap();
    run_migrations(&conn).unwrap();
    for id in USERS {
        let mut name = id.to_string();
        name[..1].make_ascii_uppercase();
        orca_rooms::upsert_user(
            &conn,
            &User {
                id: id.to_string(),
                name: Some(name),
                native_language: Some("en".to_string()),
                learning_language: Some("fr".to_string()),
                ..User::default()
            },
        )
        .unwrap();
    }
    pool
}

pub fn voice_service() -> Arc<VoiceService> {
    Arc::new(VoiceService::new(LiveKitConfig::dev()))
}

/// State with the moderator agent disabled.
pub fn test_state() -> AppState {
    let voice = voice_service();
    AppState::new(test_pool(), Arc::clone(&voice), AgentSupervisor::disabled(voice))
}

pub fn test_app() -> Router {
    app(test_state())
}

/// Sends one request and decodes the JSON body (`Null` when empty).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("X-Orca-User", user);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Creates a travel room hosted by `host` and returns its id.
pub async fn create_room(app: &Router, host: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/rooms",
        Some(host),
        Some(serde_json::json!({ "topicId": "travel", "title": "Weekend trips" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["roomId"].as_str().unwrap().to_string()
}
