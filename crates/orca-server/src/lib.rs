//! Orca rooms HTTP server library logic.

pub mod agents;
pub mod api;
pub mod api_rooms;
pub mod api_sse;
pub mod api_token;
pub mod config;
pub mod middleware;

use agents::AgentSupervisor;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use orca_db::DbPool;
use orca_types::RoomEvent;
use orca_voice::VoiceService;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Capacity of the room event channel. Slow SSE subscribers past this lag.
pub const ROOM_EVENT_BUFFER: usize = 256;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Media transport credentials and room service.
    pub voice_service: Arc<VoiceService>,
    /// Moderator agents of live rooms.
    pub agents: AgentSupervisor,
    /// Broadcast channel for committed room changes (SSE stream).
    pub room_events_tx: broadcast::Sender<RoomEvent>,
}

impl AppState {
    /// State with a fresh event channel.
    pub fn new(pool: DbPool, voice_service: Arc<VoiceService>, agents: AgentSupervisor) -> Self {
        let (room_events_tx, _) = broadcast::channel(ROOM_EVENT_BUFFER);
        Self {
            pool,
            voice_service,
            agents,
            room_events_tx,
        }
    }
}

/// Maximum request body size (64 KiB). Every request body is a small JSON object.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/api/topics/{topicId}/rooms",
            get(api_rooms::list_rooms_handler),
        )
        .route("/api/rooms", post(api_rooms::create_room_handler))
        .route("/api/rooms/{roomId}", get(api_rooms::get_room_handler))
        .route(
            "/api/rooms/{roomId}/join",
            post(api_rooms::join_room_handler),
        )
        .route(
            "/api/rooms/{roomId}/leave",
            post(api_rooms::leave_room_handler),
        )
        .route(
            "/api/rooms/{roomId}/mute",
            post(api_rooms::toggle_mute_handler),
        )
        .layer(axum::middleware::from_fn(middleware::auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/api/topics", get(api::list_topics_handler))
        .route("/api/rooms/token", post(api_token::issue_token_handler))
        .route("/events/rooms", get(api_sse::get_room_stream_handler))
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
