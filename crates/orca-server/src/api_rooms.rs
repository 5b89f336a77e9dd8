//! Room lifecycle handlers: listing, creation, membership and mute intent.

use crate::api::{with_conn, ApiError};
use crate::middleware::AuthUser;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
};
use orca_rooms::{CreateRoomParams, JoinKind, RoomDetail, RoomSummary};
use orca_types::RoomEvent;
use orca_voice::transport_room_name;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of `POST /api/rooms`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub topic_id: String,
    #[serde(default)]
    pub title: String,
    /// Free-text discussion subject.
    pub topic: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResponse {
    pub participant_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomResponse {
    pub success: bool,
    pub room_deleted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteResponse {
    pub is_muted: bool,
}

/// Sends a room event to SSE subscribers. Having none is not an error.
pub(crate) fn publish(state: &AppState, event: RoomEvent) {
    if let Err(e) = state.room_events_tx.send(event) {
        tracing::debug!(room_id = %e.0.room_id(), "no room event subscribers");
    }
}

/// Handler for `GET /api/topics/{topicId}/rooms`.
pub async fn list_rooms_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(topic_id): Path<String>,
) -> Result<Json<Vec<RoomSummary>>, ApiError> {
    let rooms = with_conn(&state, move |conn| {
        Ok(orca_rooms::list_rooms_by_topic(conn, &topic_id)?)
    })
    .await?;
    Ok(Json(rooms))
}

/// Handler for `POST /api/rooms`.
pub async fn create_room_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(body): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), ApiError> {
    let mut missing = Vec::new();
    if body.topic_id.trim().is_empty() {
        missing.push("topicId");
    }
    if body.title.trim().is_empty() {
        missing.push("title");
    }
    if !missing.is_empty() {
        return Err(ApiError::MissingFields(missing.join(", ")));
    }

    let params = CreateRoomParams {
        topic_id: body.topic_id,
        title: body.title.trim().to_string(),
        discussion_topic: body.topic.filter(|t| !t.trim().is_empty()),
    };
    let host_id = user.id.clone();
    let room = with_conn(&state, move |conn| {
        Ok(orca_rooms::create_room(conn, &host_id, &params)?)
    })
    .await?;

    publish(
        &state,
        RoomEvent::RoomCreated {
            room_id: room.id.clone(),
            topic_id: room.topic_id.clone(),
            host_id: room.host_id.clone(),
        },
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse { room_id: room.id }),
    ))
}

/// Handler for `GET /api/rooms/{roomId}`.
pub async fn get_room_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDetail>, ApiError> {
    let lookup_id = room_id.clone();
    let detail = with_conn(&state, move |conn| {
        Ok(orca_rooms::get_room(conn, &lookup_id, &user.id)?)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("room {room_id}")))?;
    Ok(Json(detail))
}

/// Handler for `POST /api/rooms/{roomId}/join`.
pub async fn join_room_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<Json<JoinRoomResponse>, ApiError> {
    let outcome = with_conn(&state, {
        let room_id = room_id.clone();
        let user_id = user.id.clone();
        move |conn| Ok(orca_rooms::join_room(conn, &room_id, &user_id)?)
    })
    .await?;

    if outcome.kind != JoinKind::AlreadyActive {
        tracing::info!(room_id = %room_id, user_id = %user.id, kind = ?outcome.kind, "participant joined");
        publish(
            &state,
            RoomEvent::ParticipantJoined {
                room_id,
                user_id: user.id,
            },
        );
    }

    Ok(Json(JoinRoomResponse {
        participant_id: outcome.participant_id,
    }))
}

/// Handler for `POST /api/rooms/{roomId}/leave`.
///
/// After the persisted leave commits, the caller is also dropped from the
/// live transport room. When the room is gone its transport room and agent
/// are torn down as well. Transport failures are logged and do not fail the
/// request.
pub async fn leave_room_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<Json<LeaveRoomResponse>, ApiError> {
    let outcome = with_conn(&state, {
        let room_id = room_id.clone();
        let user_id = user.id.clone();
        move |conn| Ok(orca_rooms::leave_room(conn, &room_id, &user_id)?)
    })
    .await?;

    let transport_room = transport_room_name(&outcome.topic_id, &room_id);
    state.agents.participant_left(&transport_room, &user.id);

    if outcome.room_deleted {
        tracing::info!(room_id = %room_id, "last participant left, room deleted");
        state.agents.stop(&transport_room);
        spawn_transport_cleanup(&state, transport_room, None);
        publish(
            &state,
            RoomEvent::RoomDeleted {
                room_id: room_id.clone(),
                topic_id: outcome.topic_id.clone(),
            },
        );
    } else {
        spawn_transport_cleanup(&state, transport_room, Some(user.id.clone()));
        publish(
            &state,
            RoomEvent::ParticipantLeft {
                room_id: room_id.clone(),
                user_id: user.id.clone(),
            },
        );
        if let Some(host_id) = &outcome.new_host {
            tracing::info!(room_id = %room_id, host_id = %host_id, "host reassigned");
            publish(
                &state,
                RoomEvent::HostChanged {
                    room_id: room_id.clone(),
                    host_id: host_id.clone(),
                },
            );
        }
    }

    Ok(Json(LeaveRoomResponse {
        success: true,
        room_deleted: outcome.room_deleted,
    }))
}

fn spawn_transport_cleanup(state: &AppState, transport_room: String, identity: Option<String>) {
    let voice = Arc::clone(&state.voice_service);
    tokio::spawn(async move {
        let result = match &identity {
            Some(identity) => voice.remove_participant(&transport_room, identity).await,
            None => voice.delete_room(&transport_room).await,
        };
        if let Err(e) = result {
            tracing::debug!(
                room_name = %transport_room,
                identity = identity.as_deref().unwrap_or("*"),
                error = %e,
                "transport cleanup skipped"
            );
        }
    });
}

/// Handler for `POST /api/rooms/{roomId}/mute`.
pub async fn toggle_mute_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<Json<MuteResponse>, ApiError> {
    let is_muted = with_conn(&state, {
        let room_id = room_id.clone();
        let user_id = user.id.clone();
        move |conn| Ok(orca_rooms::toggle_mute(conn, &room_id, &user_id)?)
    })
    .await?;

    publish(
        &state,
        RoomEvent::MuteChanged {
            room_id,
            user_id: user.id,
            is_muted,
        },
    );
    Ok(Json(MuteResponse { is_muted }))
}
