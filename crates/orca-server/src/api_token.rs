//! Voice credential issuance.

use crate::api::{with_conn, ApiError};
use crate::AppState;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
};
use orca_rooms::RoomError;
use orca_voice::CredentialRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of `POST /api/rooms/token`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenRequest {
    pub room_id: String,
    pub topic_id: Option<String>,
    pub user_id: String,
    pub user_name: String,
    /// Opaque JSON string handed to the moderator agent.
    pub participant_metadata: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub server_url: String,
    pub token: String,
    pub room_name: String,
}

/// Handler for `POST /api/rooms/token`.
///
/// The caller's identity comes from the body; the route sits outside the
/// authenticated router. For a persisted room the transport room is scoped by
/// the stored topic and any `topicId` in the body is ignored; only unknown
/// rooms use the body's `topicId`. Rooms that exist get a moderator agent on
/// first issuance.
pub async fn issue_token_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<TokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let mut missing = Vec::new();
    if body.room_id.trim().is_empty() {
        missing.push("roomId");
    }
    if body.user_id.trim().is_empty() {
        missing.push("userId");
    }
    if body.user_name.trim().is_empty() {
        missing.push("userName");
    }
    if !missing.is_empty() {
        return Err(ApiError::MissingFields(missing.join(", ")));
    }

    let persisted_topic = with_conn(&state, {
        let room_id = body.room_id.clone();
        move |conn| match orca_rooms::room_topic(conn, &room_id) {
            Ok(topic_id) => Ok(Some(topic_id)),
            Err(RoomError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    })
    .await?;

    // Persisted rooms are always scoped by their stored topic.
    let topic_id = persisted_topic
        .clone()
        .or_else(|| body.topic_id.filter(|t| !t.trim().is_empty()));

    let request = CredentialRequest {
        room_id: body.room_id,
        topic_id,
        user_id: body.user_id,
        user_name: body.user_name,
        metadata: body.participant_metadata.filter(|m| !m.is_empty()),
    };

    let credential = state.voice_service.issue(&request)?;
    tracing::info!(
        room_name = %credential.room_name,
        user_id = %request.user_id,
        "voice credential issued"
    );

    if persisted_topic.is_some() {
        state.agents.participant_joined(&request, &credential);
    }

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            server_url: credential.endpoint,
            token: credential.token,
            room_name: credential.room_name,
        }),
    ))
}
