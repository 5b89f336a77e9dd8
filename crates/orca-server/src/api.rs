//! Error mapping and shared handler plumbing.

use crate::AppState;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use orca_rooms::{RoomError, Topic};
use orca_voice::VoiceError;
use rusqlite::Connection;
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes and machine-readable codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    NotAuthenticated,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("room is full")]
    RoomFull,
    #[error("room is not available")]
    NotAvailable,
    #[error("you are not in this room")]
    NotInRoom,
    #[error("missing required fields: {0}")]
    MissingFields(String),
    #[error("failed to issue a voice credential")]
    TokenIssuance,
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotAuthenticated => "not_authenticated",
            ApiError::NotFound(_) => "not_found",
            ApiError::RoomFull => "room_full",
            ApiError::NotAvailable => "not_available",
            ApiError::NotInRoom => "not_in_room",
            ApiError::MissingFields(_) => "missing_fields",
            ApiError::TokenIssuance => "token_issuance_failed",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RoomFull | ApiError::NotAvailable | ApiError::NotInRoom => {
                StatusCode::CONFLICT
            }
            ApiError::MissingFields(_) => StatusCode::BAD_REQUEST,
            ApiError::TokenIssuance | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the logs.
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(serde_json::json!({
            "error": self.code(),
            "message": message,
        }));

        (status, body).into_response()
    }
}

impl From<RoomError> for ApiError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::NotFound(what) => ApiError::NotFound(what),
            RoomError::NotAvailable(_) => ApiError::NotAvailable,
            RoomError::RoomFull { .. } => ApiError::RoomFull,
            RoomError::NotInRoom(_) => ApiError::NotInRoom,
            RoomError::Database(e) => ApiError::Internal(format!("database error: {e}")),
        }
    }
}

impl From<VoiceError> for ApiError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::MissingField(field) => ApiError::MissingFields(field.to_string()),
            other => {
                tracing::error!(error = %other, "credential issuance failed");
                ApiError::TokenIssuance
            }
        }
    }
}

/// Runs blocking database work on the blocking pool with a pooled connection.
pub(crate) async fn with_conn<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, ApiError> + Send + 'static,
{
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| ApiError::Internal(format!("db connection failed: {e}")))?;
        work(&mut conn)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("task join error: {e}")))?
}

/// Handler for `GET /api/topics`.
pub async fn list_topics_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Topic>>, ApiError> {
    let topics = with_conn(&state, |conn| Ok(orca_rooms::list_topics(conn)?)).await?;
    Ok(Json(topics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_are_conflicts() {
        for err in [
            RoomError::RoomFull {
                room_id: "r".to_string(),
                max: 5,
            },
            RoomError::NotAvailable("r".to_string()),
            RoomError::NotInRoom("r".to_string()),
        ] {
            assert_eq!(ApiError::from(err).status(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn voice_errors_split_client_and_server_faults() {
        let missing = ApiError::from(VoiceError::MissingField("userId"));
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        assert_eq!(missing.code(), "missing_fields");

        let config = ApiError::from(VoiceError::Config("secret=hunter2".to_string()));
        assert_eq!(config.code(), "token_issuance_failed");
        assert!(!config.to_string().contains("hunter2"));
    }
}
