//! Room store and membership controller for the Orca room engine.
//!
//! Rooms are capacity-bounded voice discussions scoped to a topic category.
//! This crate owns every write to the `rooms` and `room_participants` tables:
//! admission under the capacity limit, soft leave, host failover, empty-room
//! deletion, and the persisted mute intent.
//!
//! Every operation that reads the active-member count and then writes based on
//! it runs inside one `BEGIN IMMEDIATE` transaction. SQLite hands out the
//! writer lock before the first read, so two joins racing for the last seat
//! are serialized and the second one observes the first one's row.

mod directory;
mod membership;
mod queries;

pub use directory::{get_topic, get_user, list_topics, upsert_user};
pub use membership::{create_room, join_room, leave_room, toggle_mute};
pub use queries::{get_room, list_rooms_by_topic, room_topic};

use orca_types::RoomStatus;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during room operations.
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// The room, topic or user does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The room is missing or no longer active.
    #[error("room not available: {0}")]
    NotAvailable(String),
    #[error("room {room_id} is full (max {max} participants)")]
    RoomFull { room_id: String, max: usize },
    /// The caller has no usable membership in the room.
    #[error("not in room: {0}")]
    NotInRoom(String),
}

/// A persisted room record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub title: String,
    /// Free-text subject chosen by the host.
    pub discussion_topic: Option<String>,
    /// Topic category the room is listed under.
    pub topic_id: String,
    pub host_id: String,
    pub status: RoomStatus,
    /// Unix epoch milliseconds.
    pub started_at: i64,
    pub ended_at: Option<i64>,
}

/// One user's membership row in one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: i64,
    pub room_id: String,
    pub user_id: String,
    pub is_muted: bool,
    pub is_active: bool,
    /// Unix epoch milliseconds.
    pub joined_at: i64,
}

/// A user as known to the profile store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub native_language: Option<String>,
    pub learning_language: Option<String>,
}

/// A topic category rooms are grouped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub title: String,
    pub emoji: String,
    pub description: String,
    pub sort_order: i64,
}

/// Display fields of a user, with fallbacks for unset profile values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub lang: String,
}

/// An active member of a room joined with their profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomParticipant {
    pub participant_id: i64,
    pub user_id: String,
    pub is_muted: bool,
    pub joined_at: i64,
    pub user: UserProfile,
}

/// A room as shown in a topic listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    #[serde(flatten)]
    pub room: Room,
    pub participants: Vec<RoomParticipant>,
    pub participant_count: usize,
    pub is_full: bool,
}

/// A single room as seen by one caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetail {
    #[serde(flatten)]
    pub room: Room,
    pub host: UserProfile,
    pub topic: Topic,
    pub participants: Vec<RoomParticipant>,
    pub participant_count: usize,
    pub is_full: bool,
    pub max_participants: usize,
    /// The caller's own persisted mute intent.
    pub is_muted: bool,
    /// Whether the caller is currently an active member.
    pub is_in_room: bool,
}

/// Parameters for starting a new room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomParams {
    pub topic_id: String,
    pub title: String,
    pub discussion_topic: Option<String>,
}

/// What a successful join did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// A new membership row was inserted.
    Inserted,
    /// An inactive row was reactivated.
    Reactivated,
    /// The caller was already active; nothing changed.
    AlreadyActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOutcome {
    pub participant_id: i64,
    pub kind: JoinKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveOutcome {
    /// The caller was the last active member and the room is gone.
    pub room_deleted: bool,
    /// Set when the caller was host and ownership moved.
    pub new_host: Option<String>,
    /// Topic of the room, so callers can address the transport room.
    pub topic_id: String,
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) const ROOM_COLUMNS: &str =
    "id, title, discussion_topic, topic_id, host_id, status, started_at, ended_at";

pub(crate) fn map_row_to_room(row: &Row) -> rusqlite::Result<Room> {
    let status_str: String = row.get(5)?;
    let status = status_str.parse::<RoomStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Room {
        id: row.get(0)?,
        title: row.get(1)?,
        discussion_topic: row.get(2)?,
        topic_id: row.get(3)?,
        host_id: row.get(4)?,
        status,
        started_at: row.get(6)?,
        ended_at: row.get(7)?,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use rusqlite::Connection;

    pub fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().expect("failed to open in-memory db");
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .expect("failed to enable foreign keys");
        orca_db::run_migrations(&conn).expect("failed to run migrations");
        for (id, name) in [
            ("alice", "Alice"),
            ("bob", "Bob"),
            ("carol", "Carol"),
            ("dave", "Dave"),
            ("erin", "Erin"),
            ("frank", "Frank"),
        ] {
            upsert_user(
                &conn,
                &User {
                    id: id.to_string(),
                    name: Some(name.to_string()),
                    ..User::default()
                },
            )
            .expect("failed to seed user");
        }
        conn
    }

    pub fn start_room(conn: &mut Connection, host: &str) -> Room {
        create_room(
            conn,
            host,
            &CreateRoomParams {
                topic_id: "travel".to_string(),
                title: "Weekend trips".to_string(),
                discussion_topic: Some("Cheap flights".to_string()),
            },
        )
        .expect("create room failed")
    }
}
