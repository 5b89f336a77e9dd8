//! Shared types and constants for the Orca room engine.
//!
//! This crate holds the vocabulary every other crate speaks: room status,
//! the participant capacity limit, the room event stream payloads, the agent
//! metadata contract, and voice profile definitions. It has no knowledge of
//! storage or transport.
//!
//! No crate in the workspace depends on anything *except* `orca-types` for
//! cross-cutting type definitions. This keeps the dependency graph acyclic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod agent;
pub mod voice;

pub use agent::{AgentConfig, AgentMetadata, MetadataError};

/// Hard limit on simultaneously active members of one room.
pub const MAX_PARTICIPANTS: usize = 5;

/// Lifecycle status of a room record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// The room is open for joins.
    Active,
    /// The room has finished. Empty rooms are deleted rather than ended.
    Ended,
}

impl RoomStatus {
    /// Returns the storage label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown room status: {0}")]
pub struct UnknownRoomStatus(pub String);

impl FromStr for RoomStatus {
    type Err = UnknownRoomStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            other => Err(UnknownRoomStatus(other.to_string())),
        }
    }
}

/// Room-level change notifications pushed to subscribed clients.
///
/// Every event is emitted after the transaction that caused it committed, so
/// a client never observes an event for state that was rolled back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// A room was started by its host.
    RoomCreated {
        room_id: String,
        topic_id: String,
        host_id: String,
    },
    /// A user became an active member (first join or rejoin).
    ParticipantJoined { room_id: String, user_id: String },
    /// A user left a room that still has other members.
    ParticipantLeft { room_id: String, user_id: String },
    /// Ownership moved to another active member.
    HostChanged { room_id: String, host_id: String },
    /// A member's persisted mute intent changed.
    MuteChanged {
        room_id: String,
        user_id: String,
        is_muted: bool,
    },
    /// The last member left and the room was removed.
    RoomDeleted { room_id: String, topic_id: String },
}

impl RoomEvent {
    /// The room this event concerns.
    pub fn room_id(&self) -> &str {
        match self {
            Self::RoomCreated { room_id, .. }
            | Self::ParticipantJoined { room_id, .. }
            | Self::ParticipantLeft { room_id, .. }
            | Self::HostChanged { room_id, .. }
            | Self::MuteChanged { room_id, .. }
            | Self::RoomDeleted { room_id, .. } => room_id,
        }
    }
}
