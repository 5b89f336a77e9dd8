//! Read-side views over rooms and their active members.
//!
//! Each view is assembled from one read transaction so the member list, the
//! count and the full flag always agree with each other.

use crate::{
    map_row_to_room, Room, RoomDetail, RoomError, RoomParticipant, RoomSummary, Topic,
    UserProfile, ROOM_COLUMNS,
};
use orca_types::{RoomStatus, MAX_PARTICIPANTS};
use rusqlite::{Connection, OptionalExtension, Row};

const ANONYMOUS: &str = "Anonymous";
const DEFAULT_LANG: &str = "en";

fn map_row_to_participant(row: &Row) -> rusqlite::Result<RoomParticipant> {
    let user_id: String = row.get(1)?;
    let name: Option<String> = row.get(4)?;
    let lang: Option<String> = row.get(6)?;
    Ok(RoomParticipant {
        participant_id: row.get(0)?,
        is_muted: row.get(2)?,
        joined_at: row.get(3)?,
        user: UserProfile {
            id: user_id.clone(),
            name: name.unwrap_or_else(|| ANONYMOUS.to_string()),
            image: row.get(5)?,
            lang: lang.unwrap_or_else(|| DEFAULT_LANG.to_string()),
        },
        user_id,
    })
}

fn active_participants(
    conn: &Connection,
    room_id: &str,
) -> Result<Vec<RoomParticipant>, RoomError> {
    let mut stmt = conn.prepare_cached(
        "SELECT rp.id, rp.user_id, rp.is_muted, rp.joined_at, u.name, u.image, u.native_language
         FROM room_participants rp
         INNER JOIN users u ON u.id = rp.user_id
         WHERE rp.room_id = ?1 AND rp.is_active = 1
         ORDER BY rp.joined_at ASC, rp.id ASC",
    )?;
    let participants = stmt
        .query_map([room_id], map_row_to_participant)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(participants)
}

fn host_profile(conn: &Connection, host_id: &str) -> Result<UserProfile, RoomError> {
    let profile = conn
        .query_row(
            "SELECT name, image, native_language FROM users WHERE id = ?1",
            [host_id],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    let (name, image, lang) = profile.unwrap_or_default();
    Ok(UserProfile {
        id: host_id.to_string(),
        name: name.unwrap_or_else(|| ANONYMOUS.to_string()),
        image,
        lang: lang.unwrap_or_else(|| DEFAULT_LANG.to_string()),
    })
}

/// Active rooms for a topic, newest first.
pub fn list_rooms_by_topic(
    conn: &Connection,
    topic_id: &str,
) -> Result<Vec<RoomSummary>, RoomError> {
    let tx = conn.unchecked_transaction()?;

    let rooms: Vec<Room> = {
        let mut stmt = tx.prepare(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms
             WHERE topic_id = ?1 AND status = ?2
             ORDER BY started_at DESC, id ASC"
        ))?;
        let rows = stmt.query_map([topic_id, RoomStatus::Active.as_str()], map_row_to_room)?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let mut summaries = Vec::with_capacity(rooms.len());
    for room in rooms {
        let participants = active_participants(&tx, &room.id)?;
        let participant_count = participants.len();
        summaries.push(RoomSummary {
            room,
            participants,
            participant_count,
            is_full: participant_count >= MAX_PARTICIPANTS,
        });
    }

    tx.finish()?;
    Ok(summaries)
}

/// A room as seen by `caller_id`, or `None` if the room or its topic is gone.
pub fn get_room(
    conn: &Connection,
    room_id: &str,
    caller_id: &str,
) -> Result<Option<RoomDetail>, RoomError> {
    let tx = conn.unchecked_transaction()?;

    let Some(room) = tx
        .query_row(
            &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?1"),
            [room_id],
            map_row_to_room,
        )
        .optional()?
    else {
        return Ok(None);
    };

    let Some(topic) = tx
        .query_row(
            "SELECT id, title, emoji, description, sort_order FROM topics WHERE id = ?1",
            [&room.topic_id],
            |row| {
                Ok(Topic {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    emoji: row.get(2)?,
                    description: row.get(3)?,
                    sort_order: row.get(4)?,
                })
            },
        )
        .optional()?
    else {
        return Ok(None);
    };

    let host = host_profile(&tx, &room.host_id)?;
    let participants = active_participants(&tx, room_id)?;

    let own: Option<(bool, bool)> = tx
        .query_row(
            "SELECT is_muted, is_active FROM room_participants
             WHERE room_id = ?1 AND user_id = ?2",
            [room_id, caller_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (is_muted, is_in_room) = own.unwrap_or((false, false));

    tx.finish()?;

    let participant_count = participants.len();
    Ok(Some(RoomDetail {
        room,
        host,
        topic,
        participants,
        participant_count,
        is_full: participant_count >= MAX_PARTICIPANTS,
        max_participants: MAX_PARTICIPANTS,
        is_muted,
        is_in_room,
    }))
}

/// Topic category of an existing room.
///
/// # Errors
///
/// `NotFound` if the room does not exist.
pub fn room_topic(conn: &Connection, room_id: &str) -> Result<String, RoomError> {
    conn.query_row("SELECT topic_id FROM rooms WHERE id = ?1", [room_id], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or_else(|| RoomError::NotFound(format!("room {room_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{setup_db, start_room};
    use crate::{create_room, join_room, leave_room, toggle_mute, upsert_user, CreateRoomParams, User};

    #[test]
    fn listing_only_shows_active_rooms_of_the_topic() {
        let mut conn = setup_db();
        let travel = start_room(&mut conn, "alice");
        let music = create_room(
            &mut conn,
            "bob",
            &CreateRoomParams {
                topic_id: "music".to_string(),
                title: "Jazz".to_string(),
                discussion_topic: None,
            },
        )
        .unwrap();
        let ended = start_room(&mut conn, "carol");
        conn.execute("UPDATE rooms SET status = 'ended' WHERE id = ?1", [&ended.id])
            .unwrap();

        let rooms = list_rooms_by_topic(&conn, "travel").unwrap();
        let ids: Vec<&str> = rooms.iter().map(|s| s.room.id.as_str()).collect();
        assert_eq!(ids, vec![travel.id.as_str()]);

        let rooms = list_rooms_by_topic(&conn, "music").unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].room.id, music.id);
    }

    #[test]
    fn listing_is_newest_first() {
        let mut conn = setup_db();
        let older = start_room(&mut conn, "alice");
        let newer = start_room(&mut conn, "bob");
        conn.execute("UPDATE rooms SET started_at = 1 WHERE id = ?1", [&older.id])
            .unwrap();

        let rooms = list_rooms_by_topic(&conn, "travel").unwrap();
        assert_eq!(rooms[0].room.id, newer.id);
        assert_eq!(rooms[1].room.id, older.id);
    }

    #[test]
    fn summary_counts_only_active_members() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        join_room(&mut conn, &room.id, "bob").unwrap();
        join_room(&mut conn, &room.id, "carol").unwrap();
        leave_room(&mut conn, &room.id, "bob").unwrap();

        let rooms = list_rooms_by_topic(&conn, "travel").unwrap();
        let summary = &rooms[0];
        assert_eq!(summary.participant_count, 2);
        assert_eq!(summary.participants.len(), 2);
        assert!(!summary.is_full);
        assert!(summary.participants.iter().all(|p| p.user_id != "bob"));
    }

    #[test]
    fn summary_reports_full_room() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        for user in ["bob", "carol", "dave", "erin"] {
            join_room(&mut conn, &room.id, user).unwrap();
        }
        let rooms = list_rooms_by_topic(&conn, "travel").unwrap();
        assert!(rooms[0].is_full);
        assert_eq!(rooms[0].participant_count, MAX_PARTICIPANTS);
    }

    #[test]
    fn detail_reflects_caller_membership() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        join_room(&mut conn, &room.id, "bob").unwrap();
        toggle_mute(&conn, &room.id, "bob").unwrap();

        let as_bob = get_room(&conn, &room.id, "bob").unwrap().unwrap();
        assert!(as_bob.is_in_room);
        assert!(as_bob.is_muted);
        assert_eq!(as_bob.host.name, "Alice");
        assert_eq!(as_bob.topic.id, "travel");
        assert_eq!(as_bob.max_participants, 5);
        assert_eq!(as_bob.participant_count, 2);

        let as_carol = get_room(&conn, &room.id, "carol").unwrap().unwrap();
        assert!(!as_carol.is_in_room);
        assert!(!as_carol.is_muted);
    }

    #[test]
    fn detail_of_left_member_keeps_mute_but_not_presence() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        join_room(&mut conn, &room.id, "bob").unwrap();
        toggle_mute(&conn, &room.id, "bob").unwrap();
        leave_room(&mut conn, &room.id, "bob").unwrap();

        let detail = get_room(&conn, &room.id, "bob").unwrap().unwrap();
        assert!(!detail.is_in_room);
        assert!(detail.is_muted);
    }

    #[test]
    fn room_topic_resolves_existing_rooms_only() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        assert_eq!(room_topic(&conn, &room.id).unwrap(), "travel");
        assert!(matches!(
            room_topic(&conn, "nope"),
            Err(RoomError::NotFound(_))
        ));
    }

    #[test]
    fn missing_room_is_none() {
        let conn = setup_db();
        assert!(get_room(&conn, "missing", "alice").unwrap().is_none());
    }

    #[test]
    fn profile_fallbacks_apply() {
        let mut conn = setup_db();
        upsert_user(
            &conn,
            &User {
                id: "ghost".to_string(),
                ..User::default()
            },
        )
        .unwrap();
        let room = start_room(&mut conn, "ghost");

        let detail = get_room(&conn, &room.id, "ghost").unwrap().unwrap();
        assert_eq!(detail.host.name, "Anonymous");
        assert_eq!(detail.host.lang, "en");
        assert_eq!(detail.participants[0].user.name, "Anonymous");
    }

    #[test]
    fn detail_serializes_camel_case_with_flattened_room() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        let detail = get_room(&conn, &room.id, "alice").unwrap().unwrap();

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["id"], room.id);
        assert_eq!(json["hostId"], "alice");
        assert_eq!(json["status"], "active");
        assert_eq!(json["isInRoom"], true);
        assert_eq!(json["maxParticipants"], 5);
        assert_eq!(json["participants"][0]["user"]["name"], "Alice");
    }
}
