//! Admission, departure, host failover and mute intent.

use crate::{
    map_row_to_room, now_millis, CreateRoomParams, JoinKind, JoinOutcome, LeaveOutcome, Room,
    RoomError, ROOM_COLUMNS,
};
use orca_types::{RoomStatus, MAX_PARTICIPANTS};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

/// Starts a room with `host_id` as host and first active, unmuted member.
///
/// # Errors
///
/// `NotFound` if the topic or the host user does not exist.
pub fn create_room(
    conn: &mut Connection,
    host_id: &str,
    params: &CreateRoomParams,
) -> Result<Room, RoomError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let topic_exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM topics WHERE id = ?1)",
        [&params.topic_id],
        |row| row.get(0),
    )?;
    if !topic_exists {
        return Err(RoomError::NotFound(format!("topic {}", params.topic_id)));
    }

    let user_exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [host_id],
        |row| row.get(0),
    )?;
    if !user_exists {
        return Err(RoomError::NotFound(format!("user {host_id}")));
    }

    let room = Room {
        id: uuid::Uuid::new_v4().to_string(),
        title: params.title.clone(),
        discussion_topic: params.discussion_topic.clone(),
        topic_id: params.topic_id.clone(),
        host_id: host_id.to_string(),
        status: RoomStatus::Active,
        started_at: now_millis(),
        ended_at: None,
    };

    tx.execute(
        "INSERT INTO rooms (id, title, discussion_topic, topic_id, host_id, status, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            room.id,
            room.title,
            room.discussion_topic,
            room.topic_id,
            room.host_id,
            room.status.as_str(),
            room.started_at,
        ],
    )?;
    tx.execute(
        "INSERT INTO room_participants (room_id, user_id, is_muted, is_active, joined_at)
         VALUES (?1, ?2, 0, 1, ?3)",
        params![room.id, host_id, room.started_at],
    )?;

    tx.commit()?;

    tracing::info!(room_id = %room.id, topic_id = %room.topic_id, host_id, "room created");
    Ok(room)
}

/// Admits `user_id` into an active room.
///
/// A user who left earlier gets their old row back (unmuted, with a fresh
/// `joined_at`); a user who is already active is a no-op. The seat count is
/// checked inside the same transaction as the write that takes the seat.
///
/// # Errors
///
/// `NotAvailable` if the room is missing or not active, `RoomFull` if all
/// seats are taken.
pub fn join_room(
    conn: &mut Connection,
    room_id: &str,
    user_id: &str,
) -> Result<JoinOutcome, RoomError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let status: Option<String> = tx
        .query_row("SELECT status FROM rooms WHERE id = ?1", [room_id], |row| {
            row.get(0)
        })
        .optional()?;
    if status.as_deref() != Some(RoomStatus::Active.as_str()) {
        return Err(RoomError::NotAvailable(room_id.to_string()));
    }

    let existing: Option<(i64, bool)> = tx
        .query_row(
            "SELECT id, is_active FROM room_participants WHERE room_id = ?1 AND user_id = ?2",
            [room_id, user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let outcome = match existing {
        Some((participant_id, true)) => JoinOutcome {
            participant_id,
            kind: JoinKind::AlreadyActive,
        },
        Some((participant_id, false)) => {
            ensure_seat_available(&tx, room_id)?;
            tx.execute(
                "UPDATE room_participants SET is_active = 1, is_muted = 0, joined_at = ?1
                 WHERE id = ?2",
                params![now_millis(), participant_id],
            )?;
            JoinOutcome {
                participant_id,
                kind: JoinKind::Reactivated,
            }
        }
        None => {
            ensure_seat_available(&tx, room_id)?;
            tx.execute(
                "INSERT INTO room_participants (room_id, user_id, is_muted, is_active, joined_at)
                 VALUES (?1, ?2, 0, 1, ?3)",
                params![room_id, user_id, now_millis()],
            )?;
            JoinOutcome {
                participant_id: tx.last_insert_rowid(),
                kind: JoinKind::Inserted,
            }
        }
    };

    tx.commit()?;

    tracing::debug!(room_id, user_id, kind = ?outcome.kind, "joined room");
    Ok(outcome)
}

fn active_member_count(conn: &Connection, room_id: &str) -> Result<usize, RoomError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM room_participants WHERE room_id = ?1 AND is_active = 1",
        [room_id],
        |row| row.get(0),
    )?;
    Ok(usize::try_from(count).unwrap_or(usize::MAX))
}

fn ensure_seat_available(conn: &Connection, room_id: &str) -> Result<(), RoomError> {
    if active_member_count(conn, room_id)? >= MAX_PARTICIPANTS {
        return Err(RoomError::RoomFull {
            room_id: room_id.to_string(),
            max: MAX_PARTICIPANTS,
        });
    }
    Ok(())
}

/// Removes `user_id` from the room's active members.
///
/// If nobody else is active the room and all of its membership rows are
/// deleted. Otherwise, if the caller was host, ownership passes to the
/// remaining active member with the earliest `joined_at`; equal timestamps
/// fall back to the lowest membership row id.
///
/// # Errors
///
/// `NotFound` if the room does not exist, `NotInRoom` if the caller is not an
/// active member.
pub fn leave_room(
    conn: &mut Connection,
    room_id: &str,
    user_id: &str,
) -> Result<LeaveOutcome, RoomError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let room = tx
        .query_row(
            &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?1"),
            [room_id],
            map_row_to_room,
        )
        .optional()?
        .ok_or_else(|| RoomError::NotFound(format!("room {room_id}")))?;

    let deactivated = tx.execute(
        "UPDATE room_participants SET is_active = 0
         WHERE room_id = ?1 AND user_id = ?2 AND is_active = 1",
        [room_id, user_id],
    )?;
    if deactivated == 0 {
        return Err(RoomError::NotInRoom(room_id.to_string()));
    }

    let successor: Option<String> = tx
        .query_row(
            "SELECT user_id FROM room_participants
             WHERE room_id = ?1 AND is_active = 1 AND user_id != ?2
             ORDER BY joined_at ASC, id ASC
             LIMIT 1",
            [room_id, user_id],
            |row| row.get(0),
        )
        .optional()?;

    let outcome = match successor {
        None => {
            tx.execute("DELETE FROM room_participants WHERE room_id = ?1", [room_id])?;
            tx.execute("DELETE FROM rooms WHERE id = ?1", [room_id])?;
            LeaveOutcome {
                room_deleted: true,
                new_host: None,
                topic_id: room.topic_id,
            }
        }
        Some(next_host) if room.host_id == user_id => {
            tx.execute(
                "UPDATE rooms SET host_id = ?1 WHERE id = ?2",
                [next_host.as_str(), room_id],
            )?;
            LeaveOutcome {
                room_deleted: false,
                new_host: Some(next_host),
                topic_id: room.topic_id,
            }
        }
        Some(_) => LeaveOutcome {
            room_deleted: false,
            new_host: None,
            topic_id: room.topic_id,
        },
    };

    tx.commit()?;

    if outcome.room_deleted {
        tracing::info!(room_id, user_id, "last member left, room deleted");
    } else if let Some(host) = &outcome.new_host {
        tracing::info!(room_id, previous_host = user_id, new_host = %host, "host reassigned");
    } else {
        tracing::debug!(room_id, user_id, "left room");
    }

    Ok(outcome)
}

/// Flips the caller's persisted mute intent and returns the new value.
///
/// This records intent only; the live track is aligned client-side.
///
/// # Errors
///
/// `NotInRoom` if the caller has no membership row in the room.
pub fn toggle_mute(conn: &Connection, room_id: &str, user_id: &str) -> Result<bool, RoomError> {
    conn.query_row(
        "UPDATE room_participants SET is_muted = NOT is_muted
         WHERE room_id = ?1 AND user_id = ?2
         RETURNING is_muted",
        [room_id, user_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| RoomError::NotInRoom(room_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{setup_db, start_room};

    fn membership_rows(conn: &Connection, room_id: &str, user_id: &str) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM room_participants WHERE room_id = ?1 AND user_id = ?2",
            [room_id, user_id],
            |row| row.get(0),
        )
        .unwrap()
    }

    fn host_of(conn: &Connection, room_id: &str) -> String {
        conn.query_row("SELECT host_id FROM rooms WHERE id = ?1", [room_id], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn create_makes_caller_host_and_first_member() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");

        assert_eq!(room.host_id, "alice");
        assert_eq!(room.status, RoomStatus::Active);
        assert_eq!(active_member_count(&conn, &room.id).unwrap(), 1);

        let muted: bool = conn
            .query_row(
                "SELECT is_muted FROM room_participants WHERE room_id = ?1",
                [&room.id],
                |row| row.get(0),
            )
            .unwrap();
        assert!(!muted);
    }

    #[test]
    fn create_rejects_unknown_topic() {
        let mut conn = setup_db();
        let err = create_room(
            &mut conn,
            "alice",
            &CreateRoomParams {
                topic_id: "astrology".to_string(),
                title: "Stars".to_string(),
                discussion_topic: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, RoomError::NotFound(_)));
    }

    #[test]
    fn sixth_join_is_rejected_without_a_row() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        for user in ["bob", "carol", "dave", "erin"] {
            join_room(&mut conn, &room.id, user).expect("seat should be free");
        }

        let err = join_room(&mut conn, &room.id, "frank").unwrap_err();
        assert!(matches!(err, RoomError::RoomFull { max: 5, .. }));
        assert_eq!(membership_rows(&conn, &room.id, "frank"), 0);
        assert_eq!(active_member_count(&conn, &room.id).unwrap(), 5);
    }

    #[test]
    fn join_unknown_room_is_not_available() {
        let mut conn = setup_db();
        let err = join_room(&mut conn, "missing", "bob").unwrap_err();
        assert!(matches!(err, RoomError::NotAvailable(_)));
    }

    #[test]
    fn join_ended_room_is_not_available() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        conn.execute("UPDATE rooms SET status = 'ended' WHERE id = ?1", [&room.id])
            .unwrap();

        let err = join_room(&mut conn, &room.id, "bob").unwrap_err();
        assert!(matches!(err, RoomError::NotAvailable(_)));
    }

    #[test]
    fn join_is_idempotent_for_active_member() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");

        let first = join_room(&mut conn, &room.id, "bob").unwrap();
        let second = join_room(&mut conn, &room.id, "bob").unwrap();

        assert_eq!(first.kind, JoinKind::Inserted);
        assert_eq!(second.kind, JoinKind::AlreadyActive);
        assert_eq!(first.participant_id, second.participant_id);
        assert_eq!(membership_rows(&conn, &room.id, "bob"), 1);
    }

    #[test]
    fn rejoin_cycles_reuse_one_row_and_reset_mute() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");

        let first = join_room(&mut conn, &room.id, "bob").unwrap();
        for _ in 0..3 {
            assert!(toggle_mute(&conn, &room.id, "bob").unwrap());
            leave_room(&mut conn, &room.id, "bob").unwrap();
            let again = join_room(&mut conn, &room.id, "bob").unwrap();
            assert_eq!(again.kind, JoinKind::Reactivated);
            assert_eq!(again.participant_id, first.participant_id);
        }

        assert_eq!(membership_rows(&conn, &room.id, "bob"), 1);
        let muted: bool = conn
            .query_row(
                "SELECT is_muted FROM room_participants WHERE room_id = ?1 AND user_id = 'bob'",
                [&room.id],
                |row| row.get(0),
            )
            .unwrap();
        assert!(!muted, "rejoin must reset mute intent");
    }

    #[test]
    fn rejoin_rechecks_capacity() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        for user in ["bob", "carol", "dave", "erin"] {
            join_room(&mut conn, &room.id, user).unwrap();
        }
        leave_room(&mut conn, &room.id, "erin").unwrap();
        join_room(&mut conn, &room.id, "frank").unwrap();

        let err = join_room(&mut conn, &room.id, "erin").unwrap_err();
        assert!(matches!(err, RoomError::RoomFull { .. }));
        assert_eq!(membership_rows(&conn, &room.id, "erin"), 1);
    }

    #[test]
    fn last_leave_deletes_room_and_rows() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        join_room(&mut conn, &room.id, "bob").unwrap();
        leave_room(&mut conn, &room.id, "bob").unwrap();

        let outcome = leave_room(&mut conn, &room.id, "alice").unwrap();
        assert!(outcome.room_deleted);
        assert_eq!(outcome.topic_id, "travel");

        let rooms: i64 = conn
            .query_row("SELECT COUNT(*) FROM rooms", [], |row| row.get(0))
            .unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM room_participants", [], |row| row.get(0))
            .unwrap();
        assert_eq!((rooms, rows), (0, 0), "inactive rows go with the room");
    }

    #[test]
    fn host_leaving_passes_ownership_to_earliest_joiner() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        join_room(&mut conn, &room.id, "bob").unwrap();
        join_room(&mut conn, &room.id, "carol").unwrap();
        // Make carol the earliest remaining joiner.
        conn.execute(
            "UPDATE room_participants SET joined_at = 0 WHERE room_id = ?1 AND user_id = 'carol'",
            [&room.id],
        )
        .unwrap();

        let outcome = leave_room(&mut conn, &room.id, "alice").unwrap();
        assert!(!outcome.room_deleted);
        assert_eq!(outcome.new_host.as_deref(), Some("carol"));
        assert_eq!(host_of(&conn, &room.id), "carol");
    }

    #[test]
    fn equal_join_times_fall_back_to_row_order() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        join_room(&mut conn, &room.id, "bob").unwrap();
        join_room(&mut conn, &room.id, "carol").unwrap();
        conn.execute(
            "UPDATE room_participants SET joined_at = 42 WHERE room_id = ?1",
            [&room.id],
        )
        .unwrap();

        let outcome = leave_room(&mut conn, &room.id, "alice").unwrap();
        assert_eq!(outcome.new_host.as_deref(), Some("bob"));
    }

    #[test]
    fn host_failover_never_picks_inactive_member() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        join_room(&mut conn, &room.id, "bob").unwrap();
        join_room(&mut conn, &room.id, "carol").unwrap();
        leave_room(&mut conn, &room.id, "bob").unwrap();

        let outcome = leave_room(&mut conn, &room.id, "alice").unwrap();
        assert_eq!(outcome.new_host.as_deref(), Some("carol"));
    }

    #[test]
    fn non_host_leaving_keeps_host() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        join_room(&mut conn, &room.id, "bob").unwrap();

        let outcome = leave_room(&mut conn, &room.id, "bob").unwrap();
        assert_eq!(outcome.new_host, None);
        assert_eq!(host_of(&conn, &room.id), "alice");
    }

    #[test]
    fn leave_requires_active_membership() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        join_room(&mut conn, &room.id, "bob").unwrap();

        let err = leave_room(&mut conn, &room.id, "carol").unwrap_err();
        assert!(matches!(err, RoomError::NotInRoom(_)));

        leave_room(&mut conn, &room.id, "bob").unwrap();
        let err = leave_room(&mut conn, &room.id, "bob").unwrap_err();
        assert!(matches!(err, RoomError::NotInRoom(_)));
    }

    #[test]
    fn leave_unknown_room_is_not_found() {
        let mut conn = setup_db();
        let err = leave_room(&mut conn, "missing", "alice").unwrap_err();
        assert!(matches!(err, RoomError::NotFound(_)));
    }

    #[test]
    fn toggle_mute_is_involutive() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");

        assert!(toggle_mute(&conn, &room.id, "alice").unwrap());
        assert!(!toggle_mute(&conn, &room.id, "alice").unwrap());

        let mut value = false;
        for _ in 0..5 {
            value = toggle_mute(&conn, &room.id, "alice").unwrap();
        }
        assert!(value, "odd number of toggles from false yields true");
    }

    #[test]
    fn toggle_mute_without_membership_fails() {
        let mut conn = setup_db();
        let room = start_room(&mut conn, "alice");
        let err = toggle_mute(&conn, &room.id, "bob").unwrap_err();
        assert!(matches!(err, RoomError::NotInRoom(_)));
    }
}
