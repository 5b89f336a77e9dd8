//! Users and topic categories.

use crate::{RoomError, Topic, User};
use rusqlite::{params, Connection, OptionalExtension, Row};

fn map_row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        image: row.get(2)?,
        native_language: row.get(3)?,
        learning_language: row.get(4)?,
    })
}

fn map_row_to_topic(row: &Row) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        title: row.get(1)?,
        emoji: row.get(2)?,
        description: row.get(3)?,
        sort_order: row.get(4)?,
    })
}

/// Looks up a user by id.
///
/// # Errors
///
/// `NotFound` if no such user exists.
pub fn get_user(conn: &Connection, user_id: &str) -> Result<User, RoomError> {
    conn.query_row(
        "SELECT id, name, image, native_language, learning_language FROM users WHERE id = ?1",
        [user_id],
        map_row_to_user,
    )
    .optional()?
    .ok_or_else(|| RoomError::NotFound(format!("user {user_id}")))
}

/// Inserts or refreshes a user's profile projection.
pub fn upsert_user(conn: &Connection, user: &User) -> Result<(), RoomError> {
    conn.execute(
        "INSERT INTO users (id, name, image, native_language, learning_language)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            image = excluded.image,
            native_language = excluded.native_language,
            learning_language = excluded.learning_language",
        params![
            user.id,
            user.name,
            user.image,
            user.native_language,
            user.learning_language,
        ],
    )?;
    Ok(())
}

/// All topic categories in display order.
pub fn list_topics(conn: &Connection) -> Result<Vec<Topic>, RoomError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, emoji, description, sort_order FROM topics
         ORDER BY sort_order ASC, title ASC",
    )?;
    let topics = stmt
        .query_map([], map_row_to_topic)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(topics)
}

/// Looks up a topic category by id.
///
/// # Errors
///
/// `NotFound` if no such topic exists.
pub fn get_topic(conn: &Connection, topic_id: &str) -> Result<Topic, RoomError> {
    conn.query_row(
        "SELECT id, title, emoji, description, sort_order FROM topics WHERE id = ?1",
        [topic_id],
        map_row_to_topic,
    )
    .optional()?
    .ok_or_else(|| RoomError::NotFound(format!("topic {topic_id}")))
}
