use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use foodshare_types::models::Message;

use super::uuid_at;

const MESSAGE_COLUMNS: &str = "id, claim_id, sender_id, receiver_id, content, is_read, created_at";

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_at(row, 0)?,
        claim_id: uuid_at(row, 1)?,
        sender_id: uuid_at(row, 2)?,
        receiver_id: uuid_at(row, 3)?,
        content: row.get(4)?,
        read: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn insert(conn: &Connection, message: &Message) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        rusqlite::params![
            message.id.to_string(),
            message.claim_id.to_string(),
            message.sender_id.to_string(),
            message.receiver_id.to_string(),
            message.content,
            message.read,
            message.created_at,
        ],
    )?;
    Ok(())
}

/// Oldest first, optionally only messages newer than `after`.
pub fn list_for_claim(conn: &Connection, claim_id: Uuid, after: Option<DateTime<Utc>>, limit: u32) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE claim_id = ?1 AND (?2 IS NULL OR created_at > ?2)
         ORDER BY created_at ASC, rowid ASC
         LIMIT ?3"
    ))?;
    let rows = stmt
        .query_map(
            rusqlite::params![claim_id.to_string(), after, limit],
            map_message,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_read_for_receiver(conn: &Connection, claim_id: Uuid, receiver_id: Uuid) -> Result<u64> {
    let changed = conn.execute(
        "UPDATE messages SET is_read = 1 WHERE claim_id = ?1 AND receiver_id = ?2 AND is_read = 0",
        [claim_id.to_string(), receiver_id.to_string()],
    )?;
    Ok(changed as u64)
}
