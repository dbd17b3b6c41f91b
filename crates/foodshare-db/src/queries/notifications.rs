use anyhow::Result;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use foodshare_types::models::Notification;

use super::{enum_at, opt_enum_at, opt_uuid_at, uuid_at};
use crate::Database;

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, message, related_id, related_type, is_read, created_at";

fn map_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        kind: enum_at(row, 2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        related_id: opt_uuid_at(row, 5)?,
        related_type: opt_enum_at(row, 6)?,
        read: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub fn insert(conn: &Connection, n: &Notification) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        rusqlite::params![
            n.id.to_string(),
            n.user_id.to_string(),
            n.kind.as_str(),
            n.title,
            n.message,
            n.related_id.map(|id| id.to_string()),
            n.related_type.map(|t| t.as_str()),
            n.read,
            n.created_at,
        ],
    )?;
    Ok(())
}

/// Newest first.
pub fn list_for_user(conn: &Connection, user_id: Uuid, unread_only: bool, limit: u32) -> Result<Vec<Notification>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications
         WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?3"
    ))?;
    let rows = stmt
        .query_map(
            rusqlite::params![user_id.to_string(), unread_only, limit],
            map_notification,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn unread_count(conn: &Connection, user_id: Uuid) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
        [user_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(count as u64)
}

/// Marks the given notifications (all of the user's when `ids` is `None`)
/// as read. Ids belonging to other users are ignored. Returns rows changed.
pub fn mark_read(conn: &Connection, user_id: Uuid, ids: Option<&[Uuid]>) -> Result<u64> {
    let changed = match ids {
        None => conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
            [user_id.to_string()],
        )?,
        Some(ids) => {
            let mut stmt = conn.prepare(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2 AND is_read = 0",
            )?;
            let mut total = 0;
            for id in ids {
                total += stmt.execute([id.to_string(), user_id.to_string()])?;
            }
            total
        }
    };
    Ok(changed as u64)
}

/// True when the notification existed and belonged to `user_id`.
pub fn delete(conn: &Connection, user_id: Uuid, id: Uuid) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
        [id.to_string(), user_id.to_string()],
    )?;
    Ok(changed > 0)
}

pub fn exists_for_user(conn: &Connection, user_id: Uuid, id: Uuid) -> Result<bool> {
    let found: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE id = ?1 AND user_id = ?2",
        [id.to_string(), user_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(found > 0)
}

impl Database {
    // -- Notifications --

    pub fn list_notifications(&self, user_id: Uuid, unread_only: bool, limit: u32) -> Result<Vec<Notification>> {
        self.with_conn(|conn| list_for_user(conn, user_id, unread_only, limit))
    }

    pub fn unread_notification_count(&self, user_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| unread_count(conn, user_id))
    }
}
