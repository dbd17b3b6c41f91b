//! Notification fan-out. Inserts run on the caller's connection, so a
//! failed insert aborts the triggering transaction with it.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use foodshare_db::queries::notifications;
use foodshare_types::models::{Notification, NotificationKind, RelatedType};

use crate::error::{MarketError, MarketResult};

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 200;

/// One pending notification for one recipient.
#[derive(Debug, Clone)]
pub struct Notice {
    pub recipient: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related: Option<(Uuid, RelatedType)>,
}

impl Notice {
    pub fn new(
        recipient: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient,
            kind,
            title: title.into(),
            message: message.into(),
            related: None,
        }
    }

    pub fn about(mut self, id: Uuid, related_type: RelatedType) -> Self {
        self.related = Some((id, related_type));
        self
    }
}

pub fn send(conn: &Connection, notice: Notice, now: DateTime<Utc>) -> MarketResult<Notification> {
    let notification = Notification {
        id: Uuid::new_v4(),
        user_id: notice.recipient,
        kind: notice.kind,
        title: notice.title,
        message: notice.message,
        related_id: notice.related.map(|(id, _)| id),
        related_type: notice.related.map(|(_, t)| t),
        read: false,
        created_at: now,
    };
    notifications::insert(conn, &notification)?;
    debug!(
        "Notification {} ({}) -> {}",
        notification.id, notification.kind, notification.user_id
    );
    Ok(notification)
}

pub fn fan_out(
    conn: &Connection,
    notices: impl IntoIterator<Item = Notice>,
    now: DateTime<Utc>,
) -> MarketResult<Vec<Notification>> {
    notices.into_iter().map(|n| send(conn, n, now)).collect()
}

pub fn list(conn: &Connection, user_id: Uuid, unread_only: bool, limit: Option<u32>) -> MarketResult<Vec<Notification>> {
    let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    Ok(notifications::list_for_user(conn, user_id, unread_only, limit)?)
}

/// Marks one notification read; `NotFound` when it is not the caller's.
pub fn mark_one_read(conn: &Connection, user_id: Uuid, id: Uuid) -> MarketResult<()> {
    if !notifications::exists_for_user(conn, user_id, id)? {
        return Err(MarketError::NotFound("notification"));
    }
    notifications::mark_read(conn, user_id, Some(&[id]))?;
    Ok(())
}

pub fn delete(conn: &Connection, user_id: Uuid, id: Uuid) -> MarketResult<()> {
    if notifications::delete(conn, user_id, id)? {
        Ok(())
    } else {
        Err(MarketError::NotFound("notification"))
    }
}
