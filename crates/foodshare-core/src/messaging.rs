use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use foodshare_db::queries::messages;
use foodshare_types::models::{Message, NotificationKind, RelatedType};

use crate::authz::{self, Party};
use crate::error::MarketResult;
use crate::lifecycle;
use crate::notify::{self, Notice};

pub const DEFAULT_PAGE: u32 = 100;
pub const MAX_PAGE: u32 = 500;

const PREVIEW_CHARS: usize = 80;

fn preview(content: &str) -> String {
    let mut out: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        out.push('…');
    }
    out
}

/// Appends a message to a claim's thread and notifies the other party.
pub fn send(conn: &Connection, claim_id: Uuid, sender: Uuid, content: &str, now: DateTime<Utc>) -> MarketResult<Message> {
    let (claim, post) = lifecycle::load(conn, claim_id)?;
    let receiver = match authz::require_party(sender, &post, &claim)? {
        Party::Owner => claim.claimer_id,
        Party::Claimer => post.owner_id,
    };

    let message = Message {
        id: Uuid::new_v4(),
        claim_id: claim.id,
        sender_id: sender,
        receiver_id: receiver,
        content: content.trim().to_string(),
        read: false,
        created_at: now,
    };
    messages::insert(conn, &message)?;

    notify::send(
        conn,
        Notice::new(
            receiver,
            NotificationKind::NewMessage,
            format!("New message about \"{}\"", post.title),
            preview(&message.content),
        )
        .about(claim.id, RelatedType::Claim),
        now,
    )?;
    Ok(message)
}

/// Reads a claim's thread and marks what was addressed to the caller as read.
pub fn list(
    conn: &Connection,
    claim_id: Uuid,
    caller: Uuid,
    after: Option<DateTime<Utc>>,
    limit: Option<u32>,
) -> MarketResult<Vec<Message>> {
    let (claim, post) = lifecycle::load(conn, claim_id)?;
    authz::require_party(caller, &post, &claim)?;

    let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let thread = messages::list_for_claim(conn, claim.id, after, limit)?;
    messages::mark_read_for_receiver(conn, claim.id, caller)?;
    Ok(thread)
}
