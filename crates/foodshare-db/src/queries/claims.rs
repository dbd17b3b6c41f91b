use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use foodshare_types::models::{Claim, ClaimStatus};

use super::{enum_at, uuid_at};
use crate::Database;
use crate::models::ClaimFilter;

const CLAIM_COLUMNS: &str = "c.id, c.post_id, c.claimer_id, c.status, c.message, c.contact_preference, \
     c.handover_code, c.handover_code_expires_at, c.handover_verified, c.created_at, c.updated_at";

fn map_claim(row: &Row<'_>) -> rusqlite::Result<Claim> {
    Ok(Claim {
        id: uuid_at(row, 0)?,
        post_id: uuid_at(row, 1)?,
        claimer_id: uuid_at(row, 2)?,
        status: enum_at(row, 3)?,
        message: row.get(4)?,
        contact_preference: enum_at(row, 5)?,
        handover_code: row.get(6)?,
        handover_code_expires_at: row.get(7)?,
        handover_verified: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub fn insert(conn: &Connection, claim: &Claim) -> Result<()> {
    conn.execute(
        "INSERT INTO claims (id, post_id, claimer_id, status, message, contact_preference,
             handover_code, handover_code_expires_at, handover_verified, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            claim.id.to_string(),
            claim.post_id.to_string(),
            claim.claimer_id.to_string(),
            claim.status.as_str(),
            claim.message,
            claim.contact_preference.as_str(),
            claim.handover_code,
            claim.handover_code_expires_at,
            claim.handover_verified,
            claim.created_at,
            claim.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Claim>> {
    let claim = conn
        .query_row(
            &format!("SELECT {CLAIM_COLUMNS} FROM claims c WHERE c.id = ?1"),
            [id.to_string()],
            map_claim,
        )
        .optional()?;
    Ok(claim)
}

pub fn set_status(conn: &Connection, id: Uuid, status: ClaimStatus, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE claims SET status = ?2, updated_at = ?3 WHERE id = ?1",
        rusqlite::params![id.to_string(), status.as_str(), now],
    )?;
    Ok(())
}

/// Stores (or clears, with `None`) the outstanding handover code.
pub fn set_handover_code(
    conn: &Connection,
    id: Uuid,
    code: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE claims SET handover_code = ?2, handover_code_expires_at = ?3, updated_at = ?4 WHERE id = ?1",
        rusqlite::params![id.to_string(), code, expires_at, now],
    )?;
    Ok(())
}

/// Consumes the outstanding code and flags the handover as verified.
pub fn mark_handover_verified(conn: &Connection, id: Uuid, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE claims SET handover_code = NULL, handover_code_expires_at = NULL,
             handover_verified = 1, updated_at = ?2
         WHERE id = ?1",
        rusqlite::params![id.to_string(), now],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: Uuid) -> Result<bool> {
    let changed = conn.execute("DELETE FROM claims WHERE id = ?1", [id.to_string()])?;
    Ok(changed > 0)
}

/// The post's live (pending, approved or in progress) claim, if any.
pub fn active_for_post(conn: &Connection, post_id: Uuid) -> Result<Option<Claim>> {
    let claim = conn
        .query_row(
            &format!(
                "SELECT {CLAIM_COLUMNS} FROM claims c
                 WHERE c.post_id = ?1
                   AND c.status IN ('pending', 'approved', 'in_progress')"
            ),
            [post_id.to_string()],
            map_claim,
        )
        .optional()?;
    Ok(claim)
}

pub fn list_for_post(conn: &Connection, post_id: Uuid, status: Option<ClaimStatus>) -> Result<Vec<Claim>> {
    list(
        conn,
        &ClaimFilter {
            post_id: Some(post_id),
            status,
            ..Default::default()
        },
    )
}

/// Oldest first, so owners see requests in arrival order.
pub fn list(conn: &Connection, filter: &ClaimFilter) -> Result<Vec<Claim>> {
    let mut sql = format!(
        "SELECT {CLAIM_COLUMNS} FROM claims c JOIN food_posts p ON p.id = c.post_id WHERE 1 = 1"
    );
    let mut params: Vec<String> = Vec::new();

    if let Some(claimer_id) = filter.claimer_id {
        params.push(claimer_id.to_string());
        sql.push_str(&format!(" AND c.claimer_id = ?{}", params.len()));
    }
    if let Some(owner_id) = filter.owner_id {
        params.push(owner_id.to_string());
        sql.push_str(&format!(" AND p.owner_id = ?{}", params.len()));
    }
    if let Some(post_id) = filter.post_id {
        params.push(post_id.to_string());
        sql.push_str(&format!(" AND c.post_id = ?{}", params.len()));
    }
    if let Some(status) = filter.status {
        params.push(status.as_str().to_string());
        sql.push_str(&format!(" AND c.status = ?{}", params.len()));
    }
    sql.push_str(" ORDER BY c.created_at ASC, c.rowid ASC");

    let mut stmt = conn.prepare(&sql)?;
    let refs: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
    let claims = stmt
        .query_map(refs.as_slice(), map_claim)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(claims)
}

impl Database {
    // -- Claims --

    pub fn get_claim(&self, id: Uuid) -> Result<Option<Claim>> {
        self.with_conn(|conn| get(conn, id))
    }

    pub fn list_claims(&self, filter: &ClaimFilter) -> Result<Vec<Claim>> {
        self.with_conn(|conn| list(conn, filter))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;
    use foodshare_types::models::{ContactPreference, FoodCategory, FoodPost, PostStatus, PostType};

    use super::*;
    use crate::is_constraint_violation;
    use crate::queries::posts;

    fn seed_user(db: &Database, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(id, name, None, "x").unwrap();
        id
    }

    fn seed_post(db: &Database, owner_id: Uuid) -> Uuid {
        let now = Utc::now();
        let post = FoodPost {
            id: Uuid::new_v4(),
            owner_id,
            post_type: PostType::Donation,
            title: "Bread".into(),
            description: String::new(),
            quantity: "2 loaves".into(),
            category: FoodCategory::Bakery,
            dietary_tags: BTreeSet::new(),
            latitude: 0.0,
            longitude: 0.0,
            expires_at: now + Duration::days(1),
            status: PostStatus::Available,
            created_at: now,
            updated_at: now,
        };
        db.with_conn_mut(|conn| posts::insert(conn, &post)).unwrap();
        post.id
    }

    fn claim(post_id: Uuid, claimer_id: Uuid, status: ClaimStatus) -> Claim {
        let now = Utc::now();
        Claim {
            id: Uuid::new_v4(),
            post_id,
            claimer_id,
            status,
            message: None,
            contact_preference: ContactPreference::InApp,
            handover_code: None,
            handover_code_expires_at: None,
            handover_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn one_live_claim_per_post() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "owner");
        let first = seed_user(&db, "first");
        let second = seed_user(&db, "second");
        let post_id = seed_post(&db, owner);

        let live = claim(post_id, first, ClaimStatus::Pending);
        db.with_conn_mut(|conn| insert(conn, &live)).unwrap();

        for status in [ClaimStatus::Pending, ClaimStatus::Approved, ClaimStatus::InProgress] {
            let err = db
                .with_conn_mut(|conn| insert(conn, &claim(post_id, second, status)))
                .unwrap_err();
            assert!(is_constraint_violation(&err), "{status}");
        }

        // Closed claims do not count.
        db.with_conn_mut(|conn| insert(conn, &claim(post_id, second, ClaimStatus::Rejected)))
            .unwrap();

        db.with_conn_mut(|conn| set_status(conn, live.id, ClaimStatus::Cancelled, Utc::now()))
            .unwrap();
        db.with_conn_mut(|conn| insert(conn, &claim(post_id, second, ClaimStatus::Pending)))
            .unwrap();
        let active = db.with_conn(|conn| active_for_post(conn, post_id)).unwrap().unwrap();
        assert_eq!(active.claimer_id, second);
    }
}
