use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use foodshare_types::models::{Rating, RatingSummary};

use super::{json_at, uuid_at};
use crate::Database;

const RATING_COLUMNS: &str = "id, claim_id, from_user_id, to_user_id, rating, comment, categories, created_at, updated_at";

fn map_rating(row: &Row<'_>) -> rusqlite::Result<Rating> {
    Ok(Rating {
        id: uuid_at(row, 0)?,
        claim_id: uuid_at(row, 1)?,
        from_user_id: uuid_at(row, 2)?,
        to_user_id: uuid_at(row, 3)?,
        rating: row.get(4)?,
        comment: row.get(5)?,
        categories: json_at(row, 6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn find(conn: &Connection, claim_id: Uuid, from_user_id: Uuid, to_user_id: Uuid) -> Result<Option<Rating>> {
    let rating = conn
        .query_row(
            &format!(
                "SELECT {RATING_COLUMNS} FROM ratings
                 WHERE claim_id = ?1 AND from_user_id = ?2 AND to_user_id = ?3"
            ),
            [claim_id.to_string(), from_user_id.to_string(), to_user_id.to_string()],
            map_rating,
        )
        .optional()?;
    Ok(rating)
}

pub fn insert(conn: &Connection, rating: &Rating) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO ratings ({RATING_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        rusqlite::params![
            rating.id.to_string(),
            rating.claim_id.to_string(),
            rating.from_user_id.to_string(),
            rating.to_user_id.to_string(),
            rating.rating,
            rating.comment,
            serde_json::to_string(&rating.categories)?,
            rating.created_at,
            rating.updated_at,
        ],
    )?;
    Ok(())
}

/// Overwrites the mutable fields of an existing rating.
pub fn update(conn: &Connection, rating: &Rating) -> Result<()> {
    conn.execute(
        "UPDATE ratings SET rating = ?2, comment = ?3, categories = ?4, updated_at = ?5 WHERE id = ?1",
        rusqlite::params![
            rating.id.to_string(),
            rating.rating,
            rating.comment,
            serde_json::to_string(&rating.categories)?,
            rating.updated_at,
        ],
    )?;
    Ok(())
}

pub fn list_for_claim(conn: &Connection, claim_id: Uuid) -> Result<Vec<Rating>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RATING_COLUMNS} FROM ratings WHERE claim_id = ?1 ORDER BY created_at ASC, rowid ASC"
    ))?;
    let ratings = stmt
        .query_map([claim_id.to_string()], map_rating)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ratings)
}

pub fn count_for_claim_direction(conn: &Connection, claim_id: Uuid, from_user_id: Uuid, to_user_id: Uuid) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM ratings WHERE claim_id = ?1 AND from_user_id = ?2 AND to_user_id = ?3",
        [claim_id.to_string(), from_user_id.to_string(), to_user_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(count as u64)
}

pub fn summary_for_user(conn: &Connection, user_id: Uuid) -> Result<RatingSummary> {
    let (count, average): (i64, Option<f64>) = conn.query_row(
        "SELECT COUNT(*), AVG(rating) FROM ratings WHERE to_user_id = ?1",
        [user_id.to_string()],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok(RatingSummary {
        count: count as u64,
        average,
    })
}

impl Database {
    // -- Ratings --

    pub fn list_ratings_for_claim(&self, claim_id: Uuid) -> Result<Vec<Rating>> {
        self.with_conn(|conn| list_for_claim(conn, claim_id))
    }

    pub fn rating_summary(&self, user_id: Uuid) -> Result<RatingSummary> {
        self.with_conn(|conn| summary_for_user(conn, user_id))
    }
}
