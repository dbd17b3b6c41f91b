use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use foodshare_types::models::FoodPostImage;

use super::uuid_at;
use crate::Database;

const IMAGE_COLUMNS: &str = "id, post_id, content_type, size, position, created_at";

fn map_image(row: &Row<'_>) -> rusqlite::Result<FoodPostImage> {
    Ok(FoodPostImage {
        id: uuid_at(row, 0)?,
        post_id: uuid_at(row, 1)?,
        content_type: row.get(2)?,
        size: row.get::<_, i64>(3)? as u64,
        position: row.get::<_, i64>(4)? as u32,
        created_at: row.get(5)?,
    })
}

pub fn insert(conn: &Connection, image: &FoodPostImage) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO food_post_images ({IMAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        rusqlite::params![
            image.id.to_string(),
            image.post_id.to_string(),
            image.content_type,
            image.size as i64,
            image.position as i64,
            image.created_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<FoodPostImage>> {
    let image = conn
        .query_row(
            &format!("SELECT {IMAGE_COLUMNS} FROM food_post_images WHERE id = ?1"),
            [id.to_string()],
            map_image,
        )
        .optional()?;
    Ok(image)
}

pub fn list_for_post(conn: &Connection, post_id: Uuid) -> Result<Vec<FoodPostImage>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {IMAGE_COLUMNS} FROM food_post_images WHERE post_id = ?1 ORDER BY position ASC"
    ))?;
    let rows = stmt
        .query_map([post_id.to_string()], map_image)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Image count and the next free position for a post.
pub fn slot_for_post(conn: &Connection, post_id: Uuid) -> Result<(u32, u32)> {
    let (count, next): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(MAX(position) + 1, 0) FROM food_post_images WHERE post_id = ?1",
        [post_id.to_string()],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok((count as u32, next as u32))
}

pub fn delete(conn: &Connection, id: Uuid) -> Result<bool> {
    let changed = conn.execute("DELETE FROM food_post_images WHERE id = ?1", [id.to_string()])?;
    Ok(changed > 0)
}

impl Database {
    // -- Images --

    pub fn get_image(&self, id: Uuid) -> Result<Option<FoodPostImage>> {
        self.with_conn(|conn| get(conn, id))
    }

    pub fn list_images(&self, post_id: Uuid) -> Result<Vec<FoodPostImage>> {
        self.with_conn(|conn| list_for_post(conn, post_id))
    }
}
