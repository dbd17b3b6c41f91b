use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use foodshare_types::models::User;

use super::uuid_at;
use crate::Database;
use crate::models::UserRow;

const USER_COLUMNS: &str = "id, username, display_name, password, created_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: uuid_at(row, 0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        password: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn insert(
    conn: &Connection,
    id: Uuid,
    username: &str,
    display_name: Option<&str>,
    password_hash: &str,
    created_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, username, display_name, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id.to_string(), username, display_name, password_hash, created_at],
    )?;
    Ok(())
}

pub fn by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            [username],
            map_user,
        )
        .optional()?;
    Ok(row)
}

pub fn by_id(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [id.to_string()],
            map_user,
        )
        .optional()?;
    Ok(row.map(User::from))
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        display_name: Option<&str>,
        password_hash: &str,
    ) -> Result<User> {
        let now = Utc::now();
        self.with_conn_mut(|conn| {
            insert(conn, id, username, display_name, password_hash, now)?;
            Ok(User {
                id,
                username: username.to_string(),
                display_name: display_name.map(str::to_string),
                created_at: now,
            })
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| by_id(conn, id))
    }
}
