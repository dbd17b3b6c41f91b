use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const LATEST_VERSION: i64 = 1;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id            TEXT PRIMARY KEY,
                username      TEXT NOT NULL UNIQUE COLLATE NOCASE,
                display_name  TEXT,
                password      TEXT NOT NULL,
                created_at    TEXT NOT NULL
            );

            CREATE TABLE food_posts (
                id            TEXT PRIMARY KEY,
                owner_id      TEXT NOT NULL REFERENCES users(id),
                post_type     TEXT NOT NULL,
                title         TEXT NOT NULL,
                description   TEXT NOT NULL DEFAULT '',
                quantity      TEXT NOT NULL,
                category      TEXT NOT NULL,
                dietary_tags  TEXT NOT NULL DEFAULT '[]',
                latitude      REAL NOT NULL,
                longitude     REAL NOT NULL,
                expires_at    TEXT NOT NULL,
                status        TEXT NOT NULL DEFAULT 'available',
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            );

            CREATE INDEX idx_food_posts_status ON food_posts(status, expires_at);
            CREATE INDEX idx_food_posts_owner ON food_posts(owner_id);

            CREATE TABLE food_post_images (
                id            TEXT PRIMARY KEY,
                post_id       TEXT NOT NULL REFERENCES food_posts(id) ON DELETE CASCADE,
                content_type  TEXT NOT NULL,
                size          INTEGER NOT NULL,
                position      INTEGER NOT NULL,
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_food_post_images_post ON food_post_images(post_id, position);

            CREATE TABLE claims (
                id                        TEXT PRIMARY KEY,
                post_id                   TEXT NOT NULL REFERENCES food_posts(id) ON DELETE CASCADE,
                claimer_id                TEXT NOT NULL REFERENCES users(id),
                status                    TEXT NOT NULL DEFAULT 'pending',
                message                   TEXT,
                contact_preference        TEXT NOT NULL DEFAULT 'in_app',
                handover_code             TEXT,
                handover_code_expires_at  TEXT,
                handover_verified         INTEGER NOT NULL DEFAULT 0,
                created_at                TEXT NOT NULL,
                updated_at                TEXT NOT NULL
            );

            CREATE INDEX idx_claims_post ON claims(post_id, status);
            CREATE INDEX idx_claims_claimer ON claims(claimer_id, created_at);

            -- At most one live claim per post.
            CREATE UNIQUE INDEX idx_claims_one_active
                ON claims(post_id)
                WHERE status IN ('pending', 'approved', 'in_progress');

            CREATE TABLE ratings (
                id            TEXT PRIMARY KEY,
                claim_id      TEXT NOT NULL REFERENCES claims(id) ON DELETE CASCADE,
                from_user_id  TEXT NOT NULL REFERENCES users(id),
                to_user_id    TEXT NOT NULL REFERENCES users(id),
                rating        INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                comment       TEXT,
                categories    TEXT NOT NULL DEFAULT '[]',
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL,
                UNIQUE(claim_id, from_user_id, to_user_id)
            );

            CREATE INDEX idx_ratings_to_user ON ratings(to_user_id);

            CREATE TABLE notifications (
                id            TEXT PRIMARY KEY,
                user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                kind          TEXT NOT NULL,
                title         TEXT NOT NULL,
                message       TEXT NOT NULL,
                related_id    TEXT,
                related_type  TEXT,
                is_read       INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, is_read, created_at);

            CREATE TABLE messages (
                id            TEXT PRIMARY KEY,
                claim_id      TEXT NOT NULL REFERENCES claims(id) ON DELETE CASCADE,
                sender_id     TEXT NOT NULL REFERENCES users(id),
                receiver_id   TEXT NOT NULL REFERENCES users(id),
                content       TEXT NOT NULL,
                is_read       INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_messages_claim ON messages(claim_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
