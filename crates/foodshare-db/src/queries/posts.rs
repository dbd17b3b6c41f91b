use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use foodshare_types::models::{FoodPost, PostStatus};

use super::{enum_at, json_at, uuid_at};
use crate::Database;
use crate::models::{Near, PostChanges, PostFilter};

const POST_COLUMNS: &str = "id, owner_id, post_type, title, description, quantity, category, \
     dietary_tags, latitude, longitude, expires_at, status, created_at, updated_at";

const EARTH_RADIUS_KM: f64 = 6371.0;
const KM_PER_DEGREE_LAT: f64 = 111.32;

fn map_post(row: &Row<'_>) -> rusqlite::Result<FoodPost> {
    Ok(FoodPost {
        id: uuid_at(row, 0)?,
        owner_id: uuid_at(row, 1)?,
        post_type: enum_at(row, 2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        quantity: row.get(5)?,
        category: enum_at(row, 6)?,
        dietary_tags: json_at(row, 7)?,
        latitude: row.get(8)?,
        longitude: row.get(9)?,
        expires_at: row.get(10)?,
        status: enum_at(row, 11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// Great-circle distance in kilometres.
pub fn distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

pub fn insert(conn: &Connection, post: &FoodPost) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO food_posts ({POST_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        rusqlite::params![
            post.id.to_string(),
            post.owner_id.to_string(),
            post.post_type.as_str(),
            post.title,
            post.description,
            post.quantity,
            post.category.as_str(),
            serde_json::to_string(&post.dietary_tags)?,
            post.latitude,
            post.longitude,
            post.expires_at,
            post.status.as_str(),
            post.created_at,
            post.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<FoodPost>> {
    let post = conn
        .query_row(
            &format!("SELECT {POST_COLUMNS} FROM food_posts WHERE id = ?1"),
            [id.to_string()],
            map_post,
        )
        .optional()?;
    Ok(post)
}

pub fn set_status(conn: &Connection, id: Uuid, status: PostStatus, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE food_posts SET status = ?2, updated_at = ?3 WHERE id = ?1",
        rusqlite::params![id.to_string(), status.as_str(), now],
    )?;
    Ok(())
}

/// Applies owner edits. Returns false when the post does not exist.
pub fn update(conn: &Connection, id: Uuid, changes: &PostChanges, now: DateTime<Utc>) -> Result<bool> {
    let mut sets: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(id.to_string()), Box::new(now)];

    let mut push = |column: &'static str, value: Box<dyn ToSql>| {
        params.push(value);
        sets.push(column);
    };
    if let Some(title) = &changes.title {
        push("title", Box::new(title.clone()));
    }
    if let Some(description) = &changes.description {
        push("description", Box::new(description.clone()));
    }
    if let Some(quantity) = &changes.quantity {
        push("quantity", Box::new(quantity.clone()));
    }
    if let Some(category) = changes.category {
        push("category", Box::new(category.as_str()));
    }
    if let Some(tags) = &changes.dietary_tags {
        push("dietary_tags", Box::new(serde_json::to_string(tags)?));
    }
    if let Some(latitude) = changes.latitude {
        push("latitude", Box::new(latitude));
    }
    if let Some(longitude) = changes.longitude {
        push("longitude", Box::new(longitude));
    }
    if let Some(expires_at) = changes.expires_at {
        push("expires_at", Box::new(expires_at));
    }

    let assignments: Vec<String> = std::iter::once("updated_at = ?2".to_string())
        .chain(sets.iter().enumerate().map(|(i, col)| format!("{} = ?{}", col, i + 3)))
        .collect();
    let sql = format!(
        "UPDATE food_posts SET {} WHERE id = ?1",
        assignments.join(", ")
    );

    let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let changed = conn.execute(&sql, refs.as_slice())?;
    Ok(changed > 0)
}

pub fn delete(conn: &Connection, id: Uuid) -> Result<bool> {
    let changed = conn.execute("DELETE FROM food_posts WHERE id = ?1", [id.to_string()])?;
    Ok(changed > 0)
}

/// Lists posts newest first. A `near` filter is narrowed by a latitude band
/// in SQL and then by exact distance here, so paging is applied afterwards.
pub fn list(conn: &Connection, filter: &PostFilter) -> Result<Vec<FoodPost>> {
    let mut sql = format!("SELECT {POST_COLUMNS} FROM food_posts WHERE 1 = 1");
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(post_type) = filter.post_type {
        params.push(Box::new(post_type.as_str()));
        sql.push_str(&format!(" AND post_type = ?{}", params.len()));
    }
    if let Some(category) = filter.category {
        params.push(Box::new(category.as_str()));
        sql.push_str(&format!(" AND category = ?{}", params.len()));
    }
    if let Some(owner_id) = filter.owner_id {
        params.push(Box::new(owner_id.to_string()));
        sql.push_str(&format!(" AND owner_id = ?{}", params.len()));
    }
    match filter.status {
        Some(PostStatus::Available) => {
            params.push(Box::new(filter.now));
            sql.push_str(&format!(
                " AND status = 'available' AND expires_at > ?{}",
                params.len()
            ));
        }
        Some(PostStatus::Expired) => {
            params.push(Box::new(filter.now));
            sql.push_str(&format!(
                " AND (status = 'expired' OR (status = 'available' AND expires_at <= ?{}))",
                params.len()
            ));
        }
        Some(status) => {
            params.push(Box::new(status.as_str()));
            sql.push_str(&format!(" AND status = ?{}", params.len()));
        }
        None => {}
    }
    if let Some(tag) = filter.dietary {
        params.push(Box::new(tag.as_str()));
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM json_each(food_posts.dietary_tags) WHERE json_each.value = ?{})",
            params.len()
        ));
    }
    if let Some(near) = filter.near {
        let band = near.radius_km / KM_PER_DEGREE_LAT;
        params.push(Box::new(near.latitude - band));
        params.push(Box::new(near.latitude + band));
        sql.push_str(&format!(
            " AND latitude BETWEEN ?{} AND ?{}",
            params.len() - 1,
            params.len()
        ));
    }

    sql.push_str(" ORDER BY created_at DESC, rowid DESC");
    if filter.near.is_none() {
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));
        sql.push_str(&format!(" LIMIT ?{} OFFSET ?{}", params.len() - 1, params.len()));
    }

    let mut stmt = conn.prepare(&sql)?;
    let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let posts = stmt
        .query_map(refs.as_slice(), map_post)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    match filter.near {
        Some(near) => Ok(within(posts, near)
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect()),
        None => Ok(posts),
    }
}

fn within(posts: Vec<FoodPost>, near: Near) -> impl Iterator<Item = FoodPost> {
    posts.into_iter().filter(move |p| {
        distance_km(near.latitude, near.longitude, p.latitude, p.longitude) <= near.radius_km
    })
}

impl Database {
    // -- Posts --

    pub fn get_post(&self, id: Uuid) -> Result<Option<FoodPost>> {
        self.with_conn(|conn| get(conn, id))
    }

    pub fn list_posts(&self, filter: &PostFilter) -> Result<Vec<FoodPost>> {
        self.with_conn(|conn| list(conn, filter))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;
    use foodshare_types::models::{DietaryTag, FoodCategory, PostType};

    use super::*;

    fn seed_user(db: &Database) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(id, &format!("u{}", &id.simple().to_string()[..8]), None, "x")
            .unwrap();
        id
    }

    fn post(owner_id: Uuid, lat: f64, lng: f64, expires_at: DateTime<Utc>) -> FoodPost {
        let now = Utc::now();
        FoodPost {
            id: Uuid::new_v4(),
            owner_id,
            post_type: PostType::Donation,
            title: "Apples".into(),
            description: "Windfall".into(),
            quantity: "1 crate".into(),
            category: FoodCategory::Produce,
            dietary_tags: BTreeSet::from([DietaryTag::Vegan]),
            latitude: lat,
            longitude: lng,
            expires_at,
            status: PostStatus::Available,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn distance_is_plausible() {
        // London to Paris is roughly 344 km.
        let d = distance_km(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((330.0..360.0).contains(&d), "{d}");
        assert!(distance_km(10.0, 10.0, 10.0, 10.0) < 1e-9);
    }

    #[test]
    fn status_filter_folds_in_expiry() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db);
        let now = Utc::now();
        let fresh = post(owner, 0.0, 0.0, now + Duration::hours(2));
        let stale = post(owner, 0.0, 0.0, now - Duration::hours(2));
        db.with_conn_mut(|conn| {
            insert(conn, &fresh)?;
            insert(conn, &stale)
        })
        .unwrap();

        let mut filter = PostFilter::new(now);
        filter.status = Some(PostStatus::Available);
        let ids: Vec<Uuid> = db.list_posts(&filter).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![fresh.id]);

        filter.status = Some(PostStatus::Expired);
        let ids: Vec<Uuid> = db.list_posts(&filter).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![stale.id]);
    }

    #[test]
    fn radius_and_dietary_filters() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db);
        let later = Utc::now() + Duration::days(1);
        let close = post(owner, 51.50, -0.12, later);
        let far = post(owner, 48.85, 2.35, later);
        let mut meat = post(owner, 51.51, -0.13, later);
        meat.dietary_tags = BTreeSet::from([DietaryTag::Halal]);
        db.with_conn_mut(|conn| {
            insert(conn, &close)?;
            insert(conn, &far)?;
            insert(conn, &meat)
        })
        .unwrap();

        let mut filter = PostFilter::new(Utc::now());
        filter.near = Some(Near {
            latitude: 51.5,
            longitude: -0.12,
            radius_km: 10.0,
        });
        assert_eq!(db.list_posts(&filter).unwrap().len(), 2);

        filter.dietary = Some(DietaryTag::Vegan);
        let ids: Vec<Uuid> = db.list_posts(&filter).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![close.id]);
    }

    #[test]
    fn update_touches_only_given_fields() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db);
        let original = post(owner, 1.0, 1.0, Utc::now() + Duration::days(1));
        db.with_conn_mut(|conn| insert(conn, &original)).unwrap();

        let changes = PostChanges {
            title: Some("Pears".into()),
            dietary_tags: Some(BTreeSet::new()),
            ..Default::default()
        };
        let found = db
            .with_conn_mut(|conn| update(conn, original.id, &changes, Utc::now()))
            .unwrap();
        assert!(found);

        let updated = db.get_post(original.id).unwrap().unwrap();
        assert_eq!(updated.title, "Pears");
        assert_eq!(updated.description, "Windfall");
        assert!(updated.dietary_tags.is_empty());
    }
}
