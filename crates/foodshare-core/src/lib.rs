//! Marketplace rules: who may do what to a post or claim, and what that
//! does to the rest of the store. Functions in the submodules take a
//! connection and expect to run inside one transaction; [`Marketplace`]
//! supplies the transaction and the clock.

pub mod authz;
pub mod error;
pub mod handover;
pub mod lifecycle;
pub mod messaging;
pub mod notify;
pub mod posts;
pub mod ratings;
pub mod service;

pub use error::{MarketError, MarketResult};
pub use service::{MarketSettings, Marketplace};

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use foodshare_db::Database;
    use foodshare_db::queries::posts;
    use foodshare_types::models::{FoodCategory, FoodPost, PostStatus, PostType};

    pub fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn seed_user(db: &Database, username: &str) -> Uuid {
        db.create_user(Uuid::new_v4(), username, None, "not-a-real-hash")
            .unwrap()
            .id
    }

    /// An available donation owned by `owner` that expires tomorrow.
    pub fn seed_post(db: &Database, owner: Uuid) -> FoodPost {
        let now = Utc::now();
        let post = FoodPost {
            id: Uuid::new_v4(),
            owner_id: owner,
            post_type: PostType::Donation,
            title: "Sourdough".into(),
            description: "Two loaves from this morning".into(),
            quantity: "2 loaves".into(),
            category: FoodCategory::Bakery,
            dietary_tags: Default::default(),
            latitude: 51.5,
            longitude: -0.12,
            expires_at: now + Duration::days(1),
            status: PostStatus::Available,
            created_at: now,
            updated_at: now,
        };
        db.with_conn_mut(|conn| posts::insert(conn, &post)).unwrap();
        post
    }
}
