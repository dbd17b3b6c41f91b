/// Row and parameter types that only the store needs. Everything that is
/// also served to clients lives in `foodshare_types::models`.
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use foodshare_types::models::{
    ClaimStatus, DietaryTag, FoodCategory, PostStatus, PostType, User,
};

/// A user row including the password hash. Never serialized.
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            created_at: row.created_at,
        }
    }
}

/// Owner-editable post fields; `None` leaves a column unchanged.
#[derive(Debug, Default, Clone)]
pub struct PostChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<String>,
    pub category: Option<FoodCategory>,
    pub dietary_tags: Option<BTreeSet<DietaryTag>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PostChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.quantity.is_none()
            && self.category.is_none()
            && self.dietary_tags.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.expires_at.is_none()
    }
}

/// Centre point and radius for a listing.
#[derive(Debug, Clone, Copy)]
pub struct Near {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

/// Post listing filter. `status` matches the effective status as of `now`.
#[derive(Debug, Clone)]
pub struct PostFilter {
    pub now: DateTime<Utc>,
    pub post_type: Option<PostType>,
    pub category: Option<FoodCategory>,
    pub status: Option<PostStatus>,
    pub owner_id: Option<Uuid>,
    pub dietary: Option<DietaryTag>,
    pub near: Option<Near>,
    pub limit: u32,
    pub offset: u32,
}

impl PostFilter {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            post_type: None,
            category: None,
            status: None,
            owner_id: None,
            dietary: None,
            near: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Claim listing filter. Exactly one of `claimer_id` / `owner_id` is
/// normally set.
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    pub claimer_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub post_id: Option<Uuid>,
    pub status: Option<ClaimStatus>,
}
