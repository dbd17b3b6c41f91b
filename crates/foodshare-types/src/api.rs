use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Claim, ClaimStatus, ContactPreference, DietaryTag, FoodCategory, FoodPost, FoodPostImage,
    PostStatus, PostType, RatingSummary, User,
};
use crate::validate::{Checker, FieldError, Validate};

pub const MAX_TITLE: usize = 120;
pub const MAX_DESCRIPTION: usize = 2000;
pub const MAX_QUANTITY: usize = 100;
pub const MAX_CLAIM_MESSAGE: usize = 1000;
pub const MAX_MESSAGE_CONTENT: usize = 2000;
pub const MAX_RATING_COMMENT: usize = 1000;
pub const MAX_RATING_CATEGORIES: usize = 10;
pub const MAX_RATING_CATEGORY_LEN: usize = 32;

fn valid_latitude(lat: f64) -> bool {
    lat.is_finite() && (-90.0..=90.0).contains(&lat)
}

fn valid_longitude(lng: f64) -> bool {
    lng.is_finite() && (-180.0..=180.0).contains(&lng)
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::new()
            .length(&self.username, "username", 3, 32)
            .check(
                self.username
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_'),
                "username",
                "may only contain letters, digits and underscores",
            )
            .check(
                self.password.len() >= 8,
                "password",
                "must be at least 8 characters",
            )
            .optional_length(self.display_name.as_deref(), "display_name", 64)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::new()
            .length(&self.username, "username", 1, 32)
            .length(&self.password, "password", 1, 1024)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user: User,
    /// Same JWT the session cookie carries, for clients that send bearer headers.
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub user: User,
    pub rating: RatingSummary,
}

// -- Posts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub post_type: PostType,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub quantity: String,
    pub category: FoodCategory,
    #[serde(default)]
    pub dietary_tags: BTreeSet<DietaryTag>,
    pub latitude: f64,
    pub longitude: f64,
    pub expires_at: DateTime<Utc>,
}

impl Validate for CreatePostRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::new()
            .length(&self.title, "title", 1, MAX_TITLE)
            .optional_length(Some(&self.description), "description", MAX_DESCRIPTION)
            .length(&self.quantity, "quantity", 1, MAX_QUANTITY)
            .check(valid_latitude(self.latitude), "latitude", "must be between -90 and 90")
            .check(
                valid_longitude(self.longitude),
                "longitude",
                "must be between -180 and 180",
            )
            .check(self.expires_at > Utc::now(), "expires_at", "must be in the future")
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<String>,
    pub category: Option<FoodCategory>,
    pub dietary_tags: Option<BTreeSet<DietaryTag>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Only `cancelled` is accepted; every other status is driven by claims.
    pub status: Option<PostStatus>,
}

impl Validate for UpdatePostRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut checker = Checker::new();
        if let Some(title) = &self.title {
            checker.length(title, "title", 1, MAX_TITLE);
        }
        if let Some(quantity) = &self.quantity {
            checker.length(quantity, "quantity", 1, MAX_QUANTITY);
        }
        checker
            .optional_length(self.description.as_deref(), "description", MAX_DESCRIPTION)
            .check(
                self.latitude.is_none_or(valid_latitude),
                "latitude",
                "must be between -90 and 90",
            )
            .check(
                self.longitude.is_none_or(valid_longitude),
                "longitude",
                "must be between -180 and 180",
            )
            .check(
                self.expires_at.is_none_or(|at| at > Utc::now()),
                "expires_at",
                "must be in the future",
            )
            .check(
                self.status.is_none_or(|s| s == PostStatus::Cancelled),
                "status",
                "only 'cancelled' may be set directly",
            )
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostQuery {
    pub post_type: Option<PostType>,
    pub category: Option<FoodCategory>,
    pub status: Option<PostStatus>,
    pub owner_id: Option<Uuid>,
    pub dietary: Option<DietaryTag>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Validate for PostQuery {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let near = [self.lat.is_some(), self.lng.is_some(), self.radius_km.is_some()];
        Checker::new()
            .check(
                near.iter().all(|b| *b) || near.iter().all(|b| !*b),
                "radius_km",
                "lat, lng and radius_km must be given together",
            )
            .check(self.lat.is_none_or(valid_latitude), "lat", "must be between -90 and 90")
            .check(
                self.lng.is_none_or(valid_longitude),
                "lng",
                "must be between -180 and 180",
            )
            .check(
                self.radius_km.is_none_or(|r| r.is_finite() && r > 0.0),
                "radius_km",
                "must be positive",
            )
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostResponse {
    #[serde(flatten)]
    pub post: FoodPost,
    pub images: Vec<FoodPostImage>,
}

// -- Claims --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateClaimRequest {
    pub post_id: Uuid,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub contact_preference: ContactPreference,
}

impl Validate for CreateClaimRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::new()
            .optional_length(self.message.as_deref(), "message", MAX_CLAIM_MESSAGE)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateClaimRequest {
    pub status: ClaimStatus,
}

impl Validate for UpdateClaimRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::new()
            .check(
                self.status != ClaimStatus::Pending,
                "status",
                "a claim cannot be moved back to 'pending'",
            )
            .finish()
    }
}

/// Which side of the exchange a claim listing is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimListRole {
    /// Claims the caller made.
    #[default]
    Claimer,
    /// Claims on the caller's posts.
    Owner,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimQuery {
    #[serde(default)]
    pub role: ClaimListRole,
    pub status: Option<ClaimStatus>,
    pub post_id: Option<Uuid>,
}

impl Validate for ClaimQuery {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimResponse {
    #[serde(flatten)]
    pub claim: Claim,
    pub post: FoodPost,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HandoverCodeResponse {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyHandoverRequest {
    pub code: String,
}

impl Validate for VerifyHandoverRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::new().length(&self.code, "code", 1, 32).finish()
    }
}

// -- Ratings --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateRequest {
    pub to_user_id: Uuid,
    /// Range is enforced by the rating subsystem, not here.
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Validate for RateRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::new()
            .optional_length(self.comment.as_deref(), "comment", MAX_RATING_COMMENT)
            .check(
                self.categories.len() <= MAX_RATING_CATEGORIES,
                "categories",
                "too many categories",
            )
            .check(
                self.categories
                    .iter()
                    .all(|c| !c.trim().is_empty() && c.chars().count() <= MAX_RATING_CATEGORY_LEN),
                "categories",
                "each category must be 1-32 characters",
            )
            .finish()
    }
}

// -- Notifications --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<u32>,
}

impl Validate for NotificationQuery {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::new()
            .check(
                self.limit.is_none_or(|l| (1..=200).contains(&l)),
                "limit",
                "must be between 1 and 200",
            )
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkNotificationsRequest {
    /// Marks these; `None` marks every notification of the caller.
    #[serde(default)]
    pub ids: Option<Vec<Uuid>>,
}

impl Validate for MarkNotificationsRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::new()
            .check(
                self.ids.as_ref().is_none_or(|ids| ids.len() <= 500),
                "ids",
                "at most 500 ids per request",
            )
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkedResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread: u64,
}

// -- Messages --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageQuery {
    /// Only messages created after this instant.
    pub after: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl Validate for MessageQuery {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::new()
            .check(
                self.limit.is_none_or(|l| (1..=500).contains(&l)),
                "limit",
                "must be between 1 and 500",
            )
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

impl Validate for SendMessageRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::new()
            .length(&self.content, "content", 1, MAX_MESSAGE_CONTENT)
            .finish()
    }
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}
