use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use foodshare_db::models::{ClaimFilter, Near, PostFilter, UserRow};
use foodshare_db::queries::{claims, images, notifications, ratings as rating_rows, users};
use foodshare_db::{Database, is_constraint_violation};
use foodshare_types::api::{
    ClaimListRole, ClaimQuery, ClaimResponse, CreateClaimRequest, CreatePostRequest,
    HandoverCodeResponse, NotificationQuery, PostQuery, PostResponse, RateRequest,
    UpdatePostRequest, UserProfile,
};
use foodshare_types::models::{ClaimStatus, FoodPostImage, Message, Notification, Rating, User};

use crate::error::{MarketError, MarketResult};
use crate::lifecycle::{self, NewClaim};
use crate::ratings::RatingInput;
use crate::{handover, messaging, notify, posts, ratings};

pub const MAX_POST_PAGE: u32 = 100;

#[derive(Debug, Clone)]
pub struct MarketSettings {
    /// How long a handover code stays valid after it is issued.
    pub handover_ttl: Duration,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            handover_ttl: Duration::hours(24),
        }
    }
}

/// Entry point for every marketplace operation. Each call is one
/// transaction stamped with one `now`. Calls block; async callers should
/// run them on a blocking thread.
pub struct Marketplace {
    db: Database,
    settings: MarketSettings,
}

impl Marketplace {
    pub fn new(db: Database, settings: MarketSettings) -> Self {
        Self { db, settings }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn read<T>(&self, f: impl FnOnce(&Connection, DateTime<Utc>) -> MarketResult<T>) -> MarketResult<T> {
        let now = Utc::now();
        self.db.with_conn(|conn| Ok(f(conn, now)))?
    }

    fn write<T>(&self, f: impl FnOnce(&Connection, DateTime<Utc>) -> MarketResult<T>) -> MarketResult<T> {
        let now = Utc::now();
        self.db.with_tx(|tx| f(tx, now))
    }

    // -- Users --

    pub fn register(
        &self,
        username: &str,
        display_name: Option<&str>,
        password_hash: &str,
    ) -> MarketResult<User> {
        let taken = || MarketError::Conflict(format!("username '{}' is taken", username));
        self.write(|conn, now| {
            if users::by_username(conn, username)?.is_some() {
                return Err(taken());
            }
            let id = Uuid::new_v4();
            let display_name = display_name.map(str::trim).filter(|d| !d.is_empty());
            users::insert(conn, id, username, display_name, password_hash, now).map_err(|e| {
                if is_constraint_violation(&e) {
                    taken()
                } else {
                    MarketError::Storage(e)
                }
            })?;
            info!("User {} registered as {}", id, username);
            Ok(User {
                id,
                username: username.to_string(),
                display_name: display_name.map(str::to_string),
                created_at: now,
            })
        })
    }

    /// The stored credentials for a login attempt.
    pub fn credentials(&self, username: &str) -> MarketResult<Option<UserRow>> {
        Ok(self.db.get_user_by_username(username)?)
    }

    pub fn profile(&self, user_id: Uuid) -> MarketResult<UserProfile> {
        self.read(|conn, _| {
            let user = users::by_id(conn, user_id)?.ok_or(MarketError::NotFound("user"))?;
            let rating = rating_rows::summary_for_user(conn, user.id)?;
            Ok(UserProfile { user, rating })
        })
    }

    // -- Posts --

    pub fn create_post(&self, owner_id: Uuid, req: CreatePostRequest) -> MarketResult<PostResponse> {
        self.write(|conn, now| {
            let post = posts::create(conn, owner_id, req, now)?;
            Ok(PostResponse { post, images: Vec::new() })
        })
    }

    pub fn get_post(&self, post_id: Uuid) -> MarketResult<PostResponse> {
        self.read(|conn, now| {
            let (post, images) = posts::view(conn, post_id, now)?;
            Ok(PostResponse { post, images })
        })
    }

    pub fn list_posts(&self, query: PostQuery) -> MarketResult<Vec<PostResponse>> {
        self.read(|conn, now| {
            let mut filter = PostFilter::new(now);
            filter.post_type = query.post_type;
            filter.category = query.category;
            filter.status = query.status;
            filter.owner_id = query.owner_id;
            filter.dietary = query.dietary;
            if let (Some(latitude), Some(longitude), Some(radius_km)) = (query.lat, query.lng, query.radius_km) {
                filter.near = Some(Near { latitude, longitude, radius_km });
            }
            if let Some(limit) = query.limit {
                filter.limit = limit.clamp(1, MAX_POST_PAGE);
            }
            filter.offset = query.offset.unwrap_or(0);

            foodshare_db::queries::posts::list(conn, &filter)?
                .into_iter()
                .map(|post| -> MarketResult<PostResponse> {
                    let images = images::list_for_post(conn, post.id)?;
                    Ok(PostResponse { post: post.as_of(now), images })
                })
                .collect()
        })
    }

    pub fn update_post(&self, post_id: Uuid, caller: Uuid, req: UpdatePostRequest) -> MarketResult<PostResponse> {
        self.write(|conn, now| {
            let post = posts::update(conn, post_id, caller, req, now)?;
            let images = images::list_for_post(conn, post.id)?;
            Ok(PostResponse { post, images })
        })
    }

    /// Returns the ids of the deleted post's images.
    pub fn delete_post(&self, post_id: Uuid, caller: Uuid) -> MarketResult<Vec<Uuid>> {
        self.write(|conn, _| posts::delete(conn, post_id, caller))
    }

    // -- Images --

    pub fn add_image(&self, post_id: Uuid, caller: Uuid, content_type: &str, size: u64) -> MarketResult<FoodPostImage> {
        self.write(|conn, now| posts::add_image(conn, post_id, caller, content_type, size, now))
    }

    pub fn remove_image(&self, post_id: Uuid, image_id: Uuid, caller: Uuid) -> MarketResult<()> {
        self.write(|conn, _| posts::remove_image(conn, post_id, image_id, caller))
    }

    pub fn get_image(&self, image_id: Uuid) -> MarketResult<FoodPostImage> {
        self.db.get_image(image_id)?.ok_or(MarketError::NotFound("image"))
    }

    pub fn list_images(&self, post_id: Uuid) -> MarketResult<Vec<FoodPostImage>> {
        self.read(|conn, _| {
            let post = posts::load(conn, post_id)?;
            Ok(images::list_for_post(conn, post.id)?)
        })
    }

    // -- Claims --

    pub fn create_claim(&self, claimer_id: Uuid, req: CreateClaimRequest) -> MarketResult<ClaimResponse> {
        self.write(|conn, now| {
            let message = req.message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty());
            let claim = lifecycle::create_claim(
                conn,
                NewClaim {
                    post_id: req.post_id,
                    claimer_id,
                    message,
                    contact_preference: req.contact_preference,
                },
                now,
            )?;
            let post = posts::load(conn, claim.post_id)?.as_of(now);
            Ok(ClaimResponse { claim, post })
        })
    }

    pub fn get_claim(&self, claim_id: Uuid, caller: Uuid) -> MarketResult<ClaimResponse> {
        self.read(|conn, now| {
            let (claim, post) = lifecycle::view(conn, claim_id, caller, now)?;
            Ok(ClaimResponse { claim, post })
        })
    }

    pub fn list_claims(&self, caller: Uuid, query: ClaimQuery) -> MarketResult<Vec<ClaimResponse>> {
        self.read(|conn, now| {
            let mut filter = ClaimFilter {
                post_id: query.post_id,
                status: query.status,
                ..Default::default()
            };
            match query.role {
                ClaimListRole::Claimer => filter.claimer_id = Some(caller),
                ClaimListRole::Owner => filter.owner_id = Some(caller),
            }
            claims::list(conn, &filter)?
                .into_iter()
                .map(|claim| -> MarketResult<ClaimResponse> {
                    let post = posts::load(conn, claim.post_id)?.as_of(now);
                    Ok(ClaimResponse { claim, post })
                })
                .collect()
        })
    }

    pub fn update_claim(&self, claim_id: Uuid, caller: Uuid, target: ClaimStatus) -> MarketResult<ClaimResponse> {
        self.write(|conn, now| {
            let claim = lifecycle::transition(conn, claim_id, caller, target, now)?;
            let post = posts::load(conn, claim.post_id)?.as_of(now);
            Ok(ClaimResponse { claim, post })
        })
    }

    pub fn delete_claim(&self, claim_id: Uuid, caller: Uuid) -> MarketResult<()> {
        self.write(|conn, _| lifecycle::delete_claim(conn, claim_id, caller))
    }

    // -- Handover --

    pub fn issue_handover_code(&self, claim_id: Uuid, caller: Uuid) -> MarketResult<HandoverCodeResponse> {
        let ttl = self.settings.handover_ttl;
        self.write(|conn, now| {
            let (code, expires_at) =
                handover::generate_code(conn, claim_id, caller, ttl, now, &mut rand::rng())?;
            Ok(HandoverCodeResponse { code, expires_at })
        })
    }

    pub fn verify_handover(&self, claim_id: Uuid, caller: Uuid, code: &str) -> MarketResult<ClaimResponse> {
        self.write(|conn, now| {
            let claim = handover::verify_code(conn, claim_id, caller, code, now)?;
            let post = posts::load(conn, claim.post_id)?.as_of(now);
            Ok(ClaimResponse { claim, post })
        })
    }

    // -- Ratings --

    /// Returns the stored rating and whether it was newly created.
    pub fn rate(&self, claim_id: Uuid, from_user_id: Uuid, req: RateRequest) -> MarketResult<(Rating, bool)> {
        self.write(|conn, now| {
            ratings::submit(
                conn,
                RatingInput {
                    claim_id,
                    from_user_id,
                    to_user_id: req.to_user_id,
                    rating: req.rating,
                    comment: req.comment,
                    categories: req.categories,
                },
                now,
            )
        })
    }

    pub fn claim_ratings(&self, claim_id: Uuid, caller: Uuid) -> MarketResult<Vec<Rating>> {
        self.read(|conn, _| ratings::list_for_claim(conn, claim_id, caller))
    }

    // -- Notifications --

    pub fn notifications(&self, user_id: Uuid, query: NotificationQuery) -> MarketResult<Vec<Notification>> {
        self.read(|conn, _| notify::list(conn, user_id, query.unread_only, query.limit))
    }

    pub fn unread_count(&self, user_id: Uuid) -> MarketResult<u64> {
        Ok(self.db.unread_notification_count(user_id)?)
    }

    /// Marks the given notifications read, or all of them when `ids` is `None`.
    pub fn mark_notifications(&self, user_id: Uuid, ids: Option<Vec<Uuid>>) -> MarketResult<u64> {
        self.write(|conn, _| Ok(notifications::mark_read(conn, user_id, ids.as_deref())?))
    }

    pub fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> MarketResult<()> {
        self.write(|conn, _| notify::mark_one_read(conn, user_id, id))
    }

    pub fn delete_notification(&self, user_id: Uuid, id: Uuid) -> MarketResult<()> {
        self.write(|conn, _| notify::delete(conn, user_id, id))
    }

    // -- Messages --

    pub fn send_message(&self, claim_id: Uuid, sender: Uuid, content: &str) -> MarketResult<Message> {
        self.write(|conn, now| messaging::send(conn, claim_id, sender, content, now))
    }

    /// Reading marks the caller's incoming messages read, so this writes.
    pub fn messages(
        &self,
        claim_id: Uuid,
        caller: Uuid,
        after: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> MarketResult<Vec<Message>> {
        self.write(|conn, _| messaging::list(conn, claim_id, caller, after, limit))
    }
}
