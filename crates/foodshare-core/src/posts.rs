use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use foodshare_db::models::PostChanges;
use foodshare_db::queries::{images, posts};
use foodshare_types::api::{CreatePostRequest, UpdatePostRequest};
use foodshare_types::models::{FoodPost, FoodPostImage, PostStatus};

use crate::authz;
use crate::error::{MarketError, MarketResult};
use crate::lifecycle;

pub const MAX_IMAGES_PER_POST: u32 = 5;
pub const IMAGE_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

pub fn create(conn: &Connection, owner_id: Uuid, req: CreatePostRequest, now: DateTime<Utc>) -> MarketResult<FoodPost> {
    let post = FoodPost {
        id: Uuid::new_v4(),
        owner_id,
        post_type: req.post_type,
        title: req.title.trim().to_string(),
        description: req.description.trim().to_string(),
        quantity: req.quantity.trim().to_string(),
        category: req.category,
        dietary_tags: req.dietary_tags,
        latitude: req.latitude,
        longitude: req.longitude,
        expires_at: req.expires_at,
        status: PostStatus::Available,
        created_at: now,
        updated_at: now,
    };
    posts::insert(conn, &post)?;
    info!("Post {} ({}) created by {}", post.id, post.post_type, owner_id);
    Ok(post)
}

pub fn load(conn: &Connection, post_id: Uuid) -> MarketResult<FoodPost> {
    posts::get(conn, post_id)?.ok_or(MarketError::NotFound("post"))
}

/// A post as of `now`, with its images.
pub fn view(conn: &Connection, post_id: Uuid, now: DateTime<Utc>) -> MarketResult<(FoodPost, Vec<FoodPostImage>)> {
    let post = load(conn, post_id)?;
    let images = images::list_for_post(conn, post.id)?;
    Ok((post.as_of(now), images))
}

/// Owner edits. Setting `cancelled` withdraws the post and cancels every
/// live claim on it.
pub fn update(
    conn: &Connection,
    post_id: Uuid,
    caller: Uuid,
    req: UpdatePostRequest,
    now: DateTime<Utc>,
) -> MarketResult<FoodPost> {
    let post = load(conn, post_id)?;
    authz::require_post_owner(caller, &post)?;

    let changes = PostChanges {
        title: req.title.map(|t| t.trim().to_string()),
        description: req.description.map(|d| d.trim().to_string()),
        quantity: req.quantity.map(|q| q.trim().to_string()),
        category: req.category,
        dietary_tags: req.dietary_tags,
        latitude: req.latitude,
        longitude: req.longitude,
        expires_at: req.expires_at,
    };

    let current = post.effective_status(now);
    if !changes.is_empty() && current.is_terminal() {
        return Err(MarketError::invalid_state(format!("post is {}", current)));
    }

    match req.status {
        Some(PostStatus::Cancelled) => {
            if !current.can_transition_to(PostStatus::Cancelled) {
                return Err(MarketError::invalid_state(format!(
                    "a {} post cannot be cancelled",
                    current
                )));
            }
            let cancelled = lifecycle::cancel_all_for_post(conn, &post, now)?;
            posts::set_status(conn, post.id, PostStatus::Cancelled, now)?;
            info!("Post {} cancelled ({} claims cancelled)", post.id, cancelled);
        }
        Some(other) => {
            return Err(MarketError::invalid_state(format!(
                "post status '{}' is set by its claims",
                other
            )));
        }
        None => {}
    }

    if !changes.is_empty() {
        posts::update(conn, post.id, &changes, now)?;
    }

    Ok(load(conn, post.id)?.as_of(now))
}

/// Deletes the post and everything hanging off it. Returns the image ids
/// whose files should be removed.
pub fn delete(conn: &Connection, post_id: Uuid, caller: Uuid) -> MarketResult<Vec<Uuid>> {
    let post = load(conn, post_id)?;
    authz::require_post_owner(caller, &post)?;

    let image_ids = images::list_for_post(conn, post.id)?
        .into_iter()
        .map(|i| i.id)
        .collect();
    posts::delete(conn, post.id)?;
    info!("Post {} deleted by {}", post.id, caller);
    Ok(image_ids)
}

/// Registers image metadata after the owner and limit checks pass. The
/// caller writes the bytes.
pub fn add_image(
    conn: &Connection,
    post_id: Uuid,
    caller: Uuid,
    content_type: &str,
    size: u64,
    now: DateTime<Utc>,
) -> MarketResult<FoodPostImage> {
    let post = load(conn, post_id)?;
    authz::require_post_owner(caller, &post)?;

    if !IMAGE_CONTENT_TYPES.contains(&content_type) {
        return Err(MarketError::InvalidInput(format!(
            "unsupported image type '{}'",
            content_type
        )));
    }
    let (count, position) = images::slot_for_post(conn, post.id)?;
    if count >= MAX_IMAGES_PER_POST {
        return Err(MarketError::InvalidInput(format!(
            "a post may have at most {} images",
            MAX_IMAGES_PER_POST
        )));
    }

    let image = FoodPostImage {
        id: Uuid::new_v4(),
        post_id: post.id,
        content_type: content_type.to_string(),
        size,
        position,
        created_at: now,
    };
    images::insert(conn, &image)?;
    Ok(image)
}

pub fn remove_image(conn: &Connection, post_id: Uuid, image_id: Uuid, caller: Uuid) -> MarketResult<()> {
    let post = load(conn, post_id)?;
    authz::require_post_owner(caller, &post)?;

    match images::get(conn, image_id)? {
        Some(image) if image.post_id == post.id => {
            images::delete(conn, image.id)?;
            Ok(())
        }
        _ => Err(MarketError::NotFound("image")),
    }
}
