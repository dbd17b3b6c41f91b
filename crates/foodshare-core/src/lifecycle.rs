//! Claim lifecycle state machine.
//!
//! ```text
//! pending ──approve──▶ approved ──start──▶ in_progress
//!    │                    │  │                    │
//!    │ reject/cancel      │  └──────complete──────┴──▶ completed
//!    ▼                    └──post withdrawn──▶ cancelled
//! rejected / cancelled
//! ```
//!
//! A post has at most one live claim at a time. Every function here
//! expects to run inside the caller's transaction and writes the claim, its
//! post and the resulting notifications together.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use foodshare_db::is_constraint_violation;
use foodshare_db::queries::{claims, posts, users};
use foodshare_types::models::{
    Claim, ClaimStatus, ContactPreference, FoodPost, NotificationKind, PostStatus, RelatedType,
};

use crate::authz;
use crate::error::{MarketError, MarketResult};
use crate::notify::{self, Notice};

#[derive(Debug, Clone)]
pub struct NewClaim {
    pub post_id: Uuid,
    pub claimer_id: Uuid,
    pub message: Option<String>,
    pub contact_preference: ContactPreference,
}

/// Loads a claim together with the post it targets.
pub fn load(conn: &Connection, claim_id: Uuid) -> MarketResult<(Claim, FoodPost)> {
    let claim = claims::get(conn, claim_id)?.ok_or(MarketError::NotFound("claim"))?;
    let post = posts::get(conn, claim.post_id)?.ok_or(MarketError::NotFound("post"))?;
    Ok((claim, post))
}

/// Reads a claim on behalf of one of its parties.
pub fn view(conn: &Connection, claim_id: Uuid, caller: Uuid, now: DateTime<Utc>) -> MarketResult<(Claim, FoodPost)> {
    let (claim, post) = load(conn, claim_id)?;
    authz::require_party(caller, &post, &claim)?;
    Ok((claim, post.as_of(now)))
}

fn display_name(conn: &Connection, user_id: Uuid) -> MarketResult<String> {
    Ok(users::by_id(conn, user_id)?
        .map(|u| u.display_name.unwrap_or(u.username))
        .unwrap_or_else(|| "Someone".to_string()))
}

/// Moves a post along one of its allowed edges.
fn move_post(conn: &Connection, post: &FoodPost, next: PostStatus, now: DateTime<Utc>) -> MarketResult<()> {
    if post.status == next {
        return Ok(());
    }
    if !post.status.can_transition_to(next) {
        return Err(MarketError::invalid_state(format!(
            "post cannot go from '{}' to '{}'",
            post.status, next
        )));
    }
    posts::set_status(conn, post.id, next, now)?;
    Ok(())
}

fn set_claim_status(conn: &Connection, claim: &mut Claim, next: ClaimStatus, now: DateTime<Utc>) -> MarketResult<()> {
    claims::set_status(conn, claim.id, next, now)?;
    claim.status = next;
    claim.updated_at = now;
    Ok(())
}

fn already_claimed() -> MarketError {
    MarketError::Conflict("this post already has an active claim".into())
}

/// Inserts a claim, reporting a hit on the one-live-claim index as
/// `Conflict`.
fn insert_claim(conn: &Connection, claim: &Claim) -> MarketResult<()> {
    claims::insert(conn, claim).map_err(|e| {
        if is_constraint_violation(&e) {
            already_claimed()
        } else {
            MarketError::Storage(e)
        }
    })
}

pub fn create_claim(conn: &Connection, new: NewClaim, now: DateTime<Utc>) -> MarketResult<Claim> {
    let post = posts::get(conn, new.post_id)?.ok_or(MarketError::NotFound("post"))?;

    let status = post.effective_status(now);
    if status != PostStatus::Available {
        return Err(MarketError::invalid_state(format!("post is {}", status)));
    }
    if new.claimer_id == post.owner_id {
        return Err(MarketError::forbidden("cannot claim your own post"));
    }
    if claims::active_for_post(conn, post.id)?.is_some() {
        return Err(already_claimed());
    }

    let claim = Claim {
        id: Uuid::new_v4(),
        post_id: post.id,
        claimer_id: new.claimer_id,
        status: ClaimStatus::Pending,
        message: new.message,
        contact_preference: new.contact_preference,
        handover_code: None,
        handover_code_expires_at: None,
        handover_verified: false,
        created_at: now,
        updated_at: now,
    };
    insert_claim(conn, &claim)?;

    let who = display_name(conn, claim.claimer_id)?;
    notify::send(
        conn,
        Notice::new(
            post.owner_id,
            NotificationKind::ClaimRequest,
            "New claim request",
            format!("{} would like \"{}\"", who, post.title),
        )
        .about(claim.id, RelatedType::Claim),
        now,
    )?;

    info!("Claim {} created on post {} by {}", claim.id, post.id, claim.claimer_id);
    Ok(claim)
}

/// Applies a caller-requested status change. Role is checked before the
/// edge: a role that may never request `target` gets `Forbidden`, an
/// allowed role on a missing edge gets `InvalidState`.
pub fn transition(
    conn: &Connection,
    claim_id: Uuid,
    caller: Uuid,
    target: ClaimStatus,
    now: DateTime<Utc>,
) -> MarketResult<Claim> {
    let (mut claim, post) = load(conn, claim_id)?;
    let party = authz::authorize_transition(caller, &post, &claim, target)?;

    if !claim.status.can_transition_to(target) {
        return Err(MarketError::invalid_state(format!(
            "claim cannot go from '{}' to '{}'",
            claim.status, target
        )));
    }

    match target {
        ClaimStatus::Approved => approve(conn, &mut claim, &post, now)?,
        ClaimStatus::Rejected => reject(conn, &mut claim, &post, now)?,
        ClaimStatus::Cancelled => cancel(conn, &mut claim, &post, now)?,
        ClaimStatus::InProgress => start(conn, &mut claim, &post, now)?,
        ClaimStatus::Completed => complete(conn, &mut claim, &post, now)?,
        ClaimStatus::Pending => {
            return Err(MarketError::invalid_state("no edge leads back to pending"));
        }
    }

    info!(
        "Claim {} -> {} by {} ({:?})",
        claim.id, claim.status, caller, party
    );
    Ok(claim)
}

fn approve(conn: &Connection, claim: &mut Claim, post: &FoodPost, now: DateTime<Utc>) -> MarketResult<()> {
    if post.effective_status(now) != PostStatus::Available {
        return Err(MarketError::invalid_state(format!(
            "post is {}",
            post.effective_status(now)
        )));
    }

    set_claim_status(conn, claim, ClaimStatus::Approved, now)?;
    move_post(conn, post, PostStatus::Claimed, now)?;

    let siblings = claims::list_for_post(conn, post.id, Some(ClaimStatus::Pending))?;
    let mut notices = Vec::with_capacity(siblings.len() + 1);
    for mut sibling in siblings.into_iter().filter(|c| c.id != claim.id) {
        set_claim_status(conn, &mut sibling, ClaimStatus::Rejected, now)?;
        notices.push(
            Notice::new(
                sibling.claimer_id,
                NotificationKind::ClaimRejected,
                "Claim declined",
                format!("\"{}\" went to someone else", post.title),
            )
            .about(sibling.id, RelatedType::Claim),
        );
    }
    notices.push(
        Notice::new(
            claim.claimer_id,
            NotificationKind::ClaimAccepted,
            "Claim approved",
            format!("Your claim on \"{}\" was approved", post.title),
        )
        .about(claim.id, RelatedType::Claim),
    );
    notify::fan_out(conn, notices, now)?;
    Ok(())
}

fn reject(conn: &Connection, claim: &mut Claim, post: &FoodPost, now: DateTime<Utc>) -> MarketResult<()> {
    set_claim_status(conn, claim, ClaimStatus::Rejected, now)?;
    notify::send(
        conn,
        Notice::new(
            claim.claimer_id,
            NotificationKind::ClaimRejected,
            "Claim declined",
            format!("Your claim on \"{}\" was declined", post.title),
        )
        .about(claim.id, RelatedType::Claim),
        now,
    )?;
    Ok(())
}

/// Claimer withdraws a pending claim. Once approved, only the owner
/// withdrawing the post cancels it.
fn cancel(conn: &Connection, claim: &mut Claim, post: &FoodPost, now: DateTime<Utc>) -> MarketResult<()> {
    if claim.status != ClaimStatus::Pending {
        return Err(MarketError::invalid_state(format!(
            "a {} claim can no longer be withdrawn",
            claim.status
        )));
    }
    set_claim_status(conn, claim, ClaimStatus::Cancelled, now)?;

    let who = display_name(conn, claim.claimer_id)?;
    notify::send(
        conn,
        Notice::new(
            post.owner_id,
            NotificationKind::ClaimCancelled,
            "Claim cancelled",
            format!("{} cancelled their claim on \"{}\"", who, post.title),
        )
        .about(claim.id, RelatedType::Claim),
        now,
    )?;
    Ok(())
}

fn start(conn: &Connection, claim: &mut Claim, post: &FoodPost, now: DateTime<Utc>) -> MarketResult<()> {
    set_claim_status(conn, claim, ClaimStatus::InProgress, now)?;
    move_post(conn, post, PostStatus::InProgress, now)?;
    notify::send(
        conn,
        Notice::new(
            post.owner_id,
            NotificationKind::ClaimInProgress,
            "Pickup on the way",
            format!("The claimer is on the way for \"{}\"", post.title),
        )
        .about(claim.id, RelatedType::Claim),
        now,
    )?;
    Ok(())
}

/// Completes a claim and its post and tells both parties. Also the tail of
/// a successful handover verification.
pub(crate) fn complete(conn: &Connection, claim: &mut Claim, post: &FoodPost, now: DateTime<Utc>) -> MarketResult<()> {
    if !claim.status.can_transition_to(ClaimStatus::Completed) {
        return Err(MarketError::invalid_state(format!(
            "claim cannot go from '{}' to 'completed'",
            claim.status
        )));
    }
    set_claim_status(conn, claim, ClaimStatus::Completed, now)?;
    move_post(conn, post, PostStatus::Completed, now)?;

    let notices = [post.owner_id, claim.claimer_id].map(|recipient| {
        Notice::new(
            recipient,
            NotificationKind::ClaimCompleted,
            "Exchange completed",
            format!("\"{}\" has been handed over. Leave a rating!", post.title),
        )
        .about(claim.id, RelatedType::Claim)
    });
    notify::fan_out(conn, notices, now)?;
    Ok(())
}

/// Cancels every live claim on a post the owner is withdrawing.
pub(crate) fn cancel_all_for_post(conn: &Connection, post: &FoodPost, now: DateTime<Utc>) -> MarketResult<usize> {
    let live: Vec<Claim> = claims::list_for_post(conn, post.id, None)?
        .into_iter()
        .filter(|c| c.status.is_active())
        .collect();
    let count = live.len();

    let mut notices = Vec::with_capacity(count);
    for mut claim in live {
        set_claim_status(conn, &mut claim, ClaimStatus::Cancelled, now)?;
        notices.push(
            Notice::new(
                claim.claimer_id,
                NotificationKind::PostCancelled,
                "Post withdrawn",
                format!("\"{}\" is no longer offered", post.title),
            )
            .about(post.id, RelatedType::Post),
        );
    }
    notify::fan_out(conn, notices, now)?;
    Ok(count)
}

/// Hard-deletes a claim the claimer no longer wants on record. Only
/// pending or rejected claims qualify.
pub fn delete_claim(conn: &Connection, claim_id: Uuid, caller: Uuid) -> MarketResult<()> {
    let (claim, _post) = load(conn, claim_id)?;
    authz::require_claimer(caller, &claim)?;
    if !matches!(claim.status, ClaimStatus::Pending | ClaimStatus::Rejected) {
        return Err(MarketError::invalid_state(format!(
            "a {} claim cannot be deleted",
            claim.status
        )));
    }
    claims::delete(conn, claim.id)?;
    info!("Claim {} deleted by {}", claim.id, caller);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seed_post, seed_user, test_db};
    use foodshare_db::Database;
    use foodshare_db::queries::notifications;

    struct Fixture {
        db: Database,
        owner: Uuid,
        claimer: Uuid,
        post: FoodPost,
    }

    fn fixture() -> Fixture {
        let db = test_db();
        let owner = seed_user(&db, "owner");
        let claimer = seed_user(&db, "claimer");
        let post = seed_post(&db, owner);
        Fixture { db, owner, claimer, post }
    }

    fn claim_as(db: &Database, post_id: Uuid, claimer_id: Uuid) -> MarketResult<Claim> {
        db.with_tx(|tx| {
            create_claim(
                tx,
                NewClaim {
                    post_id,
                    claimer_id,
                    message: Some("Can pick up tonight".into()),
                    contact_preference: ContactPreference::InApp,
                },
                Utc::now(),
            )
        })
    }

    fn step(db: &Database, claim_id: Uuid, caller: Uuid, target: ClaimStatus) -> MarketResult<Claim> {
        db.with_tx(|tx| transition(tx, claim_id, caller, target, Utc::now()))
    }

    fn status_of(db: &Database, claim_id: Uuid) -> ClaimStatus {
        db.get_claim(claim_id).unwrap().unwrap().status
    }

    fn post_status(db: &Database, post_id: Uuid) -> PostStatus {
        db.get_post(post_id).unwrap().unwrap().status
    }

    fn kinds_for(db: &Database, user: Uuid) -> Vec<NotificationKind> {
        db.with_conn(|conn| notifications::list_for_user(conn, user, false, 100))
            .unwrap()
            .into_iter()
            .map(|n| n.kind)
            .collect()
    }

    #[test]
    fn create_notifies_owner() {
        let f = fixture();
        let claim = claim_as(&f.db, f.post.id, f.claimer).unwrap();
        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(kinds_for(&f.db, f.owner), vec![NotificationKind::ClaimRequest]);
        assert_eq!(post_status(&f.db, f.post.id), PostStatus::Available);
    }

    #[test]
    fn cannot_claim_own_post() {
        let f = fixture();
        let err = claim_as(&f.db, f.post.id, f.owner).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }

    #[test]
    fn cannot_claim_missing_or_unavailable_post() {
        let f = fixture();
        assert!(matches!(
            claim_as(&f.db, Uuid::new_v4(), f.claimer),
            Err(MarketError::NotFound("post"))
        ));

        let claim = claim_as(&f.db, f.post.id, f.claimer).unwrap();
        step(&f.db, claim.id, f.owner, ClaimStatus::Approved).unwrap();

        let late = seed_user(&f.db, "late");
        assert!(matches!(
            claim_as(&f.db, f.post.id, late),
            Err(MarketError::InvalidState(_))
        ));
    }

    #[test]
    fn expired_post_cannot_be_claimed() {
        let f = fixture();
        f.db.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE food_posts SET expires_at = ?2 WHERE id = ?1",
                rusqlite::params![f.post.id.to_string(), Utc::now() - chrono::Duration::minutes(1)],
            )?;
            Ok(())
        })
        .unwrap();

        let err = claim_as(&f.db, f.post.id, f.claimer).unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
        // Storage is untouched; only reads see the expiry.
        assert_eq!(post_status(&f.db, f.post.id), PostStatus::Available);
    }

    #[test]
    fn second_claim_on_a_post_conflicts() {
        let f = fixture();
        let other = seed_user(&f.db, "other");
        let first = claim_as(&f.db, f.post.id, f.claimer).unwrap();

        for who in [f.claimer, other] {
            let err = claim_as(&f.db, f.post.id, who).unwrap_err();
            assert!(matches!(err, MarketError::Conflict(_)));
        }
        assert_eq!(kinds_for(&f.db, f.owner), vec![NotificationKind::ClaimRequest]);

        // A closed claim frees the post.
        step(&f.db, first.id, f.claimer, ClaimStatus::Cancelled).unwrap();
        let next = claim_as(&f.db, f.post.id, other).unwrap();
        step(&f.db, next.id, f.owner, ClaimStatus::Rejected).unwrap();
        claim_as(&f.db, f.post.id, f.claimer).unwrap();
    }

    #[test]
    fn index_hit_reports_conflict() {
        let f = fixture();
        let other = seed_user(&f.db, "other");
        let live = claim_as(&f.db, f.post.id, f.claimer).unwrap();

        let mut racer = live.clone();
        racer.id = Uuid::new_v4();
        racer.claimer_id = other;
        let err = f.db.with_tx(|tx| insert_claim(tx, &racer)).unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));
        assert!(f.db.get_claim(racer.id).unwrap().is_none());
    }

    #[test]
    fn approve_claims_the_post() {
        let f = fixture();
        let chosen = claim_as(&f.db, f.post.id, f.claimer).unwrap();

        let approved = step(&f.db, chosen.id, f.owner, ClaimStatus::Approved).unwrap();
        assert_eq!(approved.status, ClaimStatus::Approved);
        assert_eq!(post_status(&f.db, f.post.id), PostStatus::Claimed);
        assert_eq!(kinds_for(&f.db, f.claimer), vec![NotificationKind::ClaimAccepted]);

        let late = seed_user(&f.db, "late");
        assert!(matches!(
            claim_as(&f.db, f.post.id, late),
            Err(MarketError::InvalidState(_))
        ));
    }

    #[test]
    fn roles_are_asymmetric() {
        let f = fixture();
        let claim = claim_as(&f.db, f.post.id, f.claimer).unwrap();

        // Claimer may not approve their own claim, owner may not cancel it.
        for (caller, target) in [
            (f.claimer, ClaimStatus::Approved),
            (f.claimer, ClaimStatus::Rejected),
            (f.owner, ClaimStatus::Cancelled),
            (f.owner, ClaimStatus::InProgress),
        ] {
            let err = step(&f.db, claim.id, caller, target).unwrap_err();
            assert!(matches!(err, MarketError::Forbidden(_)), "{target}");
            assert_eq!(status_of(&f.db, claim.id), ClaimStatus::Pending);
        }

        let stranger = seed_user(&f.db, "stranger");
        let err = step(&f.db, claim.id, stranger, ClaimStatus::Completed).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }

    #[test]
    fn missing_edges_are_invalid_state() {
        let f = fixture();
        let claim = claim_as(&f.db, f.post.id, f.claimer).unwrap();

        // Allowed roles, but no pending -> completed / in_progress edge.
        for (caller, target) in [
            (f.owner, ClaimStatus::Completed),
            (f.claimer, ClaimStatus::Completed),
            (f.claimer, ClaimStatus::InProgress),
        ] {
            let err = step(&f.db, claim.id, caller, target).unwrap_err();
            assert!(matches!(err, MarketError::InvalidState(_)), "{target}");
        }

        step(&f.db, claim.id, f.owner, ClaimStatus::Rejected).unwrap();
        let err = step(&f.db, claim.id, f.owner, ClaimStatus::Approved).unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
        assert_eq!(status_of(&f.db, claim.id), ClaimStatus::Rejected);
        assert_eq!(post_status(&f.db, f.post.id), PostStatus::Available);
    }

    #[test]
    fn either_party_completes() {
        for by_owner in [true, false] {
            let f = fixture();
            let claim = claim_as(&f.db, f.post.id, f.claimer).unwrap();
            step(&f.db, claim.id, f.owner, ClaimStatus::Approved).unwrap();

            let caller = if by_owner { f.owner } else { f.claimer };
            let done = step(&f.db, claim.id, caller, ClaimStatus::Completed).unwrap();
            assert_eq!(done.status, ClaimStatus::Completed);
            assert_eq!(post_status(&f.db, f.post.id), PostStatus::Completed);
            assert!(kinds_for(&f.db, f.owner).contains(&NotificationKind::ClaimCompleted));
            assert!(kinds_for(&f.db, f.claimer).contains(&NotificationKind::ClaimCompleted));
        }
    }

    #[test]
    fn in_progress_then_complete() {
        let f = fixture();
        let claim = claim_as(&f.db, f.post.id, f.claimer).unwrap();
        step(&f.db, claim.id, f.owner, ClaimStatus::Approved).unwrap();
        step(&f.db, claim.id, f.claimer, ClaimStatus::InProgress).unwrap();
        assert_eq!(post_status(&f.db, f.post.id), PostStatus::InProgress);

        step(&f.db, claim.id, f.owner, ClaimStatus::Completed).unwrap();
        assert_eq!(post_status(&f.db, f.post.id), PostStatus::Completed);

        let err = step(&f.db, claim.id, f.claimer, ClaimStatus::Cancelled).unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
    }

    #[test]
    fn claimer_cannot_withdraw_after_approval() {
        let f = fixture();
        let claim = claim_as(&f.db, f.post.id, f.claimer).unwrap();
        step(&f.db, claim.id, f.owner, ClaimStatus::Approved).unwrap();

        let err = step(&f.db, claim.id, f.claimer, ClaimStatus::Cancelled).unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
        assert_eq!(status_of(&f.db, claim.id), ClaimStatus::Approved);
        assert_eq!(post_status(&f.db, f.post.id), PostStatus::Claimed);

        step(&f.db, claim.id, f.claimer, ClaimStatus::InProgress).unwrap();
        let err = step(&f.db, claim.id, f.claimer, ClaimStatus::Cancelled).unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
        assert_eq!(status_of(&f.db, claim.id), ClaimStatus::InProgress);
        assert_eq!(post_status(&f.db, f.post.id), PostStatus::InProgress);
    }

    #[test]
    fn withdrawing_a_pending_claim_notifies_owner() {
        let f = fixture();
        let claim = claim_as(&f.db, f.post.id, f.claimer).unwrap();
        let cancelled = step(&f.db, claim.id, f.claimer, ClaimStatus::Cancelled).unwrap();
        assert_eq!(cancelled.status, ClaimStatus::Cancelled);
        assert_eq!(post_status(&f.db, f.post.id), PostStatus::Available);
        assert!(kinds_for(&f.db, f.owner).contains(&NotificationKind::ClaimCancelled));
    }

    #[test]
    fn delete_only_pending_or_rejected() {
        let f = fixture();
        let claim = claim_as(&f.db, f.post.id, f.claimer).unwrap();

        let err = f.db.with_tx(|tx| delete_claim(tx, claim.id, f.owner)).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        step(&f.db, claim.id, f.owner, ClaimStatus::Approved).unwrap();
        let err = f.db.with_tx(|tx| delete_claim(tx, claim.id, f.claimer)).unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));

        let other = seed_post(&f.db, f.owner);
        let pending = claim_as(&f.db, other.id, f.claimer).unwrap();
        f.db.with_tx(|tx| delete_claim(tx, pending.id, f.claimer)).unwrap();
        assert!(f.db.get_claim(pending.id).unwrap().is_none());
    }

    #[test]
    fn failed_notification_rolls_back_transition() {
        let f = fixture();
        let claim = claim_as(&f.db, f.post.id, f.claimer).unwrap();
        f.db.with_conn_mut(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_notifications BEFORE INSERT ON notifications
                 BEGIN SELECT RAISE(ABORT, 'notifications offline'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let err = step(&f.db, claim.id, f.owner, ClaimStatus::Approved).unwrap_err();
        assert!(matches!(err, MarketError::Storage(_)));
        assert_eq!(status_of(&f.db, claim.id), ClaimStatus::Pending);
        assert_eq!(post_status(&f.db, f.post.id), PostStatus::Available);
    }
}
