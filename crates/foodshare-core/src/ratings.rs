use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use foodshare_db::queries::ratings;
use foodshare_types::models::{ClaimStatus, NotificationKind, Rating, RelatedType};

use crate::authz;
use crate::error::{MarketError, MarketResult};
use crate::lifecycle;
use crate::notify::{self, Notice};

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

#[derive(Debug, Clone)]
pub struct RatingInput {
    pub claim_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub rating: i64,
    pub comment: Option<String>,
    pub categories: Vec<String>,
}

/// Trimmed, blank-free, first occurrence wins.
fn normalize_categories(categories: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(categories.len());
    for category in categories {
        let category = category.trim().to_lowercase();
        if !category.is_empty() && !out.contains(&category) {
            out.push(category);
        }
    }
    out
}

/// Records feedback for a completed claim. Resubmitting for the same
/// (claim, from, to) overwrites the earlier rating; the flag says whether a
/// new row was created.
pub fn submit(conn: &Connection, input: RatingInput, now: DateTime<Utc>) -> MarketResult<(Rating, bool)> {
    if !(MIN_RATING..=MAX_RATING).contains(&input.rating) {
        return Err(MarketError::InvalidInput(format!(
            "rating must be between {} and {}",
            MIN_RATING, MAX_RATING
        )));
    }

    let (claim, post) = lifecycle::load(conn, input.claim_id)?;
    authz::require_party(input.from_user_id, &post, &claim)?;
    if authz::party_of(input.to_user_id, &post, &claim).is_none() {
        return Err(MarketError::forbidden("can only rate a party to this claim"));
    }
    if input.from_user_id == input.to_user_id {
        return Err(MarketError::InvalidInput("cannot rate yourself".into()));
    }
    if claim.status != ClaimStatus::Completed {
        return Err(MarketError::invalid_state("claim is not completed"));
    }

    let value = input.rating as u8;
    let comment = input.comment.filter(|c| !c.trim().is_empty());
    let categories = normalize_categories(input.categories);

    let existing = ratings::find(conn, claim.id, input.from_user_id, input.to_user_id)?;
    let created = existing.is_none();
    let rating = match existing {
        Some(mut rating) => {
            rating.rating = value;
            rating.comment = comment;
            rating.categories = categories;
            rating.updated_at = now;
            ratings::update(conn, &rating)?;
            rating
        }
        None => {
            let rating = Rating {
                id: Uuid::new_v4(),
                claim_id: claim.id,
                from_user_id: input.from_user_id,
                to_user_id: input.to_user_id,
                rating: value,
                comment,
                categories,
                created_at: now,
                updated_at: now,
            };
            ratings::insert(conn, &rating)?;
            rating
        }
    };

    notify::send(
        conn,
        Notice::new(
            rating.to_user_id,
            NotificationKind::RatingReceived,
            if created { "New rating" } else { "Rating updated" },
            format!("You were rated {}/5 for \"{}\"", rating.rating, post.title),
        )
        .about(rating.id, RelatedType::Rating),
        now,
    )?;

    info!(
        "Rating {} {} on claim {} ({} -> {})",
        rating.id,
        if created { "created" } else { "updated" },
        claim.id,
        rating.from_user_id,
        rating.to_user_id
    );
    Ok((rating, created))
}

/// Ratings on a claim, visible to its parties.
pub fn list_for_claim(conn: &Connection, claim_id: Uuid, caller: Uuid) -> MarketResult<Vec<Rating>> {
    let (claim, post) = lifecycle::load(conn, claim_id)?;
    authz::require_party(caller, &post, &claim)?;
    Ok(ratings::list_for_claim(conn, claim.id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{NewClaim, create_claim, transition};
    use crate::testing::{seed_post, seed_user, test_db};
    use foodshare_db::Database;
    use foodshare_types::models::ContactPreference;

    struct Done {
        db: Database,
        owner: Uuid,
        claimer: Uuid,
        claim: Uuid,
    }

    fn claim_in(status: ClaimStatus) -> Done {
        let db = test_db();
        let owner = seed_user(&db, "owner");
        let claimer = seed_user(&db, "claimer");
        let post = seed_post(&db, owner);
        let claim = db
            .with_tx(|tx| {
                let now = Utc::now();
                let claim = create_claim(
                    tx,
                    NewClaim {
                        post_id: post.id,
                        claimer_id: claimer,
                        message: None,
                        contact_preference: ContactPreference::InApp,
                    },
                    now,
                )?;
                if status != ClaimStatus::Pending {
                    transition(tx, claim.id, owner, ClaimStatus::Approved, now)?;
                }
                if status == ClaimStatus::Completed {
                    transition(tx, claim.id, claimer, ClaimStatus::Completed, now)?;
                }
                Ok::<_, MarketError>(claim.id)
            })
            .unwrap();
        Done { db, owner, claimer, claim }
    }

    fn rate(d: &Done, from: Uuid, to: Uuid, rating: i64, comment: Option<&str>) -> MarketResult<(Rating, bool)> {
        d.db.with_tx(|tx| {
            submit(
                tx,
                RatingInput {
                    claim_id: d.claim,
                    from_user_id: from,
                    to_user_id: to,
                    rating,
                    comment: comment.map(str::to_string),
                    categories: vec![" Friendly ".into(), "friendly".into(), "on time".into()],
                },
                Utc::now(),
            )
        })
    }

    fn direction_count(d: &Done, from: Uuid, to: Uuid) -> u64 {
        d.db.with_conn(|conn| ratings::count_for_claim_direction(conn, d.claim, from, to))
            .unwrap()
    }

    #[test]
    fn resubmission_updates_in_place() {
        let d = claim_in(ClaimStatus::Completed);
        let (first, created) = rate(&d, d.claimer, d.owner, 5, Some("great")).unwrap();
        assert!(created);
        assert_eq!(first.comment.as_deref(), Some("great"));
        assert_eq!(first.categories, vec!["friendly", "on time"]);

        let (second, created) = rate(&d, d.claimer, d.owner, 3, None).unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.rating, 3);
        assert_eq!(direction_count(&d, d.claimer, d.owner), 1);

        // The other direction is its own row.
        rate(&d, d.owner, d.claimer, 4, None).unwrap();
        assert_eq!(d.db.list_ratings_for_claim(d.claim).unwrap().len(), 2);

        let summary = d.db.rating_summary(d.owner).unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.average, Some(3.0));
    }

    #[test]
    fn out_of_range_creates_nothing() {
        let d = claim_in(ClaimStatus::Completed);
        for bad in [0, 6, -1, 300] {
            let err = rate(&d, d.claimer, d.owner, bad, None).unwrap_err();
            assert!(matches!(err, MarketError::InvalidInput(_)), "{bad}");
        }
        assert_eq!(direction_count(&d, d.claimer, d.owner), 0);
    }

    #[test]
    fn only_completed_claims() {
        let d = claim_in(ClaimStatus::Approved);
        let err = rate(&d, d.claimer, d.owner, 5, None).unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
    }

    #[test]
    fn only_parties_rate_parties() {
        let d = claim_in(ClaimStatus::Completed);
        let outsider = seed_user(&d.db, "outsider");

        let err = rate(&d, outsider, d.owner, 5, None).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
        let err = rate(&d, d.claimer, outsider, 5, None).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
        let err = rate(&d, d.claimer, d.claimer, 5, None).unwrap_err();
        assert!(matches!(err, MarketError::InvalidInput(_)));

        let err = d.db.with_tx(|tx| list_for_claim(tx, d.claim, outsider)).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }
}
