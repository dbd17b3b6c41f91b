//! Pickup confirmation codes. The owner generates one for an approved
//! claim and shares it in person; the claimer submits it to complete the
//! exchange.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use foodshare_db::queries::claims;
use foodshare_types::models::{Claim, ClaimStatus};

use crate::authz;
use crate::error::{MarketError, MarketResult};
use crate::lifecycle;

/// Uppercase letters and digits without I, O, 0 and 1.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 6;

pub fn new_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn ensure_handover_window(claim: &Claim) -> MarketResult<()> {
    if matches!(claim.status, ClaimStatus::Approved | ClaimStatus::InProgress) {
        Ok(())
    } else {
        Err(MarketError::invalid_state(format!(
            "no handover for a {} claim",
            claim.status
        )))
    }
}

/// Issues a fresh code, replacing any outstanding one.
pub fn generate_code<R: Rng + ?Sized>(
    conn: &Connection,
    claim_id: Uuid,
    caller: Uuid,
    ttl: Duration,
    now: DateTime<Utc>,
    rng: &mut R,
) -> MarketResult<(String, DateTime<Utc>)> {
    let (claim, post) = lifecycle::load(conn, claim_id)?;
    authz::require_post_owner(caller, &post)?;
    ensure_handover_window(&claim)?;

    let code = new_code(rng);
    let expires_at = now + ttl;
    claims::set_handover_code(conn, claim.id, Some(&code), Some(expires_at), now)?;

    info!("Handover code issued for claim {} (expires {})", claim.id, expires_at);
    Ok((code, expires_at))
}

/// Checks the claimer's code. A match consumes the code and completes the
/// claim; a mismatch changes nothing.
pub fn verify_code(
    conn: &Connection,
    claim_id: Uuid,
    caller: Uuid,
    submitted: &str,
    now: DateTime<Utc>,
) -> MarketResult<Claim> {
    let (mut claim, post) = lifecycle::load(conn, claim_id)?;
    authz::require_claimer(caller, &claim)?;
    ensure_handover_window(&claim)?;

    let Some(expected) = claim.handover_code.as_deref() else {
        return Err(MarketError::invalid_state("no handover code has been issued"));
    };
    if claim.handover_code_expires_at.is_some_and(|at| at <= now) {
        return Err(MarketError::InvalidCode("code has expired"));
    }
    if !codes_match(expected, submitted) {
        return Err(MarketError::InvalidCode("code does not match"));
    }

    claims::mark_handover_verified(conn, claim.id, now)?;
    claim.handover_code = None;
    claim.handover_code_expires_at = None;
    claim.handover_verified = true;

    lifecycle::complete(conn, &mut claim, &post, now)?;
    info!("Handover verified for claim {}", claim.id);
    Ok(claim)
}

/// Exact comparison that does not stop at the first differing byte.
fn codes_match(expected: &str, submitted: &str) -> bool {
    let (a, b) = (expected.as_bytes(), submitted.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{NewClaim, create_claim, transition};
    use crate::testing::{seed_post, seed_user, test_db};
    use foodshare_db::Database;
    use foodshare_types::models::{ContactPreference, PostStatus};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn approved_claim(db: &Database) -> (Uuid, Uuid, Uuid, Uuid) {
        let owner = seed_user(db, "owner");
        let claimer = seed_user(db, "claimer");
        let post = seed_post(db, owner);
        let claim = db
            .with_tx(|tx| {
                let claim = create_claim(
                    tx,
                    NewClaim {
                        post_id: post.id,
                        claimer_id: claimer,
                        message: None,
                        contact_preference: ContactPreference::Phone,
                    },
                    Utc::now(),
                )?;
                transition(tx, claim.id, owner, ClaimStatus::Approved, Utc::now())
            })
            .unwrap();
        (owner, claimer, post.id, claim.id)
    }

    #[test]
    fn codes_use_the_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = new_code(&mut rng);
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
        assert_ne!(new_code(&mut rng), new_code(&mut rng));
    }

    #[test]
    fn only_owner_generates_and_only_when_approved() {
        let db = test_db();
        let (owner, claimer, _post, claim) = approved_claim(&db);
        let mut rng = StdRng::seed_from_u64(1);
        let ttl = Duration::hours(24);

        let err = db
            .with_tx(|tx| generate_code(tx, claim, claimer, ttl, Utc::now(), &mut rng))
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        let now = Utc::now();
        let (code, expires_at) = db
            .with_tx(|tx| generate_code(tx, claim, owner, ttl, now, &mut rng))
            .unwrap();
        assert_eq!(expires_at, now + ttl);
        let stored = db.get_claim(claim).unwrap().unwrap();
        assert_eq!(stored.handover_code.as_deref(), Some(code.as_str()));
    }

    #[test]
    fn exact_match_by_claimer_completes() {
        let db = test_db();
        let (owner, claimer, post, claim) = approved_claim(&db);
        let now = Utc::now();
        db.with_conn_mut(|conn| {
            claims::set_handover_code(conn, claim, Some("X7K9"), Some(now + Duration::hours(1)), now)
        })
        .unwrap();

        // Wrong case, wrong caller, wrong code: nothing changes.
        for (caller, code) in [(claimer, "x7k9"), (owner, "X7K9"), (claimer, "X7K8")] {
            assert!(db.with_tx(|tx| verify_code(tx, claim, caller, code, now)).is_err());
            let stored = db.get_claim(claim).unwrap().unwrap();
            assert_eq!(stored.status, ClaimStatus::Approved);
            assert!(!stored.handover_verified);
        }

        let done = db
            .with_tx(|tx| verify_code(tx, claim, claimer, "X7K9", now))
            .unwrap();
        assert_eq!(done.status, ClaimStatus::Completed);
        assert!(done.handover_verified);
        assert_eq!(db.get_post(post).unwrap().unwrap().status, PostStatus::Completed);

        // Single use.
        let err = db
            .with_tx(|tx| verify_code(tx, claim, claimer, "X7K9", now))
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
    }

    #[test]
    fn expired_code_is_refused() {
        let db = test_db();
        let (owner, claimer, _post, claim) = approved_claim(&db);
        let mut rng = StdRng::seed_from_u64(3);
        let issued = Utc::now();
        let (code, _) = db
            .with_tx(|tx| generate_code(tx, claim, owner, Duration::hours(24), issued, &mut rng))
            .unwrap();

        let later = issued + Duration::hours(25);
        let err = db
            .with_tx(|tx| verify_code(tx, claim, claimer, &code, later))
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidCode("code has expired")));
        assert_eq!(db.get_claim(claim).unwrap().unwrap().status, ClaimStatus::Approved);
    }

    #[test]
    fn pickup_in_progress_still_verifies() {
        let db = test_db();
        let (owner, claimer, post, claim) = approved_claim(&db);
        db.with_tx(|tx| transition(tx, claim, claimer, ClaimStatus::InProgress, Utc::now()))
            .unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let now = Utc::now();
        let (code, _) = db
            .with_tx(|tx| generate_code(tx, claim, owner, Duration::hours(24), now, &mut rng))
            .unwrap();
        let done = db
            .with_tx(|tx| verify_code(tx, claim, claimer, &code, now))
            .unwrap();
        assert_eq!(done.status, ClaimStatus::Completed);
        assert_eq!(db.get_post(post).unwrap().unwrap().status, PostStatus::Completed);
    }

    #[test]
    fn no_code_before_approval() {
        let db = test_db();
        let owner = seed_user(&db, "owner");
        let claimer = seed_user(&db, "claimer");
        let post = seed_post(&db, owner);
        let claim = db
            .with_tx(|tx| {
                create_claim(
                    tx,
                    NewClaim {
                        post_id: post.id,
                        claimer_id: claimer,
                        message: None,
                        contact_preference: ContactPreference::InApp,
                    },
                    Utc::now(),
                )
            })
            .unwrap();

        let mut rng = StdRng::seed_from_u64(9);
        let err = db
            .with_tx(|tx| generate_code(tx, claim.id, owner, Duration::hours(1), Utc::now(), &mut rng))
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
    }
}
