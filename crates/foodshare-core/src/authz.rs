//! Ownership and role predicates. Every mutating operation runs one of
//! these before it writes anything.

use uuid::Uuid;

use foodshare_types::models::{Claim, ClaimStatus, FoodPost};

use crate::error::{MarketError, MarketResult};

/// The caller's side of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Owner,
    Claimer,
}

pub fn party_of(user_id: Uuid, post: &FoodPost, claim: &Claim) -> Option<Party> {
    if user_id == post.owner_id {
        Some(Party::Owner)
    } else if user_id == claim.claimer_id {
        Some(Party::Claimer)
    } else {
        None
    }
}

pub fn require_party(user_id: Uuid, post: &FoodPost, claim: &Claim) -> MarketResult<Party> {
    party_of(user_id, post, claim)
        .ok_or_else(|| MarketError::forbidden("not a party to this claim"))
}

pub fn require_post_owner(user_id: Uuid, post: &FoodPost) -> MarketResult<()> {
    if user_id == post.owner_id {
        Ok(())
    } else {
        Err(MarketError::forbidden("only the post owner may do this"))
    }
}

pub fn require_claimer(user_id: Uuid, claim: &Claim) -> MarketResult<()> {
    if user_id == claim.claimer_id {
        Ok(())
    } else {
        Err(MarketError::forbidden("only the claimer may do this"))
    }
}

/// Owners approve, reject and complete; claimers cancel, start and
/// complete.
pub fn may_request(party: Party, target: ClaimStatus) -> bool {
    use ClaimStatus::*;
    match party {
        Party::Owner => matches!(target, Approved | Rejected | Completed),
        Party::Claimer => matches!(target, Cancelled | InProgress | Completed),
    }
}

/// Resolves the caller's party and checks it may request `target`.
/// Says nothing about whether the edge exists from the current status.
pub fn authorize_transition(
    user_id: Uuid,
    post: &FoodPost,
    claim: &Claim,
    target: ClaimStatus,
) -> MarketResult<Party> {
    let party = require_party(user_id, post, claim)?;
    if may_request(party, target) {
        Ok(party)
    } else {
        Err(MarketError::forbidden(format!(
            "a {} may not set a claim to '{}'",
            match party {
                Party::Owner => "post owner",
                Party::Claimer => "claimer",
            },
            target
        )))
    }
}
