use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned when a stored or submitted tag is outside an enum's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Declares a closed string vocabulary: serde uses snake_case tags and the
/// same tags are what the database stores.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $tag:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $tag),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok($name::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

text_enum!(PostType, "post type" {
    Donation => "donation",
    Request => "request",
});

text_enum!(FoodCategory, "category" {
    Produce => "produce",
    Bakery => "bakery",
    Dairy => "dairy",
    Meat => "meat",
    Seafood => "seafood",
    PreparedMeals => "prepared_meals",
    Pantry => "pantry",
    Beverages => "beverages",
    Frozen => "frozen",
    Other => "other",
});

text_enum!(DietaryTag, "dietary tag" {
    Vegetarian => "vegetarian",
    Vegan => "vegan",
    GlutenFree => "gluten_free",
    DairyFree => "dairy_free",
    NutFree => "nut_free",
    Halal => "halal",
    Kosher => "kosher",
    Organic => "organic",
});

text_enum!(
    /// Stored post status. Readers should go through [`FoodPost::effective_status`],
    /// which folds in the expiry timestamp.
    PostStatus, "post status" {
    Available => "available",
    Claimed => "claimed",
    InProgress => "in_progress",
    Completed => "completed",
    Expired => "expired",
    Cancelled => "cancelled",
});

text_enum!(ClaimStatus, "claim status" {
    Pending => "pending",
    Approved => "approved",
    InProgress => "in_progress",
    Rejected => "rejected",
    Cancelled => "cancelled",
    Completed => "completed",
});

text_enum!(ContactPreference, "contact preference" {
    InApp => "in_app",
    Phone => "phone",
    Email => "email",
});

text_enum!(NotificationKind, "notification type" {
    ClaimRequest => "claim_request",
    ClaimAccepted => "claim_accepted",
    ClaimRejected => "claim_rejected",
    ClaimCancelled => "claim_cancelled",
    ClaimInProgress => "claim_in_progress",
    ClaimCompleted => "claim_completed",
    RatingReceived => "rating_received",
    NewMessage => "new_message",
    PostCancelled => "post_cancelled",
});

text_enum!(RelatedType, "related type" {
    Claim => "claim",
    Post => "post",
    Rating => "rating",
    Message => "message",
});

impl Default for ContactPreference {
    fn default() -> Self {
        ContactPreference::InApp
    }
}

impl PostStatus {
    /// Edges a post may take. The path only moves forward; completed,
    /// expired and cancelled absorb, and only available or claimed posts
    /// may expire or be cancelled.
    pub fn can_transition_to(self, next: PostStatus) -> bool {
        use PostStatus::*;
        matches!(
            (self, next),
            (Available, Claimed)
                | (Available, Expired)
                | (Available, Cancelled)
                | (Claimed, InProgress)
                | (Claimed, Completed)
                | (Claimed, Expired)
                | (Claimed, Cancelled)
                | (InProgress, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PostStatus::Completed | PostStatus::Expired | PostStatus::Cancelled
        )
    }
}

impl ClaimStatus {
    /// `Approved -> Cancelled` is only taken when the owner withdraws the
    /// post; claimers can withdraw a pending claim and nothing later.
    pub fn can_transition_to(self, next: ClaimStatus) -> bool {
        use ClaimStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Approved, InProgress)
                | (Approved, Completed)
                | (Approved, Cancelled)
                | (InProgress, Completed)
        )
    }

    /// Statuses that count against the one-live-claim-per-post rule.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ClaimStatus::Pending | ClaimStatus::Approved | ClaimStatus::InProgress
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ClaimStatus::Rejected | ClaimStatus::Cancelled | ClaimStatus::Completed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodPost {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub post_type: PostType,
    pub title: String,
    pub description: String,
    pub quantity: String,
    pub category: FoodCategory,
    pub dietary_tags: BTreeSet<DietaryTag>,
    pub latitude: f64,
    pub longitude: f64,
    pub expires_at: DateTime<Utc>,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FoodPost {
    /// Expiry is never swept into storage; an available post past its
    /// expiry reads as expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> PostStatus {
        if self.status == PostStatus::Available && self.expires_at <= now {
            PostStatus::Expired
        } else {
            self.status
        }
    }

    /// Returns a copy with `status` replaced by the effective status.
    pub fn as_of(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodPostImage {
    pub id: Uuid,
    pub post_id: Uuid,
    pub content_type: String,
    pub size: u64,
    pub position: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub post_id: Uuid,
    pub claimer_id: Uuid,
    pub status: ClaimStatus,
    pub message: Option<String>,
    pub contact_preference: ContactPreference,
    /// Shared out-of-band by the post owner; never echoed back in claim reads.
    #[serde(skip_serializing, default)]
    pub handover_code: Option<String>,
    pub handover_code_expires_at: Option<DateTime<Utc>>,
    pub handover_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub rating: u8,
    pub comment: Option<String>,
    pub categories: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RatingSummary {
    pub count: u64,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: Option<Uuid>,
    pub related_type: Option<RelatedType>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
