//! # Reviews
//!
//! Threaded reviews: a top-level review carries a 1–5 star rating, a reply
//! points at its parent and always carries 0.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, Result};
use crate::models::{ListingId, UserId};

pub type ReviewId = i64;

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

/// Upper bound for one page of reviews or replies.
pub const MAX_REVIEW_PAGE: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub user_id: UserId,
    pub listing_id: ListingId,
    pub rating: i16,
    pub comment: String,
    pub parent_id: Option<ReviewId>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// A validated review ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub user_id: UserId,
    pub listing_id: ListingId,
    pub rating: i16,
    pub comment: String,
    pub parent_id: Option<ReviewId>,
}

impl NewReview {
    /// Replies ignore any supplied rating and store 0. Top-level reviews
    /// must rate 1–5.
    pub fn new(
        user_id: UserId,
        listing_id: ListingId,
        rating: Option<i16>,
        comment: &str,
        parent_id: Option<ReviewId>,
    ) -> Result<Self> {
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(DomainError::validation("comment must not be empty"));
        }

        let rating = match parent_id {
            Some(_) => 0,
            None => match rating {
                Some(r) if (MIN_RATING..=MAX_RATING).contains(&r) => r,
                Some(r) => {
                    return Err(DomainError::validation(format!(
                        "rating must be between {MIN_RATING} and {MAX_RATING}, got {r}"
                    )))
                }
                None => return Err(DomainError::validation("a review requires a rating")),
            },
        };

        Ok(Self {
            user_id,
            listing_id,
            rating,
            comment: comment.to_string(),
            parent_id,
        })
    }
}

/// Transport shape of a review with its derived reply count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewWithReplies {
    pub id: String,
    pub user_id: String,
    pub listing_id: String,
    pub rating: i16,
    pub comment: String,
    pub parent_id: Option<String>,
    pub created_at: String,
    pub reply_count: u64,
}

impl ReviewWithReplies {
    pub fn new(review: Review, reply_count: u64) -> Self {
        Self {
            id: review.id.to_string(),
            user_id: review.user_id.to_string(),
            listing_id: review.listing_id.to_string(),
            rating: review.rating,
            comment: review.comment,
            parent_id: review.parent_id.map(|id| id.to_string()),
            created_at: review.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            reply_count,
        }
    }
}

/// One cursor page. `next_cursor` is the id to pass back for the next page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPage {
    pub reviews: Vec<ReviewWithReplies>,
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_rating_is_forced_to_zero() {
        let reply = NewReview::new(UserId::from("u"), 1, Some(5), "thanks", Some(7)).unwrap();
        assert_eq!(reply.rating, 0);
        let reply = NewReview::new(UserId::from("u"), 1, None, "thanks", Some(7)).unwrap();
        assert_eq!(reply.rating, 0);
    }

    #[test]
    fn top_level_rating_must_be_in_range() {
        assert!(NewReview::new(UserId::from("u"), 1, Some(0), "meh", None).is_err());
        assert!(NewReview::new(UserId::from("u"), 1, Some(6), "wow", None).is_err());
        assert!(NewReview::new(UserId::from("u"), 1, None, "hm", None).is_err());
        assert_eq!(
            NewReview::new(UserId::from("u"), 1, Some(4), " good ", None)
                .unwrap()
                .comment,
            "good"
        );
    }

    #[test]
    fn blank_comment_is_rejected() {
        assert!(NewReview::new(UserId::from("u"), 1, Some(3), "   ", None).is_err());
    }
}
