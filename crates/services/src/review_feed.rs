//! # ReviewFeed
//!
//! Client-side view of a review thread that shows a submission immediately.
//! Unconfirmed entries live in a pending list keyed by a correlation id; the
//! server's answer either replaces the entry (confirm) or removes it (reject).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use domains::{ReviewId, ReviewPage, ReviewWithReplies, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReview {
    pub correlation_id: Uuid,
    pub user_id: UserId,
    pub rating: i16,
    pub comment: String,
    pub parent_id: Option<ReviewId>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEntry<'a> {
    Pending(&'a PendingReview),
    Confirmed(&'a ReviewWithReplies),
}

#[derive(Debug, Clone, Default)]
pub struct ReviewFeed {
    /// Newest first.
    pending: Vec<PendingReview>,
    /// Newest first, as served.
    confirmed: Vec<ReviewWithReplies>,
}

impl ReviewFeed {
    pub fn new(page: ReviewPage) -> Self {
        Self {
            pending: Vec::new(),
            confirmed: page.reviews,
        }
    }

    /// Records a submission and returns the id to reconcile it with.
    pub fn submit(
        &mut self,
        user_id: UserId,
        rating: i16,
        comment: &str,
        parent_id: Option<ReviewId>,
    ) -> Uuid {
        let correlation_id = Uuid::new_v4();
        self.pending.insert(
            0,
            PendingReview {
                correlation_id,
                user_id,
                rating: if parent_id.is_some() { 0 } else { rating },
                comment: comment.trim().to_string(),
                parent_id,
                submitted_at: Utc::now(),
            },
        );
        correlation_id
    }

    /// Swaps the pending entry for the stored review. Returns `false` when the
    /// correlation id is unknown (already reconciled).
    pub fn confirm(&mut self, correlation_id: Uuid, review: ReviewWithReplies) -> bool {
        let Some(pos) = self.position(correlation_id) else {
            return false;
        };
        self.pending.remove(pos);

        if let Some(parent) = review
            .parent_id
            .as_deref()
            .and_then(|pid| self.confirmed.iter_mut().find(|r| r.id == pid))
        {
            parent.reply_count += 1;
        }
        if !self.confirmed.iter().any(|r| r.id == review.id) {
            self.confirmed.insert(0, review);
        }
        true
    }

    /// Drops a pending entry whose submission failed.
    pub fn reject(&mut self, correlation_id: Uuid) -> Option<PendingReview> {
        self.position(correlation_id).map(|pos| self.pending.remove(pos))
    }

    /// Appends a further server page, skipping reviews already shown.
    pub fn extend(&mut self, page: ReviewPage) {
        for review in page.reviews {
            if !self.confirmed.iter().any(|r| r.id == review.id) {
                self.confirmed.push(review);
            }
        }
    }

    /// Pending entries first, then confirmed ones.
    pub fn entries(&self) -> Vec<FeedEntry<'_>> {
        self.pending
            .iter()
            .map(FeedEntry::Pending)
            .chain(self.confirmed.iter().map(FeedEntry::Confirmed))
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn position(&self, correlation_id: Uuid) -> Option<usize> {
        self.pending
            .iter()
            .position(|p| p.correlation_id == correlation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(id: &str, parent: Option<&str>) -> ReviewWithReplies {
        ReviewWithReplies {
            id: id.to_string(),
            user_id: "u".into(),
            listing_id: "1".into(),
            rating: if parent.is_some() { 0 } else { 5 },
            comment: "c".into(),
            parent_id: parent.map(String::from),
            created_at: "2024-01-01T00:00:00.000Z".into(),
            reply_count: 0,
        }
    }

    fn feed() -> ReviewFeed {
        ReviewFeed::new(ReviewPage {
            reviews: vec![confirmed("1", None)],
            next_cursor: None,
        })
    }

    #[test]
    fn submit_shows_pending_entry_first() {
        let mut feed = feed();
        feed.submit(UserId::from("me"), 4, "nice", None);
        let entries = feed.entries();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], FeedEntry::Pending(p) if p.comment == "nice"));
    }

    #[test]
    fn confirm_replaces_by_correlation_id() {
        let mut feed = feed();
        let id = feed.submit(UserId::from("me"), 4, "nice", None);
        assert!(feed.confirm(id, confirmed("2", None)));
        assert_eq!(feed.pending_len(), 0);
        assert!(matches!(feed.entries()[0], FeedEntry::Confirmed(r) if r.id == "2"));
        assert!(!feed.confirm(id, confirmed("2", None)));
    }

    #[test]
    fn confirmed_reply_bumps_parent_count() {
        let mut feed = feed();
        let id = feed.submit(UserId::from("me"), 5, "reply", Some(1));
        assert_eq!(feed.entries().len(), 2);
        feed.confirm(id, confirmed("3", Some("1")));
        let parent = feed
            .entries()
            .into_iter()
            .find_map(|e| match e {
                FeedEntry::Confirmed(r) if r.id == "1" => Some(r.reply_count),
                _ => None,
            })
            .unwrap();
        assert_eq!(parent, 1);
    }

    #[test]
    fn reject_removes_only_that_entry() {
        let mut feed = feed();
        let keep = feed.submit(UserId::from("me"), 3, "a", None);
        let drop = feed.submit(UserId::from("me"), 3, "b", None);
        let removed = feed.reject(drop).unwrap();
        assert_eq!(removed.comment, "b");
        assert_eq!(feed.pending_len(), 1);
        assert!(feed.reject(drop).is_none());
        assert!(feed.reject(keep).is_some());
    }

    #[test]
    fn pending_reply_carries_zero_rating() {
        let mut feed = feed();
        feed.submit(UserId::from("me"), 5, "r", Some(1));
        assert!(matches!(feed.entries()[0], FeedEntry::Pending(p) if p.rating == 0));
    }

    #[test]
    fn extend_skips_duplicates() {
        let mut feed = feed();
        feed.extend(ReviewPage {
            reviews: vec![confirmed("1", None), confirmed("0", None)],
            next_cursor: None,
        });
        assert_eq!(feed.entries().len(), 2);
    }
}
