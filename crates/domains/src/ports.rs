//! # Ports
//!
//! Any adapter must implement these traits to be wired into the binary.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;

use crate::errors::Result;
use crate::models::{
    Category, Listing, ListingFilter, ListingId, ListingPatch, NewListing, NewReview,
    PageRequest, Review, ReviewId, UserId,
};

/// Result of an owner-gated mutation. Absence and foreign ownership stay
/// distinguishable so the caller can answer 404 and 403 respectively.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedMutation<T> {
    Applied(T),
    NotFound,
    NotOwner,
}

/// Read-only access to the category table.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Every category, ordered by id.
    async fn list_all(&self) -> Result<Vec<Category>>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn find_by_id(&self, id: ListingId) -> Result<Option<Listing>>;

    /// One page plus the total count for the same filter, read from one
    /// consistent snapshot.
    async fn query(&self, filter: &ListingFilter, page: PageRequest) -> Result<(Vec<Listing>, u64)>;

    /// First `limit` matches in filter order, without counting.
    async fn search(&self, filter: &ListingFilter, limit: u32) -> Result<Vec<Listing>>;

    async fn create(&self, owner: &UserId, listing: NewListing) -> Result<Listing>;

    async fn update_owned(
        &self,
        id: ListingId,
        owner: &UserId,
        patch: ListingPatch,
    ) -> Result<OwnedMutation<Listing>>;

    /// Deletes the row and returns it, so the caller can clean up its images
    /// from exactly the state that was removed.
    async fn delete_owned(&self, id: ListingId, owner: &UserId) -> Result<OwnedMutation<Listing>>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn find_by_id(&self, id: ReviewId) -> Result<Option<Review>>;

    /// Stores the review. A top-level review also refreshes the listing's
    /// aggregate rating within the same write.
    async fn create(&self, review: NewReview) -> Result<Review>;

    /// Top-level reviews of a listing, newest first, with ids below `before`.
    async fn list_top_level(
        &self,
        listing_id: ListingId,
        before: Option<ReviewId>,
        limit: u32,
    ) -> Result<Vec<Review>>;

    /// Direct replies to a review, oldest first, with ids above `after`.
    async fn list_replies(
        &self,
        parent_id: ReviewId,
        after: Option<ReviewId>,
        limit: u32,
    ) -> Result<Vec<Review>>;

    /// Number of direct replies per parent id. Parents without replies may be absent.
    async fn reply_counts(&self, parent_ids: &[ReviewId]) -> Result<HashMap<ReviewId, u64>>;
}

/// External image host.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Stores the bytes and returns the public reference (URL) to persist.
    async fn store(&self, data: Bytes, content_type: &Mime) -> Result<String>;
    /// Removes a previously stored asset by its public reference.
    async fn delete(&self, reference: &str) -> Result<()>;
}

/// Validates bearer tokens issued by the external auth provider.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserId>;
}
