//! # ReviewService
//!
//! Threaded reviews with cursor pagination. Reply counts are derived at read
//! time from a grouped count, never stored.

use std::sync::Arc;

use serde::Deserialize;

use domains::{
    DomainError, ListingId, ListingRepository, NewReview, Result, Review, ReviewId, ReviewPage,
    ReviewRepository, ReviewWithReplies, UserId, MAX_REVIEW_PAGE,
};

use crate::listing_service::{ListingCache, LISTINGS_TAG};

pub const DEFAULT_REVIEW_PAGE: u32 = 10;

/// Body of a review or reply submission.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReview {
    pub rating: Option<i16>,
    pub comment: String,
    pub parent_id: Option<ReviewId>,
}

#[derive(Clone)]
pub struct ReviewService {
    reviews: Arc<dyn ReviewRepository>,
    listings: Arc<dyn ListingRepository>,
    listing_cache: Arc<ListingCache>,
}

impl ReviewService {
    pub fn new(
        reviews: Arc<dyn ReviewRepository>,
        listings: Arc<dyn ListingRepository>,
        listing_cache: Arc<ListingCache>,
    ) -> Self {
        Self {
            reviews,
            listings,
            listing_cache,
        }
    }

    /// Creates a top-level review or, with `parent_id`, a reply.
    pub async fn create_review(
        &self,
        author: &UserId,
        listing_id: ListingId,
        input: CreateReview,
    ) -> Result<ReviewWithReplies> {
        let new = NewReview::new(
            author.clone(),
            listing_id,
            input.rating,
            &input.comment,
            input.parent_id,
        )?;

        if self.listings.find_by_id(listing_id).await?.is_none() {
            return Err(DomainError::not_found("listing", listing_id));
        }
        if let Some(parent_id) = new.parent_id {
            let parent = self
                .reviews
                .find_by_id(parent_id)
                .await?
                .ok_or_else(|| DomainError::not_found("review", parent_id))?;
            if parent.listing_id != listing_id {
                return Err(DomainError::validation(format!(
                    "review {parent_id} belongs to another listing"
                )));
            }
        }

        let review = self.reviews.create(new).await?;
        if !review.is_reply() {
            // the listing's aggregate rating changed
            self.listing_cache.invalidate_tag(LISTINGS_TAG);
        }
        tracing::info!(
            review_id = review.id,
            listing_id,
            reply = review.is_reply(),
            "review created"
        );
        Ok(ReviewWithReplies::new(review, 0))
    }

    /// Top-level reviews of a listing, newest first.
    pub async fn list_reviews(
        &self,
        listing_id: ListingId,
        cursor: Option<ReviewId>,
        limit: Option<u32>,
    ) -> Result<ReviewPage> {
        if self.listings.find_by_id(listing_id).await?.is_none() {
            return Err(DomainError::not_found("listing", listing_id));
        }
        let limit = clamp_limit(limit);
        let rows = self
            .reviews
            .list_top_level(listing_id, cursor, limit + 1)
            .await?;
        self.page(rows, limit).await
    }

    /// Direct replies to a review, oldest first.
    pub async fn list_replies(
        &self,
        parent_id: ReviewId,
        cursor: Option<ReviewId>,
        limit: Option<u32>,
    ) -> Result<ReviewPage> {
        if self.reviews.find_by_id(parent_id).await?.is_none() {
            return Err(DomainError::not_found("review", parent_id));
        }
        let limit = clamp_limit(limit);
        let rows = self.reviews.list_replies(parent_id, cursor, limit + 1).await?;
        self.page(rows, limit).await
    }

    /// Trims the look-ahead row into a cursor and attaches reply counts.
    async fn page(&self, mut rows: Vec<Review>, limit: u32) -> Result<ReviewPage> {
        let has_more = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        let next_cursor = if has_more {
            rows.last().map(|r| r.id.to_string())
        } else {
            None
        };

        let ids: Vec<ReviewId> = rows.iter().map(|r| r.id).collect();
        let counts = if ids.is_empty() {
            Default::default()
        } else {
            self.reviews.reply_counts(&ids).await?
        };

        Ok(ReviewPage {
            reviews: rows
                .into_iter()
                .map(|r| {
                    let replies = counts.get(&r.id).copied().unwrap_or(0);
                    ReviewWithReplies::new(r, replies)
                })
                .collect(),
            next_cursor,
        })
    }
}

fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_REVIEW_PAGE).clamp(1, MAX_REVIEW_PAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::{MockListingRepository, MockReviewRepository};
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::cache::TtlCache;

    fn review(id: ReviewId, listing_id: ListingId, parent_id: Option<ReviewId>) -> Review {
        Review {
            id,
            user_id: UserId::from("someone"),
            listing_id,
            rating: if parent_id.is_some() { 0 } else { 4 },
            comment: "text".into(),
            parent_id,
            created_at: Utc::now(),
        }
    }

    fn existing_listing() -> MockListingRepository {
        let mut listings = MockListingRepository::new();
        listings.expect_find_by_id().returning(|id| {
            if id == 1 {
                let now = Utc::now();
                Ok(Some(domains::Listing {
                    id,
                    title: "Bike".into(),
                    description: String::new(),
                    subcategory_id: 3,
                    price: None,
                    currency: "EUR".into(),
                    town: None,
                    address: None,
                    user_id: UserId::from("seller"),
                    status: domains::ListingStatus::Active,
                    created_at: now,
                    updated_at: now,
                    expires_at: None,
                    views: 0,
                    cover_image: None,
                    images: vec![],
                    is_boosted: false,
                    boost_type: None,
                    boost_expires_at: None,
                    tags: vec![],
                    condition: None,
                    negotiable: false,
                    delivery_available: false,
                    rating: None,
                }))
            } else {
                Ok(None)
            }
        });
        listings
    }

    fn service(reviews: MockReviewRepository) -> ReviewService {
        ReviewService::new(
            Arc::new(reviews),
            Arc::new(existing_listing()),
            Arc::new(TtlCache::new(Duration::from_secs(60))),
        )
    }

    #[tokio::test]
    async fn reply_is_stored_with_zero_rating() {
        let mut reviews = MockReviewRepository::new();
        reviews
            .expect_find_by_id()
            .returning(|id| Ok(Some(review(id, 1, None))));
        reviews
            .expect_create()
            .withf(|new| new.rating == 0 && new.parent_id == Some(10))
            .returning(|new| {
                Ok(Review {
                    id: 11,
                    user_id: new.user_id,
                    listing_id: new.listing_id,
                    rating: new.rating,
                    comment: new.comment,
                    parent_id: new.parent_id,
                    created_at: Utc::now(),
                })
            });
        let svc = service(reviews);

        let input = CreateReview {
            rating: Some(5),
            comment: "Still available?".into(),
            parent_id: Some(10),
        };
        let created = svc
            .create_review(&UserId::from("buyer"), 1, input)
            .await
            .unwrap();
        assert_eq!(created.rating, 0);
        assert_eq!(created.parent_id.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn reply_to_review_of_other_listing_is_rejected() {
        let mut reviews = MockReviewRepository::new();
        reviews
            .expect_find_by_id()
            .returning(|id| Ok(Some(review(id, 2, None))));
        reviews.expect_create().never();
        let svc = service(reviews);

        let input = CreateReview {
            rating: None,
            comment: "hi".into(),
            parent_id: Some(10),
        };
        let err = svc
            .create_review(&UserId::from("buyer"), 1, input)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn review_on_missing_listing_is_not_found() {
        let svc = service(MockReviewRepository::new());
        let input = CreateReview {
            rating: Some(3),
            comment: "ok".into(),
            parent_id: None,
        };
        let err = svc
            .create_review(&UserId::from("buyer"), 404, input)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_reviews_sets_cursor_and_reply_counts() {
        let mut reviews = MockReviewRepository::new();
        reviews
            .expect_list_top_level()
            .withf(|listing, before, limit| *listing == 1 && before.is_none() && *limit == 3)
            .returning(|listing, _, _| {
                Ok(vec![
                    review(30, listing, None),
                    review(20, listing, None),
                    review(10, listing, None),
                ])
            });
        reviews
            .expect_reply_counts()
            .withf(|ids| ids.to_vec() == vec![30, 20])
            .returning(|_| Ok(HashMap::from([(20, 3)])));
        let svc = service(reviews);

        let page = svc.list_reviews(1, None, Some(2)).await.unwrap();
        assert_eq!(page.reviews.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("20"));
        assert_eq!(page.reviews[0].reply_count, 0);
        assert_eq!(page.reviews[1].reply_count, 3);
    }

    #[tokio::test]
    async fn last_page_has_no_cursor() {
        let mut reviews = MockReviewRepository::new();
        reviews
            .expect_list_top_level()
            .returning(|listing, _, _| Ok(vec![review(5, listing, None)]));
        reviews
            .expect_reply_counts()
            .returning(|_| Ok(HashMap::new()));
        let svc = service(reviews);

        let page = svc.list_reviews(1, Some(10), None).await.unwrap();
        assert_eq!(page.reviews.len(), 1);
        assert_eq!(page.next_cursor, None);
    }
}
