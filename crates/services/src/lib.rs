//! # services
//!
//! Use cases of the classifieds marketplace: category resolution, listing
//! queries and owner-gated writes, threaded reviews. Services depend only on
//! the ports in `domains`; adapters are injected by the binary.

pub mod cache;
pub mod category_service;
pub mod listing_service;
pub mod outcome;
pub mod review_feed;
pub mod review_service;

pub use cache::TtlCache;
pub use category_service::{CategoryCache, CategoryService};
pub use listing_service::{
    CategorySelector, CleanupReport, DeletedListing, ListingCache, ListingDetail, ListingQuery,
    ListingService, SEARCH_LIMIT,
};
pub use outcome::ReadOutcome;
pub use review_feed::{FeedEntry, PendingReview, ReviewFeed};
pub use review_service::{CreateReview, ReviewService};
