//! # ListingService
//!
//! Turns category names, free text, price bounds and location into one
//! filtered, paginated listing read, and owns the owner-gated write paths.
//!
//! Reads fail soft: storage errors come back as an empty page plus an error
//! flag. Writes fail hard. Image cleanup after a delete is best-effort and
//! never reverses the delete.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::task::JoinHandle;

use domains::{
    CategoryId, CategoryNames, DomainError, ExtendedListing, ListingFilter, ListingId,
    ListingPage, ListingPatch, ListingRepository, ListingSort, ListingStatus, MediaStorage,
    NewListing, OwnedMutation, PageRequest, Result, SearchResults, UserId,
};

use crate::cache::{cache_key, TtlCache};
use crate::category_service::CategoryService;
use crate::outcome::ReadOutcome;

pub const LISTINGS_TAG: &str = "listings";

/// Fixed page size of the type-ahead search.
pub const SEARCH_LIMIT: u32 = 8;

pub type ListingCache = TtlCache<ListingPage>;

/// How a request narrows listings by category.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CategorySelector {
    #[default]
    Any,
    Names(CategoryNames),
    /// A category id, expanded to itself plus its descendants.
    Id(CategoryId),
}

/// Everything a listing page request can constrain besides pagination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingQuery {
    pub category: CategorySelector,
    pub search: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub status: Option<ListingStatus>,
    pub sort: ListingSort,
}

/// A single listing together with its canonical path, when resolvable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDetail {
    #[serde(flatten)]
    pub listing: ExtendedListing,
    pub canonical_path: Option<String>,
}

/// Outcome of the post-delete image cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub attempted: usize,
    pub failed: usize,
}

/// A committed delete. `cleanup` resolves once every image deletion has
/// settled; dropping it detaches the cleanup.
#[derive(Debug)]
pub struct DeletedListing {
    pub id: ListingId,
    pub cleanup: JoinHandle<CleanupReport>,
}

#[derive(Clone)]
pub struct ListingService {
    listings: Arc<dyn ListingRepository>,
    categories: CategoryService,
    media: Arc<dyn MediaStorage>,
    cache: Arc<ListingCache>,
}

impl ListingService {
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        categories: CategoryService,
        media: Arc<dyn MediaStorage>,
        cache: Arc<ListingCache>,
    ) -> Self {
        Self {
            listings,
            categories,
            media,
            cache,
        }
    }

    /// Filtered, paginated listings with the total matching count.
    pub async fn query_listings(
        &self,
        query: ListingQuery,
        page: PageRequest,
    ) -> ReadOutcome<ListingPage> {
        let mut filter = ListingFilter {
            category_ids: None,
            search: query.search,
            location: query.location,
            min_price: query.min_price,
            max_price: query.max_price,
            status: query.status,
            sort: query.sort,
        };
        if filter.has_short_search() {
            return ReadOutcome::ok(ListingPage::default());
        }

        match self.category_ids(&query.category).await {
            Ok(ids) => filter.category_ids = ids,
            Err(err) => return self.soft_failure(err, "category resolution failed"),
        }
        if filter.has_empty_category_set() {
            return ReadOutcome::ok(ListingPage::default());
        }

        let key = cache_key("listings:page", &(&filter, page));
        let fetched = self
            .cache
            .get_or_try_insert_with(&key, &[LISTINGS_TAG], || async {
                let (rows, total_count) = self.listings.query(&filter, page).await?;
                Ok::<_, DomainError>(ListingPage {
                    listings: rows.into_iter().map(ExtendedListing::from).collect(),
                    total_count,
                })
            })
            .await;

        match fetched {
            Ok(page) => ReadOutcome::ok(page),
            Err(err) => self.soft_failure(err, "listing query failed"),
        }
    }

    /// Type-ahead search over active listings, capped at [`SEARCH_LIMIT`].
    pub async fn search_listings(
        &self,
        term: &str,
        category: CategorySelector,
    ) -> ReadOutcome<SearchResults> {
        let mut filter = ListingFilter {
            search: Some(term.trim().to_string()),
            status: Some(ListingStatus::Active),
            sort: ListingSort::Featured,
            ..Default::default()
        };
        if filter.has_short_search() {
            return ReadOutcome::ok(SearchResults::default());
        }

        match self.category_ids(&category).await {
            Ok(ids) => filter.category_ids = ids,
            Err(err) => {
                tracing::error!(error = %err, term, "category resolution failed");
                return ReadOutcome::failed(SearchResults::default(), err);
            }
        }
        if filter.has_empty_category_set() {
            return ReadOutcome::ok(SearchResults::default());
        }

        match self.listings.search(&filter, SEARCH_LIMIT).await {
            Ok(rows) => {
                let has_more = rows.len() as u32 >= SEARCH_LIMIT;
                ReadOutcome::ok(SearchResults {
                    listings: rows.into_iter().map(ExtendedListing::from).collect(),
                    has_more,
                })
            }
            Err(err) => {
                tracing::error!(error = %err, term, "listing search failed");
                ReadOutcome::failed(SearchResults::default(), err)
            }
        }
    }

    pub async fn get_listing(&self, id: ListingId) -> Result<ListingDetail> {
        let listing = self
            .listings
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("listing", id))?;

        let canonical_path = match self.categories.resolve_path(listing.subcategory_id).await {
            Ok(path) => Some(format!("/{path}/{id}")),
            Err(err) => {
                tracing::warn!(listing_id = id, error = %err, "no canonical path for listing");
                None
            }
        };

        Ok(ListingDetail {
            listing: listing.into(),
            canonical_path,
        })
    }

    pub async fn create_listing(&self, owner: &UserId, new: NewListing) -> Result<ExtendedListing> {
        new.validate()?;
        self.ensure_leaf(new.subcategory_id).await?;

        let listing = self.listings.create(owner, new).await?;
        self.cache.invalidate_tag(LISTINGS_TAG);
        tracing::info!(listing_id = listing.id, owner = %owner, "listing created");
        Ok(listing.into())
    }

    pub async fn update_listing(
        &self,
        owner: &UserId,
        id: ListingId,
        patch: ListingPatch,
    ) -> Result<ExtendedListing> {
        patch.validate()?;
        if let Some(category) = patch.subcategory_id {
            self.ensure_leaf(category).await?;
        }

        let listing = owned(self.listings.update_owned(id, owner, patch).await?, id, owner)?;
        self.cache.invalidate_tag(LISTINGS_TAG);
        tracing::info!(listing_id = id, owner = %owner, "listing updated");
        Ok(listing.into())
    }

    /// Deletes the listing, then issues every image deletion in parallel.
    ///
    /// The row is gone once this returns `Ok`; image failures are logged and
    /// reported through [`DeletedListing::cleanup`] only.
    pub async fn delete_listing(&self, owner: &UserId, id: ListingId) -> Result<DeletedListing> {
        let listing = owned(self.listings.delete_owned(id, owner).await?, id, owner)?;
        self.cache.invalidate_tag(LISTINGS_TAG);
        tracing::info!(listing_id = id, owner = %owner, "listing deleted");

        let cleanup = spawn_image_cleanup(self.media.clone(), id, listing.image_references());
        Ok(DeletedListing { id, cleanup })
    }

    async fn category_ids(
        &self,
        selector: &CategorySelector,
    ) -> Result<Option<BTreeSet<CategoryId>>> {
        match selector {
            CategorySelector::Any => Ok(None),
            CategorySelector::Names(names) => {
                self.categories.resolve_id_set(names).await.map(Some)
            }
            CategorySelector::Id(id) => self.categories.expand(*id).await.map(Some),
        }
    }

    async fn ensure_leaf(&self, category: CategoryId) -> Result<()> {
        match self.categories.is_leaf(category).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(DomainError::validation(format!(
                "category {category} is not a leaf category"
            ))),
            Err(DomainError::CategoryNotFound(id)) => Err(DomainError::validation(format!(
                "category {id} does not exist"
            ))),
            Err(err) => Err(err),
        }
    }

    fn soft_failure(&self, err: DomainError, context: &str) -> ReadOutcome<ListingPage> {
        tracing::error!(error = %err, "{context}");
        ReadOutcome::failed(ListingPage::default(), err)
    }
}

fn owned<T>(outcome: OwnedMutation<T>, id: ListingId, owner: &UserId) -> Result<T> {
    match outcome {
        OwnedMutation::Applied(value) => Ok(value),
        OwnedMutation::NotFound => Err(DomainError::not_found("listing", id)),
        OwnedMutation::NotOwner => {
            tracing::warn!(listing_id = id, user = %owner, "mutation by non-owner rejected");
            Err(DomainError::Forbidden(format!(
                "listing {id} does not belong to the current user"
            )))
        }
    }
}

/// Runs every deletion to completion regardless of individual failures.
fn spawn_image_cleanup(
    media: Arc<dyn MediaStorage>,
    listing_id: ListingId,
    references: Vec<String>,
) -> JoinHandle<CleanupReport> {
    tokio::spawn(async move {
        let results = join_all(references.iter().map(|r| media.delete(r))).await;

        let mut report = CleanupReport {
            attempted: results.len(),
            failed: 0,
        };
        for (reference, result) in references.iter().zip(results) {
            if let Err(err) = result {
                report.failed += 1;
                tracing::warn!(listing_id, reference, error = %err, "image cleanup failed");
            }
        }
        if report.attempted > 0 {
            tracing::debug!(
                listing_id,
                attempted = report.attempted,
                failed = report.failed,
                "image cleanup settled"
            );
        }
        report
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::{
        Category, Listing, MockCategoryRepository, MockListingRepository, MockMediaStorage,
    };
    use std::time::Duration;

    fn categories() -> MockCategoryRepository {
        let mut repo = MockCategoryRepository::new();
        repo.expect_list_all().returning(|| {
            Ok(vec![
                Category { id: 1, name: "Electronics".into(), description: None, parent_id: None },
                Category { id: 2, name: "Phones".into(), description: None, parent_id: Some(1) },
                Category { id: 3, name: "Smartphones".into(), description: None, parent_id: Some(2) },
            ])
        });
        repo
    }

    fn listing(id: ListingId, images: &[&str]) -> Listing {
        let now = Utc::now();
        Listing {
            id,
            title: format!("Listing {id}"),
            description: String::new(),
            subcategory_id: 3,
            price: None,
            currency: "EUR".into(),
            town: None,
            address: None,
            user_id: UserId::from("owner"),
            status: ListingStatus::Active,
            created_at: now,
            updated_at: now,
            expires_at: None,
            views: 0,
            cover_image: None,
            images: images.iter().map(|s| s.to_string()).collect(),
            is_boosted: false,
            boost_type: None,
            boost_expires_at: None,
            tags: vec![],
            condition: None,
            negotiable: false,
            delivery_available: false,
            rating: None,
        }
    }

    fn service(listings: MockListingRepository, media: MockMediaStorage) -> ListingService {
        let categories = CategoryService::new(
            Arc::new(categories()),
            Arc::new(TtlCache::new(Duration::from_secs(300))),
        );
        ListingService::new(
            Arc::new(listings),
            categories,
            Arc::new(media),
            Arc::new(TtlCache::new(Duration::from_secs(300))),
        )
    }

    #[tokio::test]
    async fn short_search_never_reaches_storage() {
        let mut listings = MockListingRepository::new();
        listings.expect_query().never();
        let svc = service(listings, MockMediaStorage::new());

        let query = ListingQuery {
            search: Some("a".into()),
            ..Default::default()
        };
        let outcome = svc.query_listings(query, PageRequest::new(1, 10).unwrap()).await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.data, ListingPage::default());
    }

    #[tokio::test]
    async fn unknown_main_category_returns_empty_without_query() {
        let mut listings = MockListingRepository::new();
        listings.expect_query().never();
        let svc = service(listings, MockMediaStorage::new());

        let query = ListingQuery {
            category: CategorySelector::Names(CategoryNames::new("vehicles", None, None).unwrap()),
            ..Default::default()
        };
        let outcome = svc.query_listings(query, PageRequest::new(1, 10).unwrap()).await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.data.total_count, 0);
    }

    #[tokio::test]
    async fn main_category_expands_to_descendants() {
        let mut listings = MockListingRepository::new();
        listings
            .expect_query()
            .withf(|filter, page| {
                filter.category_ids == Some(BTreeSet::from([1, 2, 3])) && page.offset() == 0
            })
            .times(1)
            .returning(|_, _| Ok((vec![listing(1, &[])], 1)));
        let svc = service(listings, MockMediaStorage::new());

        let query = ListingQuery {
            category: CategorySelector::Names(CategoryNames::new("Electronics", None, None).unwrap()),
            ..Default::default()
        };
        let outcome = svc.query_listings(query, PageRequest::new(1, 10).unwrap()).await;
        assert_eq!(outcome.data.total_count, 1);
        assert_eq!(outcome.data.listings[0].id, "1");
    }

    #[tokio::test]
    async fn storage_failure_fails_soft() {
        let mut listings = MockListingRepository::new();
        listings
            .expect_query()
            .returning(|_, _| Err(DomainError::internal("connection reset")));
        let svc = service(listings, MockMediaStorage::new());

        let outcome = svc
            .query_listings(ListingQuery::default(), PageRequest::new(1, 10).unwrap())
            .await;
        assert!(!outcome.is_ok());
        assert!(outcome.data.listings.is_empty());
        assert_eq!(outcome.data.total_count, 0);
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() {
        let mut listings = MockListingRepository::new();
        listings
            .expect_query()
            .times(1)
            .returning(|_, _| Ok((vec![], 0)));
        let svc = service(listings, MockMediaStorage::new());

        for _ in 0..2 {
            let outcome = svc
                .query_listings(ListingQuery::default(), PageRequest::new(1, 10).unwrap())
                .await;
            assert!(outcome.is_ok());
        }
    }

    #[tokio::test]
    async fn search_has_more_when_cap_is_hit() {
        let mut listings = MockListingRepository::new();
        listings
            .expect_search()
            .withf(|filter, limit| {
                *limit == SEARCH_LIMIT && filter.status == Some(ListingStatus::Active)
            })
            .returning(|_, limit| Ok((0..limit as i64).map(|id| listing(id, &[])).collect()));
        let svc = service(listings, MockMediaStorage::new());

        let outcome = svc.search_listings("phone", CategorySelector::Any).await;
        assert_eq!(outcome.data.listings.len(), SEARCH_LIMIT as usize);
        assert!(outcome.data.has_more);
    }

    #[tokio::test]
    async fn delete_by_non_owner_is_forbidden() {
        let mut listings = MockListingRepository::new();
        listings
            .expect_delete_owned()
            .returning(|_, _| Ok(OwnedMutation::NotOwner));
        let mut media = MockMediaStorage::new();
        media.expect_delete().never();
        let svc = service(listings, media);

        let err = svc
            .delete_listing(&UserId::from("intruder"), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[tokio::test]
    async fn delete_succeeds_even_when_every_image_cleanup_fails() {
        let mut listings = MockListingRepository::new();
        listings
            .expect_delete_owned()
            .returning(|id, _| Ok(OwnedMutation::Applied(listing(id, &["img/a", "img/b"]))));
        let mut media = MockMediaStorage::new();
        media
            .expect_delete()
            .times(2)
            .returning(|_| Err(DomainError::internal("image host unavailable")));
        let svc = service(listings, media);

        let deleted = svc.delete_listing(&UserId::from("owner"), 5).await.unwrap();
        let report = deleted.cleanup.await.unwrap();
        assert_eq!(report, CleanupReport { attempted: 2, failed: 2 });
    }

    #[tokio::test]
    async fn create_rejects_non_leaf_category() {
        let mut listings = MockListingRepository::new();
        listings.expect_create().never();
        let svc = service(listings, MockMediaStorage::new());

        let new: NewListing = serde_json::from_value(serde_json::json!({
            "title": "Phone",
            "subcategoryId": 2,
        }))
        .unwrap();
        let err = svc
            .create_listing(&UserId::from("owner"), new)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn get_listing_includes_canonical_path() {
        let mut listings = MockListingRepository::new();
        listings
            .expect_find_by_id()
            .returning(|id| Ok(Some(listing(id, &[]))));
        let svc = service(listings, MockMediaStorage::new());

        let detail = svc.get_listing(77).await.unwrap();
        assert_eq!(
            detail.canonical_path.as_deref(),
            Some("/electronics/phones/smartphones/77")
        );
    }
}
