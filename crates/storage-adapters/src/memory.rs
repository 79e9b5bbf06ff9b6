//! # InMemoryStore
//!
//! Implements every repository port over plain collections behind a single
//! `RwLock`. A read holds the lock for the whole operation, so a page and its
//! total count always come from the same snapshot.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use domains::{
    Category, CategoryId, CategoryRepository, DomainError, Listing, ListingFilter, ListingId,
    ListingPatch, ListingRepository, ListingSort, NewListing, NewReview, OwnedMutation,
    PageRequest, Result, Review, ReviewId, ReviewRepository, UserId,
};

#[derive(Default)]
struct State {
    categories: BTreeMap<CategoryId, Category>,
    listings: BTreeMap<ListingId, Listing>,
    reviews: BTreeMap<ReviewId, Review>,
    next_listing_id: ListingId,
    next_review_id: ReviewId,
}

impl State {
    fn next_listing_id(&mut self) -> ListingId {
        self.next_listing_id += 1;
        self.next_listing_id
    }

    fn next_review_id(&mut self) -> ReviewId {
        self.next_review_id += 1;
        self.next_review_id
    }

    fn refresh_rating(&mut self, listing_id: ListingId) {
        let ratings: Vec<f64> = self
            .reviews
            .values()
            .filter(|r| r.listing_id == listing_id && r.parent_id.is_none())
            .map(|r| f64::from(r.rating))
            .collect();
        if let Some(listing) = self.listings.get_mut(&listing_id) {
            listing.rating = if ratings.is_empty() {
                None
            } else {
                Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
            };
        }
    }

    fn matching(&self, filter: &ListingFilter) -> Vec<&Listing> {
        let now = Utc::now();
        let mut rows: Vec<&Listing> = self
            .listings
            .values()
            .filter(|l| filter.matches(l))
            .collect();
        rows.sort_by(|a, b| compare_listings(a, b, filter.sort, now));
        rows
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with the given category rows.
    pub fn with_categories(categories: Vec<Category>) -> Self {
        let state = State {
            categories: categories.into_iter().map(|c| (c.id, c)).collect(),
            ..Default::default()
        };
        Self {
            state: RwLock::new(state),
        }
    }

    /// Inserts a fully formed listing, keeping its id. Used for seeding.
    pub async fn insert_listing(&self, listing: Listing) {
        let mut state = self.state.write().await;
        state.next_listing_id = state.next_listing_id.max(listing.id);
        state.listings.insert(listing.id, listing);
    }

    pub async fn listing_count(&self) -> usize {
        self.state.read().await.listings.len()
    }
}

/// Ordering shared with the SQL `ORDER BY` of the Postgres adapter.
pub(crate) fn compare_listings(
    a: &Listing,
    b: &Listing,
    sort: ListingSort,
    now: DateTime<Utc>,
) -> Ordering {
    let newest = || b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id));
    match sort {
        ListingSort::Featured => b
            .is_boost_active(now)
            .cmp(&a.is_boost_active(now))
            .then_with(newest),
        ListingSort::Newest => newest(),
        ListingSort::Oldest => a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)),
        ListingSort::PriceAsc => nulls_last(a, b, |x, y| x.cmp(y)).then(b.id.cmp(&a.id)),
        ListingSort::PriceDesc => nulls_last(a, b, |x, y| y.cmp(x)).then(b.id.cmp(&a.id)),
    }
}

fn nulls_last(
    a: &Listing,
    b: &Listing,
    cmp: impl Fn(&rust_decimal::Decimal, &rust_decimal::Decimal) -> Ordering,
) -> Ordering {
    match (&a.price, &b.price) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn owned_mut<'a>(
    state: &'a mut State,
    id: ListingId,
    owner: &UserId,
) -> std::result::Result<&'a mut Listing, OwnedMutation<Listing>> {
    match state.listings.get_mut(&id) {
        None => Err(OwnedMutation::NotFound),
        Some(listing) if &listing.user_id != owner => Err(OwnedMutation::NotOwner),
        Some(listing) => Ok(listing),
    }
}

#[async_trait]
impl CategoryRepository for InMemoryStore {
    async fn list_all(&self) -> Result<Vec<Category>> {
        Ok(self.state.read().await.categories.values().cloned().collect())
    }
}

#[async_trait]
impl ListingRepository for InMemoryStore {
    async fn find_by_id(&self, id: ListingId) -> Result<Option<Listing>> {
        Ok(self.state.read().await.listings.get(&id).cloned())
    }

    async fn query(&self, filter: &ListingFilter, page: PageRequest) -> Result<(Vec<Listing>, u64)> {
        let state = self.state.read().await;
        let rows = state.matching(filter);
        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn search(&self, filter: &ListingFilter, limit: u32) -> Result<Vec<Listing>> {
        let state = self.state.read().await;
        Ok(state
            .matching(filter)
            .into_iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn create(&self, owner: &UserId, new: NewListing) -> Result<Listing> {
        let mut state = self.state.write().await;
        if !state.categories.contains_key(&new.subcategory_id) {
            return Err(DomainError::validation(format!(
                "category {} does not exist",
                new.subcategory_id
            )));
        }
        let now = Utc::now();
        let listing = Listing {
            id: state.next_listing_id(),
            title: new.title.trim().to_string(),
            description: new.description,
            subcategory_id: new.subcategory_id,
            price: new.price,
            currency: new.currency,
            town: new.town,
            address: new.address,
            user_id: owner.clone(),
            status: Default::default(),
            created_at: now,
            updated_at: now,
            expires_at: new.expires_at,
            views: 0,
            cover_image: new.cover_image,
            images: new.images,
            is_boosted: false,
            boost_type: None,
            boost_expires_at: None,
            tags: new.tags,
            condition: new.condition,
            negotiable: new.negotiable,
            delivery_available: new.delivery_available,
            rating: None,
        };
        state.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    async fn update_owned(
        &self,
        id: ListingId,
        owner: &UserId,
        patch: ListingPatch,
    ) -> Result<OwnedMutation<Listing>> {
        let mut state = self.state.write().await;
        match owned_mut(&mut state, id, owner) {
            Err(outcome) => Ok(outcome),
            Ok(listing) => {
                patch.apply_to(listing, Utc::now());
                Ok(OwnedMutation::Applied(listing.clone()))
            }
        }
    }

    async fn delete_owned(&self, id: ListingId, owner: &UserId) -> Result<OwnedMutation<Listing>> {
        let mut state = self.state.write().await;
        if let Err(outcome) = owned_mut(&mut state, id, owner) {
            return Ok(outcome);
        }
        let Some(listing) = state.listings.remove(&id) else {
            return Ok(OwnedMutation::NotFound);
        };
        state.reviews.retain(|_, r| r.listing_id != id);
        Ok(OwnedMutation::Applied(listing))
    }
}

#[async_trait]
impl ReviewRepository for InMemoryStore {
    async fn find_by_id(&self, id: ReviewId) -> Result<Option<Review>> {
        Ok(self.state.read().await.reviews.get(&id).cloned())
    }

    async fn create(&self, new: NewReview) -> Result<Review> {
        let mut state = self.state.write().await;
        if !state.listings.contains_key(&new.listing_id) {
            return Err(DomainError::not_found("listing", new.listing_id));
        }
        let review = Review {
            id: state.next_review_id(),
            user_id: new.user_id,
            listing_id: new.listing_id,
            rating: new.rating,
            comment: new.comment,
            parent_id: new.parent_id,
            created_at: Utc::now(),
        };
        state.reviews.insert(review.id, review.clone());
        if review.parent_id.is_none() {
            state.refresh_rating(review.listing_id);
        }
        Ok(review)
    }

    async fn list_top_level(
        &self,
        listing_id: ListingId,
        before: Option<ReviewId>,
        limit: u32,
    ) -> Result<Vec<Review>> {
        let state = self.state.read().await;
        Ok(state
            .reviews
            .values()
            .rev()
            .filter(|r| r.listing_id == listing_id && r.parent_id.is_none())
            .filter(|r| before.map_or(true, |cursor| r.id < cursor))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_replies(
        &self,
        parent_id: ReviewId,
        after: Option<ReviewId>,
        limit: u32,
    ) -> Result<Vec<Review>> {
        let state = self.state.read().await;
        Ok(state
            .reviews
            .values()
            .filter(|r| r.parent_id == Some(parent_id))
            .filter(|r| after.map_or(true, |cursor| r.id > cursor))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn reply_counts(&self, parent_ids: &[ReviewId]) -> Result<HashMap<ReviewId, u64>> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for parent in state.reviews.values().filter_map(|r| r.parent_id) {
            if parent_ids.contains(&parent) {
                *counts.entry(parent).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
