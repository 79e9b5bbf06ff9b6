//! # integration-tests
//!
//! Shared fixtures: a small category tree, listing builders, a recording
//! media store and a fake token verifier, wired into services over
//! `InMemoryStore`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use mime::Mime;
use rust_decimal::Decimal;

use domains::{
    Category, CategoryId, DomainError, Listing, ListingId, ListingStatus, MediaStorage, Result,
    TokenVerifier, UserId,
};
use services::{CategoryService, ListingService, ReviewService, TtlCache};
use storage_adapters::InMemoryStore;

pub const ELECTRONICS: CategoryId = 1;
pub const PHONES: CategoryId = 2;
pub const SMARTPHONES: CategoryId = 3;
pub const FEATURE_PHONES: CategoryId = 4;
pub const COMPUTERS: CategoryId = 5;
pub const LAPTOPS: CategoryId = 6;
pub const VEHICLES: CategoryId = 7;
pub const CARS: CategoryId = 8;
pub const SEDANS: CategoryId = 9;

pub const SELLER: &str = "seller-1";
pub const OTHER_USER: &str = "user-2";

/// Electronics → {Phones → {Smartphones, Feature Phones}, Computers → Laptops},
/// Vehicles → Cars → Sedans.
pub fn category_rows() -> Vec<Category> {
    [
        (ELECTRONICS, "Electronics", None),
        (PHONES, "Phones", Some(ELECTRONICS)),
        (SMARTPHONES, "Smartphones", Some(PHONES)),
        (FEATURE_PHONES, "Feature Phones", Some(PHONES)),
        (COMPUTERS, "Computers", Some(ELECTRONICS)),
        (LAPTOPS, "Laptops", Some(COMPUTERS)),
        (VEHICLES, "Vehicles", None),
        (CARS, "Cars", Some(VEHICLES)),
        (SEDANS, "Sedans", Some(CARS)),
    ]
    .into_iter()
    .map(|(id, name, parent_id)| Category {
        id,
        name: name.to_string(),
        description: None,
        parent_id,
    })
    .collect()
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// An active listing by [`SELLER`]. Later ids are newer.
pub fn listing(id: ListingId, subcategory_id: CategoryId) -> Listing {
    let created = base_time() + chrono::Duration::minutes(id);
    Listing {
        id,
        title: format!("Listing {id}"),
        description: format!("Description of listing {id}"),
        subcategory_id,
        price: Some(Decimal::new(id * 1000, 2)),
        currency: "EUR".into(),
        town: Some("Zagreb".into()),
        address: None,
        user_id: UserId::from(SELLER),
        status: ListingStatus::Active,
        created_at: created,
        updated_at: created,
        expires_at: None,
        views: 0,
        cover_image: None,
        images: Vec::new(),
        is_boosted: false,
        boost_type: None,
        boost_expires_at: None,
        tags: Vec::new(),
        condition: None,
        negotiable: false,
        delivery_available: false,
        rating: None,
    }
}

/// Records every call; deletions of URLs in `failing` return an error.
#[derive(Default)]
pub struct RecordingMedia {
    stored: AtomicUsize,
    deleted: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingMedia {
    pub fn fail_on(&self, url: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string());
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stored_count(&self) -> usize {
        self.stored.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaStorage for RecordingMedia {
    async fn store(&self, _data: Bytes, content_type: &Mime) -> Result<String> {
        let n = self.stored.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("/uploads/{n}.{}", content_type.subtype()))
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        let fails = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url);
        if fails {
            Err(DomainError::internal(format!("cannot delete {url}")))
        } else {
            Ok(())
        }
    }
}

/// Accepts `token-<user>` and nothing else.
pub struct FakeVerifier;

impl TokenVerifier for FakeVerifier {
    fn verify(&self, token: &str) -> Result<UserId> {
        token
            .strip_prefix("token-")
            .filter(|user| !user.is_empty())
            .map(UserId::from)
            .ok_or_else(|| DomainError::Unauthorized("unknown token".into()))
    }
}

pub fn bearer(user: &str) -> String {
    format!("Bearer token-{user}")
}

/// Services wired over one in-memory store.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub media: Arc<RecordingMedia>,
    pub categories: CategoryService,
    pub listings: ListingService,
    pub reviews: ReviewService,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::with_categories(category_rows()));
        let media = Arc::new(RecordingMedia::default());
        let ttl = Duration::from_secs(60);

        let categories =
            CategoryService::new(store.clone(), Arc::new(TtlCache::new(ttl)));
        let listing_cache = Arc::new(TtlCache::new(ttl));
        let listings = ListingService::new(
            store.clone(),
            categories.clone(),
            media.clone(),
            listing_cache.clone(),
        );
        let reviews = ReviewService::new(store.clone(), store.clone(), listing_cache);

        Self {
            store,
            media,
            categories,
            listings,
            reviews,
        }
    }

    /// Inserts `count` listings with ids `first..first + count`.
    pub async fn seed(&self, first: ListingId, count: i64, subcategory_id: CategoryId) {
        for id in first..first + count {
            self.store.insert_listing(listing(id, subcategory_id)).await;
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "web-axum")]
pub mod http {
    //! Router-level helpers.

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    use api_adapters::{build_router, ApiLimits, AppState, HttpOptions, Metrics};

    use super::{FakeVerifier, Harness};

    pub fn state(harness: &Harness) -> AppState {
        AppState {
            categories: harness.categories.clone(),
            listings: harness.listings.clone(),
            reviews: harness.reviews.clone(),
            media: harness.media.clone(),
            verifier: Arc::new(FakeVerifier),
            metrics: Arc::new(Metrics::new()),
            limits: ApiLimits::default(),
        }
    }

    pub fn router(harness: &Harness) -> Router {
        build_router(state(harness), &HttpOptions::default())
    }

    /// Sends one request and returns the status and parsed JSON body
    /// (`Value::Null` for an empty body).
    pub async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
        send(router, Method::GET, uri, None, None).await
    }
}
