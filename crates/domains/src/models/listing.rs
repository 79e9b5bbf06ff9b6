//! # Listings
//!
//! The stored listing record, the filter model used to query it, and the
//! flat transport shape ([`ExtendedListing`]) handed to the presentation layer.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, Result};
use crate::models::{CategoryId, UserId};

pub type ListingId = i64;

/// Served when a listing has no images.
pub const PLACEHOLDER_IMAGE_URL: &str = "/images/placeholder.svg";

/// Search terms shorter than this never reach storage.
pub const MIN_SEARCH_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    Active,
    Inactive,
    Sold,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Sold => "sold",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "sold" => Ok(Self::Sold),
            other => Err(DomainError::validation(format!("unknown listing status '{other}'"))),
        }
    }
}

/// A listing as held in the store, with arrays already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub title: String,
    pub description: String,
    pub subcategory_id: CategoryId,
    pub price: Option<Decimal>,
    pub currency: String,
    pub town: Option<String>,
    pub address: Option<String>,
    pub user_id: UserId,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub views: i64,
    pub cover_image: Option<String>,
    pub images: Vec<String>,
    pub is_boosted: bool,
    pub boost_type: Option<String>,
    pub boost_expires_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub condition: Option<String>,
    pub negotiable: bool,
    pub delivery_available: bool,
    pub rating: Option<f64>,
}

impl Listing {
    /// Boosted and the boost has not lapsed.
    pub fn is_boost_active(&self, now: DateTime<Utc>) -> bool {
        self.is_boosted && self.boost_expires_at.map_or(true, |until| until > now)
    }

    /// Every externally hosted image reference, cover first, without duplicates.
    pub fn image_references(&self) -> Vec<String> {
        let mut refs: Vec<String> = Vec::with_capacity(self.images.len() + 1);
        for image in self.cover_image.iter().chain(self.images.iter()) {
            if !image.is_empty() && !refs.contains(image) {
                refs.push(image.clone());
            }
        }
        refs
    }
}

/// Fields supplied by an owner when posting a listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListing {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub subcategory_id: CategoryId,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub price: Option<Decimal>,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub town: Option<String>,
    pub address: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub cover_image: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub condition: Option<String>,
    #[serde(default)]
    pub negotiable: bool,
    #[serde(default)]
    pub delivery_available: bool,
}

fn default_currency() -> String {
    "EUR".to_string()
}

impl NewListing {
    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)?;
        validate_price(self.price)?;
        if self.currency.trim().is_empty() {
            return Err(DomainError::validation("currency must not be empty"));
        }
        Ok(())
    }
}

/// Partial update applied by the owner. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub subcategory_id: Option<CategoryId>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub price: Option<Decimal>,
    pub town: Option<String>,
    pub address: Option<String>,
    pub status: Option<ListingStatus>,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub condition: Option<String>,
    pub negotiable: Option<bool>,
    pub delivery_available: Option<bool>,
}

impl ListingPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        validate_price(self.price)
    }

    /// Applies the patch in place and bumps `updated_at`.
    pub fn apply_to(&self, listing: &mut Listing, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            listing.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            listing.description = description.clone();
        }
        if let Some(id) = self.subcategory_id {
            listing.subcategory_id = id;
        }
        if self.price.is_some() {
            listing.price = self.price;
        }
        if let Some(town) = &self.town {
            listing.town = Some(town.clone());
        }
        if let Some(address) = &self.address {
            listing.address = Some(address.clone());
        }
        if let Some(status) = self.status {
            listing.status = status;
        }
        if let Some(images) = &self.images {
            listing.images = images.clone();
        }
        if let Some(tags) = &self.tags {
            listing.tags = tags.clone();
        }
        if let Some(condition) = &self.condition {
            listing.condition = Some(condition.clone());
        }
        if let Some(negotiable) = self.negotiable {
            listing.negotiable = negotiable;
        }
        if let Some(delivery) = self.delivery_available {
            listing.delivery_available = delivery;
        }
        listing.updated_at = now;
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(DomainError::validation("title must not be empty"));
    }
    Ok(())
}

fn validate_price(price: Option<Decimal>) -> Result<()> {
    match price {
        Some(p) if p < Decimal::ZERO => {
            Err(DomainError::validation("price must not be negative"))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingSort {
    /// Boosted first, then newest.
    #[default]
    Featured,
    Newest,
    Oldest,
    PriceAsc,
    PriceDesc,
}

impl FromStr for ListingSort {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "" | "featured" => Ok(Self::Featured),
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "price_asc" => Ok(Self::PriceAsc),
            "price_desc" => Ok(Self::PriceDesc),
            other => Err(DomainError::validation(format!("unknown sort '{other}'"))),
        }
    }
}

/// Conjunctive listing filter. Every `None` field is unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListingFilter {
    pub category_ids: Option<BTreeSet<CategoryId>>,
    pub search: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub status: Option<ListingStatus>,
    pub sort: ListingSort,
}

impl ListingFilter {
    /// True when a search term is present but too short to run.
    pub fn has_short_search(&self) -> bool {
        self.search
            .as_deref()
            .is_some_and(|term| term.trim().chars().count() < MIN_SEARCH_LEN)
    }

    /// True when a category restriction resolved to nothing.
    pub fn has_empty_category_set(&self) -> bool {
        self.category_ids.as_ref().is_some_and(BTreeSet::is_empty)
    }

    /// In-memory evaluation of the filter, mirroring the SQL the Postgres
    /// adapter generates.
    pub fn matches(&self, listing: &Listing) -> bool {
        if let Some(ids) = &self.category_ids {
            if !ids.contains(&listing.subcategory_id) {
                return false;
            }
        }
        if let Some(term) = self.search.as_deref().map(str::trim) {
            let term = term.to_lowercase();
            let hit = listing.title.to_lowercase().contains(&term)
                || listing.description.to_lowercase().contains(&term)
                || listing.tags.iter().any(|t| t.to_lowercase() == term);
            if !hit {
                return false;
            }
        }
        if let Some(location) = &self.location {
            // Unicode lowercasing, the same folding Postgres `lower()` applies
            let location = location.trim().to_lowercase();
            let same_town = listing
                .town
                .as_deref()
                .is_some_and(|town| town.to_lowercase() == location);
            if !same_town {
                return false;
            }
        }
        if let Some(min) = self.min_price {
            if !listing.price.is_some_and(|p| p >= min) {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if !listing.price.is_some_and(|p| p <= max) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if listing.status != status {
                return false;
            }
        }
        true
    }
}

/// Offset pagination. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Result<Self> {
        if page == 0 {
            return Err(DomainError::validation("page must be at least 1"));
        }
        if page_size == 0 {
            return Err(DomainError::validation("pageSize must be greater than 0"));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

/// Flat, serialization-safe listing shape: ids and decimals as strings,
/// timestamps as RFC 3339, arrays always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedListing {
    pub id: String,
    pub title: String,
    pub description: String,
    pub subcategory_id: CategoryId,
    pub price: Option<String>,
    pub currency: String,
    pub town: Option<String>,
    pub address: Option<String>,
    pub user_id: String,
    pub status: ListingStatus,
    pub created_at: String,
    pub updated_at: String,
    pub expires_at: Option<String>,
    pub views: i64,
    pub cover_image: String,
    pub images: Vec<String>,
    pub is_boosted: bool,
    pub boost_type: Option<String>,
    pub boost_expires_at: Option<String>,
    pub tags: Vec<String>,
    pub condition: Option<String>,
    pub negotiable: bool,
    pub delivery_available: bool,
    pub rating: Option<f64>,
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl From<Listing> for ExtendedListing {
    fn from(listing: Listing) -> Self {
        let images = if listing.images.is_empty() {
            vec![PLACEHOLDER_IMAGE_URL.to_string()]
        } else {
            listing.images
        };
        let cover_image = listing
            .cover_image
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| images[0].clone());

        Self {
            id: listing.id.to_string(),
            title: listing.title,
            description: listing.description,
            subcategory_id: listing.subcategory_id,
            price: listing.price.map(|p| p.to_string()),
            currency: listing.currency,
            town: listing.town,
            address: listing.address,
            user_id: listing.user_id.to_string(),
            status: listing.status,
            created_at: iso(listing.created_at),
            updated_at: iso(listing.updated_at),
            expires_at: listing.expires_at.map(iso),
            views: listing.views,
            cover_image,
            images,
            is_boosted: listing.is_boosted,
            boost_type: listing.boost_type,
            boost_expires_at: listing.boost_expires_at.map(iso),
            tags: listing.tags,
            condition: listing.condition,
            negotiable: listing.negotiable,
            delivery_available: listing.delivery_available,
            rating: listing.rating,
        }
    }
}

/// One page of listings plus the total matching count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    pub listings: Vec<ExtendedListing>,
    pub total_count: u64,
}

/// Type-ahead search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub listings: Vec<ExtendedListing>,
    pub has_more: bool,
}

/// Decodes a JSON-encoded string array as stored in a text column.
///
/// Absent, blank, `null` and malformed values all decode to an empty vector.
pub fn decode_string_array(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };
    match serde_json::from_str::<Option<Vec<String>>>(raw) {
        Ok(values) => values.unwrap_or_default(),
        Err(err) => {
            tracing::warn!(error = %err, "discarding malformed stored array");
            Vec::new()
        }
    }
}

/// Encodes an array for a text column. Always a valid array, never `null`.
pub fn encode_string_array(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}
