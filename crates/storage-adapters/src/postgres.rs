//! # PgStore
//!
//! Maps the Postgres relational model onto the `domains` entities.
//! Array-valued columns (`images`, `tags`) are JSON text; they are decoded
//! into vectors here so nothing above this layer sees `null` or raw JSON.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};

use domains::{
    decode_string_array, encode_string_array, Category, CategoryId, CategoryRepository,
    DomainError, Listing, ListingFilter, ListingId, ListingPatch, ListingRepository, ListingSort,
    ListingStatus, NewListing, NewReview, OwnedMutation, PageRequest, Result, Review, ReviewId,
    ReviewRepository, UserId, slugify,
};

use crate::seed::SeedNode;

/// Slug expression behind `categories_sibling_slug_idx`.
const SLUG_EXPR: &str = r"lower(regexp_replace(btrim(name), '\s+', '-', 'g'))";
/// Finds a seeded category among its siblings by slug.
const SIBLING_BY_SLUG: &str = concat!(
    "SELECT id FROM categories WHERE COALESCE(parent_id, 0) = COALESCE($1, 0) AND ",
    r"lower(regexp_replace(btrim(name), '\s+', '-', 'g'))",
    " = $2"
);

const LISTING_COLUMNS: &str = "id, title, description, subcategory_id, price, currency, town, \
    address, user_id, status, created_at, updated_at, expires_at, views, cover_image, images, \
    is_boosted, boost_type, boost_expires_at, tags, condition, negotiable, delivery_available, rating";

const REVIEW_COLUMNS: &str = "id, user_id, listing_id, rating, comment, parent_id, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and applies the embedded migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_err)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| DomainError::internal(format!("migration failed: {err}")))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// Inserts any missing node of `tree`. Existing names are matched
    /// case-insensitively under the same parent, so reruns are no-ops.
    pub async fn seed_categories(&self, tree: &[SeedNode]) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut inserted = 0;
        for (main, subs) in tree {
            let main_id = Self::ensure_category(&mut tx, main, None, &mut inserted).await?;
            for (sub, leaves) in subs.iter() {
                let sub_id = Self::ensure_category(&mut tx, sub, Some(main_id), &mut inserted).await?;
                for leaf in leaves.iter() {
                    Self::ensure_category(&mut tx, leaf, Some(sub_id), &mut inserted).await?;
                }
            }
        }
        tx.commit().await.map_err(db_err)?;
        tracing::info!(inserted, "category tree seeded");
        Ok(inserted)
    }

    async fn ensure_category(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        name: &str,
        parent_id: Option<CategoryId>,
        inserted: &mut usize,
    ) -> Result<CategoryId> {
        let existing: Option<i32> = sqlx::query_scalar(SIBLING_BY_SLUG)
            .bind(parent_id)
            .bind(slugify(name))
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let id: i32 =
            sqlx::query_scalar("INSERT INTO categories (name, parent_id) VALUES ($1, $2) RETURNING id")
                .bind(name)
                .bind(parent_id)
                .fetch_one(&mut **tx)
                .await
                .map_err(db_err)?;
        *inserted += 1;
        Ok(id)
    }

    async fn lock_listing(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        id: ListingId,
    ) -> Result<Option<Listing>> {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1 FOR UPDATE");
        let row: Option<ListingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(row.map(Listing::from))
    }
}

fn db_err(err: sqlx::Error) -> DomainError {
    if let Some(db) = err.as_database_error() {
        if db.is_unique_violation() {
            return DomainError::Conflict(db.message().to_string());
        }
        if db.is_foreign_key_violation() {
            return DomainError::validation("referenced record does not exist");
        }
    }
    tracing::error!(error = %err, "database error");
    DomainError::internal(err.to_string())
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i32,
    name: String,
    description: Option<String>,
    parent_id: Option<i32>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            parent_id: row.parent_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: i64,
    title: String,
    description: String,
    subcategory_id: i32,
    price: Option<Decimal>,
    currency: String,
    town: Option<String>,
    address: Option<String>,
    user_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    views: i64,
    cover_image: Option<String>,
    images: Option<String>,
    is_boosted: bool,
    boost_type: Option<String>,
    boost_expires_at: Option<DateTime<Utc>>,
    tags: Option<String>,
    condition: Option<String>,
    negotiable: bool,
    delivery_available: bool,
    rating: Option<f64>,
}

impl From<ListingRow> for Listing {
    fn from(row: ListingRow) -> Self {
        let status = row.status.parse().unwrap_or_else(|_| {
            tracing::warn!(listing_id = row.id, status = %row.status, "unknown listing status");
            ListingStatus::Inactive
        });
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            subcategory_id: row.subcategory_id,
            price: row.price,
            currency: row.currency,
            town: row.town,
            address: row.address,
            user_id: UserId::new(row.user_id),
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
            views: row.views,
            cover_image: row.cover_image,
            images: decode_string_array(row.images.as_deref()),
            is_boosted: row.is_boosted,
            boost_type: row.boost_type,
            boost_expires_at: row.boost_expires_at,
            tags: decode_string_array(row.tags.as_deref()),
            condition: row.condition,
            negotiable: row.negotiable,
            delivery_available: row.delivery_available,
            rating: row.rating,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: i64,
    user_id: String,
    listing_id: i64,
    rating: i16,
    comment: String,
    parent_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: row.id,
            user_id: UserId::new(row.user_id),
            listing_id: row.listing_id,
            rating: row.rating,
            comment: row.comment,
            parent_id: row.parent_id,
            created_at: row.created_at,
        }
    }
}

/// Escapes `%`, `_` and `\` for an ILIKE pattern.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Appends the WHERE clause for `filter`. Mirrors `ListingFilter::matches`.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ListingFilter) {
    qb.push(" WHERE TRUE");

    if let Some(ids) = &filter.category_ids {
        qb.push(" AND subcategory_id = ANY(")
            .push_bind(ids.iter().copied().collect::<Vec<CategoryId>>())
            .push(")");
    }
    if let Some(term) = filter.search.as_deref().map(str::trim) {
        let pattern = like_pattern(term);
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(
                " OR EXISTS (SELECT 1 FROM jsonb_array_elements_text(\
                 string_array_or_empty(tags)) AS t(tag) WHERE lower(t.tag) = lower(",
            )
            .push_bind(term.to_string())
            .push(")))");
    }
    if let Some(location) = &filter.location {
        qb.push(" AND lower(town) = lower(")
            .push_bind(location.trim().to_string())
            .push(")");
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND price <= ").push_bind(max);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
}

fn order_by(sort: ListingSort) -> &'static str {
    match sort {
        ListingSort::Featured => {
            " ORDER BY (is_boosted AND (boost_expires_at IS NULL OR boost_expires_at > now())) DESC, \
             created_at DESC, id DESC"
        }
        ListingSort::Newest => " ORDER BY created_at DESC, id DESC",
        ListingSort::Oldest => " ORDER BY created_at ASC, id ASC",
        ListingSort::PriceAsc => " ORDER BY price ASC NULLS LAST, id DESC",
        ListingSort::PriceDesc => " ORDER BY price DESC NULLS LAST, id DESC",
    }
}

#[async_trait]
impl CategoryRepository for PgStore {
    async fn list_all(&self) -> Result<Vec<Category>> {
        let rows: Vec<CategoryRow> =
            sqlx::query_as("SELECT id, name, description, parent_id FROM categories ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(rows.into_iter().map(Category::from).collect())
    }
}

#[async_trait]
impl ListingRepository for PgStore {
    async fn find_by_id(&self, id: ListingId) -> Result<Option<Listing>> {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1");
        let row: Option<ListingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Listing::from))
    }

    /// Count and page run in one read-only snapshot transaction so the total
    /// always describes the page that came back with it.
    async fn query(&self, filter: &ListingFilter, page: PageRequest) -> Result<(Vec<Listing>, u64)> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM listings");
        push_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {LISTING_COLUMNS} FROM listings"));
        push_filter(&mut select, filter);
        select
            .push(order_by(filter.sort))
            .push(" LIMIT ")
            .push_bind(i64::from(page.limit()))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows: Vec<ListingRow> = select
            .build_query_as()
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok((rows.into_iter().map(Listing::from).collect(), total.max(0) as u64))
    }

    async fn search(&self, filter: &ListingFilter, limit: u32) -> Result<Vec<Listing>> {
        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {LISTING_COLUMNS} FROM listings"));
        push_filter(&mut select, filter);
        select
            .push(order_by(filter.sort))
            .push(" LIMIT ")
            .push_bind(i64::from(limit));
        let rows: Vec<ListingRow> = select
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }

    async fn create(&self, owner: &UserId, new: NewListing) -> Result<Listing> {
        let sql = format!(
            "INSERT INTO listings (title, description, subcategory_id, price, currency, town, \
             address, user_id, expires_at, cover_image, images, tags, condition, negotiable, \
             delivery_available) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {LISTING_COLUMNS}"
        );
        let row: ListingRow = sqlx::query_as(&sql)
            .bind(new.title.trim())
            .bind(&new.description)
            .bind(new.subcategory_id)
            .bind(new.price)
            .bind(&new.currency)
            .bind(&new.town)
            .bind(&new.address)
            .bind(owner.as_str())
            .bind(new.expires_at)
            .bind(&new.cover_image)
            .bind(encode_string_array(&new.images))
            .bind(encode_string_array(&new.tags))
            .bind(&new.condition)
            .bind(new.negotiable)
            .bind(new.delivery_available)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.into())
    }

    async fn update_owned(
        &self,
        id: ListingId,
        owner: &UserId,
        patch: ListingPatch,
    ) -> Result<OwnedMutation<Listing>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut listing = match Self::lock_listing(&mut tx, id).await? {
            None => return Ok(OwnedMutation::NotFound),
            Some(l) if &l.user_id != owner => return Ok(OwnedMutation::NotOwner),
            Some(l) => l,
        };
        patch.apply_to(&mut listing, Utc::now());

        let sql = format!(
            "UPDATE listings SET title = $1, description = $2, subcategory_id = $3, price = $4, \
             town = $5, address = $6, status = $7, images = $8, tags = $9, condition = $10, \
             negotiable = $11, delivery_available = $12, updated_at = $13 \
             WHERE id = $14 RETURNING {LISTING_COLUMNS}"
        );
        let row: ListingRow = sqlx::query_as(&sql)
            .bind(&listing.title)
            .bind(&listing.description)
            .bind(listing.subcategory_id)
            .bind(listing.price)
            .bind(&listing.town)
            .bind(&listing.address)
            .bind(listing.status.as_str())
            .bind(encode_string_array(&listing.images))
            .bind(encode_string_array(&listing.tags))
            .bind(&listing.condition)
            .bind(listing.negotiable)
            .bind(listing.delivery_available)
            .bind(listing.updated_at)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(OwnedMutation::Applied(row.into()))
    }

    async fn delete_owned(&self, id: ListingId, owner: &UserId) -> Result<OwnedMutation<Listing>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let listing = match Self::lock_listing(&mut tx, id).await? {
            None => return Ok(OwnedMutation::NotFound),
            Some(l) if &l.user_id != owner => return Ok(OwnedMutation::NotOwner),
            Some(l) => l,
        };

        sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(OwnedMutation::Applied(listing))
    }
}

#[async_trait]
impl ReviewRepository for PgStore {
    async fn find_by_id(&self, id: ReviewId) -> Result<Option<Review>> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1");
        let row: Option<ReviewRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Review::from))
    }

    async fn create(&self, new: NewReview) -> Result<Review> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let sql = format!(
            "INSERT INTO reviews (user_id, listing_id, rating, comment, parent_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {REVIEW_COLUMNS}"
        );
        let row: ReviewRow = sqlx::query_as(&sql)
            .bind(new.user_id.as_str())
            .bind(new.listing_id)
            .bind(new.rating)
            .bind(&new.comment)
            .bind(new.parent_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

        if row.parent_id.is_none() {
            sqlx::query(
                "UPDATE listings SET rating = (SELECT AVG(rating)::float8 FROM reviews \
                 WHERE listing_id = $1 AND parent_id IS NULL) WHERE id = $1",
            )
            .bind(new.listing_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(row.into())
    }

    async fn list_top_level(
        &self,
        listing_id: ListingId,
        before: Option<ReviewId>,
        limit: u32,
    ) -> Result<Vec<Review>> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews \
             WHERE listing_id = $1 AND parent_id IS NULL AND ($2::BIGINT IS NULL OR id < $2) \
             ORDER BY id DESC LIMIT $3"
        );
        let rows: Vec<ReviewRow> = sqlx::query_as(&sql)
            .bind(listing_id)
            .bind(before)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn list_replies(
        &self,
        parent_id: ReviewId,
        after: Option<ReviewId>,
        limit: u32,
    ) -> Result<Vec<Review>> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews \
             WHERE parent_id = $1 AND ($2::BIGINT IS NULL OR id > $2) \
             ORDER BY id ASC LIMIT $3"
        );
        let rows: Vec<ReviewRow> = sqlx::query_as(&sql)
            .bind(parent_id)
            .bind(after)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn reply_counts(&self, parent_ids: &[ReviewId]) -> Result<HashMap<ReviewId, u64>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT parent_id, COUNT(*) FROM reviews WHERE parent_id = ANY($1) GROUP BY parent_id",
        )
        .bind(parent_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|(parent, count)| (parent, count.max(0) as u64))
            .collect())
    }
}
