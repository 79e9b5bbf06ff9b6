//! # CategoryService
//!
//! Serves the category hierarchy from a cached [`CategoryTree`] snapshot.
//! The snapshot is loaded on first use, expires with the cache TTL and can be
//! invalidated explicitly after an out-of-band category change.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use domains::{
    CategoryId, CategoryNames, CategoryNode, CategoryPath, CategoryRepository, CategoryTree,
    DomainError, Result,
};

use crate::cache::TtlCache;

const TREE_KEY: &str = "categories:tree";
pub const CATEGORIES_TAG: &str = "categories";

/// Unknown ids force at most one reload per this interval.
const RELOAD_INTERVAL: Duration = Duration::from_secs(30);

pub type CategoryCache = TtlCache<Arc<CategoryTree>>;

#[derive(Clone)]
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<CategoryCache>,
    last_reload: Arc<Mutex<Option<Instant>>>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<CategoryCache>) -> Self {
        Self {
            repo,
            cache,
            last_reload: Arc::new(Mutex::new(None)),
        }
    }

    /// The current tree snapshot, loading it if absent or expired.
    pub async fn snapshot(&self) -> Result<Arc<CategoryTree>> {
        self.cache
            .get_or_try_insert_with(TREE_KEY, &[CATEGORIES_TAG], || async {
                let rows = self.repo.list_all().await?;
                tracing::debug!(count = rows.len(), "category tree loaded");
                Ok::<_, DomainError>(Arc::new(CategoryTree::new(rows)))
            })
            .await
    }

    pub fn invalidate(&self) {
        self.cache.invalidate_tag(CATEGORIES_TAG);
    }

    /// Nested tree, top-level categories at the root.
    pub async fn tree(&self) -> Result<Vec<CategoryNode>> {
        Ok(self.snapshot().await?.to_nodes())
    }

    /// Canonical (main, sub, sub-sub) slugs for a leaf category.
    pub async fn resolve_path(&self, id: CategoryId) -> Result<CategoryPath> {
        let tree = self.snapshot().await?;
        match tree.resolve_path(id) {
            Err(DomainError::CategoryNotFound(_)) => self.reload_if_due(tree).await?.resolve_path(id),
            other => other,
        }
    }

    /// Category ids a listing query should include for the given names.
    pub async fn resolve_id_set(&self, names: &CategoryNames) -> Result<BTreeSet<CategoryId>> {
        Ok(self.snapshot().await?.resolve_id_set(names))
    }

    /// The category and all of its descendants. Unknown ids give an empty set.
    pub async fn expand(&self, id: CategoryId) -> Result<BTreeSet<CategoryId>> {
        Ok(self.snapshot().await?.expand(id))
    }

    /// Fails with `CategoryNotFound` for unknown ids.
    pub async fn is_leaf(&self, id: CategoryId) -> Result<bool> {
        let mut tree = self.snapshot().await?;
        if tree.get(id).is_none() {
            tree = self.reload_if_due(tree).await?;
        }
        if tree.get(id).is_none() {
            return Err(DomainError::CategoryNotFound(id));
        }
        Ok(tree.is_leaf(id))
    }

    /// A fresh snapshot for an id `current` does not know yet, or `current`
    /// itself when the last such reload was less than [`RELOAD_INTERVAL`] ago.
    async fn reload_if_due(&self, current: Arc<CategoryTree>) -> Result<Arc<CategoryTree>> {
        {
            let mut last = self.last_reload.lock().unwrap_or_else(PoisonError::into_inner);
            if last.is_some_and(|at| at.elapsed() < RELOAD_INTERVAL) {
                return Ok(current);
            }
            *last = Some(Instant::now());
        }
        tracing::debug!("unknown category id, reloading the tree");
        self.invalidate();
        self.snapshot().await
    }
}
