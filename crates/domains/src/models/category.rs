//! # Category hierarchy
//!
//! Categories form a shallow tree: main → sub → sub-sub. Listings attach to
//! the leaves. The tree is held as an arena addressed by id; parents are
//! optional id references, never embedded records, and every walk is an
//! explicit loop bounded by [`MAX_DEPTH`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, Result};

pub type CategoryId = i32;

/// Number of levels the canonical URL scheme understands.
pub const MAX_DEPTH: usize = 3;

/// A single category row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
}

/// Nested representation served by the categories endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub children: Vec<CategoryNode>,
}

/// The slugified (main, sub, sub-sub) triple identifying a leaf category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPath {
    pub main: String,
    pub sub: String,
    pub sub_sub: String,
}

impl CategoryPath {
    pub fn segments(&self) -> [&str; 3] {
        [&self.main, &self.sub, &self.sub_sub]
    }
}

impl fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.main, self.sub, self.sub_sub)
    }
}

/// Human-readable category names for one to three levels, as parsed from a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryNames {
    main: String,
    sub: Option<String>,
    sub_sub: Option<String>,
}

impl CategoryNames {
    /// Builds a name path. A deeper level without its parent level is a
    /// malformed request, not an empty result.
    pub fn new(main: &str, sub: Option<&str>, sub_sub: Option<&str>) -> Result<Self> {
        let clean = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        let main = clean(Some(main))
            .ok_or_else(|| DomainError::validation("main category name must not be empty"))?;
        let sub = clean(sub);
        let sub_sub = clean(sub_sub);
        if sub.is_none() && sub_sub.is_some() {
            return Err(DomainError::validation(
                "a sub-subcategory requires a subcategory",
            ));
        }
        Ok(Self { main, sub, sub_sub })
    }

    pub fn main(&self) -> &str {
        &self.main
    }

    pub fn sub(&self) -> Option<&str> {
        self.sub.as_deref()
    }

    pub fn sub_sub(&self) -> Option<&str> {
        self.sub_sub.as_deref()
    }
}

/// Lowercases a name and collapses whitespace runs into single hyphens.
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Id-addressed arena over every category row.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    by_id: HashMap<CategoryId, Category>,
    /// Child ids per parent, in fetch order. `None` holds the roots.
    children: HashMap<Option<CategoryId>, Vec<CategoryId>>,
}

impl CategoryTree {
    pub fn new(categories: Vec<Category>) -> Self {
        let mut tree = Self::default();
        for category in categories {
            tree.children
                .entry(category.parent_id)
                .or_default()
                .push(category.id);
            tree.by_id.insert(category.id, category);
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.by_id.get(&id)
    }

    pub fn children(&self, id: CategoryId) -> &[CategoryId] {
        self.children.get(&Some(id)).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roots(&self) -> &[CategoryId] {
        self.children.get(&None).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_leaf(&self, id: CategoryId) -> bool {
        self.by_id.contains_key(&id) && self.children(id).is_empty()
    }

    /// Walks the leaf's parent links and returns its slugified path.
    pub fn resolve_path(&self, id: CategoryId) -> Result<CategoryPath> {
        let leaf = self.get(id).ok_or(DomainError::CategoryNotFound(id))?;
        if !self.children(id).is_empty() {
            return Err(DomainError::NotALeaf(id));
        }
        let parent = leaf
            .parent_id
            .and_then(|pid| self.get(pid))
            .ok_or(DomainError::IncompleteHierarchy(id))?;
        let main = parent
            .parent_id
            .and_then(|pid| self.get(pid))
            .ok_or(DomainError::IncompleteHierarchy(id))?;
        if main.parent_id.is_some() {
            return Err(DomainError::HierarchyTooDeep(id));
        }

        let path = CategoryPath {
            main: slugify(&main.name),
            sub: slugify(&parent.name),
            sub_sub: slugify(&leaf.name),
        };
        if path.segments().iter().any(|s| s.is_empty()) {
            return Err(DomainError::validation(format!(
                "category {id} has an empty name in its hierarchy"
            )));
        }
        Ok(path)
    }

    /// Maps names to the category ids a listing query should include.
    ///
    /// An unknown main category yields an empty set. An unknown deeper level
    /// keeps the set resolved at the last level that matched.
    pub fn resolve_id_set(&self, names: &CategoryNames) -> BTreeSet<CategoryId> {
        let Some(main) = self.find_child(None, names.main()) else {
            return BTreeSet::new();
        };

        let Some(sub) = names.sub().and_then(|name| self.find_child(Some(main), name)) else {
            return self.descendants(main, 2);
        };

        match names
            .sub_sub()
            .and_then(|name| self.find_child(Some(sub), name))
        {
            Some(sub_sub) => BTreeSet::from([sub_sub]),
            None => self.descendants(sub, 1),
        }
    }

    /// Reverse of [`resolve_path`](Self::resolve_path).
    pub fn find_by_path(&self, path: &CategoryPath) -> Option<CategoryId> {
        let main = self.find_child(None, &path.main)?;
        let sub = self.find_child(Some(main), &path.sub)?;
        self.find_child(Some(sub), &path.sub_sub)
    }

    /// The category itself plus every descendant down to the leaf level.
    /// Unknown ids expand to an empty set.
    pub fn expand(&self, id: CategoryId) -> BTreeSet<CategoryId> {
        match self.level(id) {
            Some(level) => self.descendants(id, (MAX_DEPTH - 1).saturating_sub(level)),
            None => BTreeSet::new(),
        }
    }

    /// Nested view of the whole tree, roots first.
    pub fn to_nodes(&self) -> Vec<CategoryNode> {
        self.roots().iter().filter_map(|&id| self.node(id)).collect()
    }

    fn node(&self, id: CategoryId) -> Option<CategoryNode> {
        let category = self.get(id)?;
        Some(CategoryNode {
            id,
            name: category.name.clone(),
            slug: slugify(&category.name),
            description: category.description.clone(),
            parent_id: category.parent_id,
            children: self
                .children(id)
                .iter()
                .filter_map(|&child| self.node(child))
                .collect(),
        })
    }

    /// Zero-based depth (0 = main). `None` for unknown ids or chains
    /// longer than the supported depth.
    fn level(&self, id: CategoryId) -> Option<usize> {
        let mut current = self.get(id)?;
        for level in 0..MAX_DEPTH {
            match current.parent_id {
                None => return Some(level),
                Some(pid) => current = self.get(pid)?,
            }
        }
        None
    }

    fn find_child(&self, parent: Option<CategoryId>, name: &str) -> Option<CategoryId> {
        let wanted = slugify(name);
        self.children
            .get(&parent)?
            .iter()
            .copied()
            .find(|id| self.get(*id).is_some_and(|c| slugify(&c.name) == wanted))
    }

    fn descendants(&self, root: CategoryId, depth: usize) -> BTreeSet<CategoryId> {
        let mut ids = BTreeSet::from([root]);
        let mut frontier = vec![root];
        for _ in 0..depth {
            let next: Vec<CategoryId> = frontier
                .iter()
                .flat_map(|&id| self.children(id).iter().copied())
                .filter(|id| ids.insert(*id))
                .collect();
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: CategoryId, name: &str, parent_id: Option<CategoryId>) -> Category {
        Category {
            id,
            name: name.to_string(),
            description: None,
            parent_id,
        }
    }

    fn tree() -> CategoryTree {
        CategoryTree::new(vec![
            cat(1, "Electronics", None),
            cat(2, "Phones", Some(1)),
            cat(3, "Smartphones", Some(2)),
            cat(4, "Feature Phones", Some(2)),
            cat(5, "Computers", Some(1)),
            cat(6, "Laptops", Some(5)),
            cat(7, "Home  &  Garden", None),
        ])
    }

    #[test]
    fn slugify_lowercases_and_collapses_whitespace() {
        assert_eq!(slugify("Feature Phones"), "feature-phones");
        assert_eq!(slugify("  Home \t &  Garden "), "home-&-garden");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn resolve_path_returns_three_slugs() {
        let path = tree().resolve_path(4).unwrap();
        assert_eq!(path.segments(), ["electronics", "phones", "feature-phones"]);
        assert_eq!(path.to_string(), "electronics/phones/feature-phones");
    }

    #[test]
    fn resolve_path_round_trips_through_find_by_path() {
        let tree = tree();
        for leaf in [3, 4, 6] {
            let path = tree.resolve_path(leaf).unwrap();
            assert_eq!(tree.find_by_path(&path), Some(leaf));
        }
    }

    #[test]
    fn resolve_path_rejects_inner_and_shallow_categories() {
        let tree = tree();
        assert_eq!(tree.resolve_path(1), Err(DomainError::NotALeaf(1)));
        assert_eq!(tree.resolve_path(2), Err(DomainError::NotALeaf(2)));
        // a childless top-level row is a leaf without ancestors
        assert_eq!(tree.resolve_path(7), Err(DomainError::IncompleteHierarchy(7)));
        assert_eq!(tree.resolve_path(99), Err(DomainError::CategoryNotFound(99)));
    }

    #[test]
    fn resolve_path_rejects_deep_categories() {
        let mut rows = vec![cat(1, "A", None), cat(2, "B", Some(1)), cat(3, "C", Some(2))];
        rows.push(cat(4, "D", Some(3)));
        let tree = CategoryTree::new(rows);
        assert_eq!(tree.resolve_path(4), Err(DomainError::HierarchyTooDeep(4)));
    }

    #[test]
    fn resolve_path_treats_dangling_parent_as_incomplete() {
        let tree = CategoryTree::new(vec![cat(2, "Phones", Some(1)), cat(3, "Smartphones", Some(2))]);
        assert_eq!(tree.resolve_path(3), Err(DomainError::IncompleteHierarchy(3)));
    }

    #[test]
    fn resolve_id_set_narrows_monotonically() {
        let tree = tree();
        let main = tree.resolve_id_set(&CategoryNames::new("electronics", None, None).unwrap());
        let sub = tree.resolve_id_set(&CategoryNames::new("electronics", Some("phones"), None).unwrap());
        let leaf = tree.resolve_id_set(
            &CategoryNames::new("electronics", Some("phones"), Some("smartphones")).unwrap(),
        );

        assert_eq!(main, BTreeSet::from([1, 2, 3, 4, 5, 6]));
        assert_eq!(sub, BTreeSet::from([2, 3, 4]));
        assert_eq!(leaf, BTreeSet::from([3]));
        assert!(main.is_superset(&sub) && main != sub);
        assert!(sub.is_superset(&leaf) && sub != leaf);
    }

    #[test]
    fn resolve_id_set_matches_names_case_insensitively() {
        let names = CategoryNames::new("ELECTRONICS", Some("Feature Phones"), None).unwrap();
        assert_eq!(tree().resolve_id_set(&names), BTreeSet::from([4]));
    }

    #[test]
    fn resolve_id_set_unknown_main_is_empty() {
        let names = CategoryNames::new("nonexistent-main", None, None).unwrap();
        assert!(tree().resolve_id_set(&names).is_empty());
    }

    #[test]
    fn resolve_id_set_keeps_last_resolved_level() {
        let tree = tree();
        let unknown_sub = CategoryNames::new("electronics", Some("cameras"), None).unwrap();
        assert_eq!(tree.resolve_id_set(&unknown_sub), BTreeSet::from([1, 2, 3, 4, 5, 6]));

        let unknown_leaf = CategoryNames::new("electronics", Some("phones"), Some("pagers")).unwrap();
        assert_eq!(tree.resolve_id_set(&unknown_leaf), BTreeSet::from([2, 3, 4]));
    }

    #[test]
    fn duplicate_sibling_names_use_first_in_fetch_order() {
        let tree = CategoryTree::new(vec![
            cat(1, "Electronics", None),
            cat(9, "Phones", Some(1)),
            cat(2, "phones", Some(1)),
        ]);
        let names = CategoryNames::new("electronics", Some("phones"), None).unwrap();
        assert_eq!(tree.resolve_id_set(&names), BTreeSet::from([9]));
    }

    #[test]
    fn category_names_reject_malformed_shapes() {
        assert!(CategoryNames::new("  ", None, None).is_err());
        assert!(CategoryNames::new("electronics", None, Some("smartphones")).is_err());
        let names = CategoryNames::new("electronics", Some(""), None).unwrap();
        assert_eq!(names.sub(), None);
    }

    #[test]
    fn expand_depends_on_level() {
        let tree = tree();
        assert_eq!(tree.expand(1), BTreeSet::from([1, 2, 3, 4, 5, 6]));
        assert_eq!(tree.expand(5), BTreeSet::from([5, 6]));
        assert_eq!(tree.expand(3), BTreeSet::from([3]));
        assert!(tree.expand(42).is_empty());
    }

    #[test]
    fn to_nodes_nests_children_under_roots() {
        let nodes = tree().to_nodes();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].children.len(), 2);
        assert_eq!(nodes[0].children[0].children[1].slug, "feature-phones");
        assert!(nodes[1].children.is_empty());
    }

    #[test]
    fn leaves_are_categories_without_children() {
        let tree = tree();
        assert!(tree.is_leaf(3));
        assert!(!tree.is_leaf(2));
        assert!(!tree.is_leaf(100));
    }
}
