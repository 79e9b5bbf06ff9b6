//! # DomainError
//!
//! Centralized error handling for the classifieds core.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

use crate::models::CategoryId;

/// The primary error type for all domain and service operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Resource not found (e.g., Listing, Review)
    #[error("{entity} not found with ID {id}")]
    NotFound { entity: &'static str, id: String },

    /// The requested category row does not exist.
    #[error("category not found: {0}")]
    CategoryNotFound(CategoryId),

    /// The category has children, so it names no listing path.
    #[error("category {0} is not a leaf category")]
    NotALeaf(CategoryId),

    /// The category has fewer than two ancestors, so no 3-segment path exists.
    #[error("incomplete category hierarchy for category {0}")]
    IncompleteHierarchy(CategoryId),

    /// The category sits deeper than main → sub → sub-sub.
    #[error("category {0} is nested deeper than three levels")]
    HierarchyTooDeep(CategoryId),

    /// Validation failure (e.g., rating out of range, negative price)
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but not the owner of the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Infrastructure failure (e.g., DB down, media host unreachable)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// A specialized Result type for domain logic.
pub type Result<T> = std::result::Result<T, DomainError>;
