//! # Domain Models
//!
//! These structs represent the core entities of the classifieds marketplace.
//! Listings and reviews use the store's integer ids; users are identified by
//! the opaque subject issued by the external auth provider.

mod category;
mod listing;
mod review;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use category::*;
pub use listing::*;
pub use review::*;

/// Opaque user identifier (the token subject).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
