//! # storage-adapters
//!
//! Implementations of the `domains` storage ports.

pub mod memory;
pub mod seed;

pub use memory::InMemoryStore;
pub use seed::{default_categories, DEFAULT_TREE};

#[cfg(feature = "db-postgres")]
pub mod postgres;
#[cfg(feature = "db-postgres")]
pub use postgres::PgStore;

#[cfg(feature = "media-local")]
pub mod media;
#[cfg(feature = "media-local")]
pub use media::LocalMediaStorage;
