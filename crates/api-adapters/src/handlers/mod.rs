//! # Handlers
//!
//! Thin adapters between HTTP and the services: extract, call, map the
//! result. No business rule lives here.

pub mod categories;
pub mod health;
pub mod listings;
pub mod media;
pub mod reviews;
