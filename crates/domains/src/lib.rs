//! # domains
//!
//! Entities, pure category/listing logic and the port traits of the
//! classifieds marketplace. No I/O lives here.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, Result};
pub use models::*;
pub use ports::*;
