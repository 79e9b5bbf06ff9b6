//! # auth-adapters
//!
//! Bearer-token verification. Accounts live with an external provider; this
//! crate only turns a token into the `UserId` it was issued for.

#[cfg(feature = "auth-jwt")]
pub mod jwt;
#[cfg(feature = "auth-jwt")]
pub use jwt::JwtVerifier;
