//! HS256 JWT implementation of `TokenVerifier`.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use domains::{DomainError, Result, TokenVerifier, UserId};

/// Shortest HMAC key accepted, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// `issuer`, when set, must match the token's `iss` claim. Keys shorter
    /// than [`MIN_SECRET_LEN`] are refused.
    pub fn new(secret: &SecretString, issuer: Option<&str>) -> Result<Self> {
        let secret = secret.expose_secret().as_bytes();
        if secret.len() < MIN_SECRET_LEN {
            return Err(DomainError::validation(format!(
                "jwt secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }
        Ok(Self {
            key: DecodingKey::from_secret(secret),
            validation,
        })
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<UserId> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|err| {
            tracing::debug!(error = %err, "token rejected");
            DomainError::Unauthorized("invalid or expired token".into())
        })?;

        let sub = data.claims.sub.trim();
        if sub.is_empty() {
            return Err(DomainError::Unauthorized("token has no subject".into()));
        }
        Ok(UserId::new(sub))
    }
}
