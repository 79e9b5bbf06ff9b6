//! # configs
//!
//! Layered application settings. Later sources override earlier ones:
//!
//! 1. built-in defaults
//! 2. `config/default.toml` (optional)
//! 3. `config/local.toml` (optional, not committed)
//! 4. `APP__*` environment variables, `__` separating nested keys
//!    (`APP__DATABASE__URL`, `APP__SERVER__PORT`)
//!
//! A `.env` file, when present, is loaded into the environment first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// `database.url` value that selects the in-memory store.
pub const MEMORY_DATABASE_URL: &str = "memory";

/// Shortest accepted HMAC key for `auth.jwt_secret`, in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Paths owned by the API router; uploads cannot be served under them.
const RESERVED_PREFIXES: [&str; 3] = ["/api", "/health", "/metrics"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub media: MediaSettings,
    pub cache: CacheSettings,
    pub listings: ListingSettings,
    pub log: LogSettings,
    /// Public origin used when building absolute links.
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: SecretString,
    pub issuer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    pub root: PathBuf,
    pub url_prefix: String,
    pub max_upload_bytes: usize,
}

impl MediaSettings {
    /// `url_prefix` without trailing slashes, as mounted on the router.
    pub fn route_prefix(&self) -> &str {
        self.url_prefix.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub ttl_secs: u64,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingSettings {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub query_timeout_ms: u64,
}

impl ListingSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Settings {
    /// Loads `.env`, then the layered sources rooted at `./config`.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), ".env loaded");
        }
        Self::load_from(Path::new("config"), None)
    }

    /// Loads from `dir`. `env` replaces the process environment when given.
    pub fn load_from(dir: &Path, env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let environment = Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("server.cors_origins")
            .try_parsing(true)
            .source(env.map(|vars| vars.into_iter().collect()));

        let settings: Settings = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.cors_origins", Vec::<String>::new())?
            .set_default("database.url", MEMORY_DATABASE_URL)?
            .set_default("database.max_connections", 10)?
            .set_default("auth.jwt_secret", "")?
            .set_default("media.root", "./data/uploads")?
            .set_default("media.url_prefix", "/uploads")?
            .set_default("media.max_upload_bytes", 10 * 1024 * 1024)?
            .set_default("cache.ttl_secs", 300)?
            .set_default("listings.default_page_size", 10)?
            .set_default("listings.max_page_size", 100)?
            .set_default("listings.query_timeout_ms", 5000)?
            .set_default("log.filter", "info")?
            .set_default("log.json", false)?
            .set_default("base_url", "http://localhost:8080")?
            .add_source(File::from(dir.join("default.toml")).required(false))
            .add_source(File::from(dir.join("local.toml")).required(false))
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database.url.expose_secret() == MEMORY_DATABASE_URL
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let listings = &self.listings;
        if listings.default_page_size == 0 || listings.max_page_size == 0 {
            return Err(ConfigError::Invalid("page sizes must be positive".into()));
        }
        if listings.default_page_size > listings.max_page_size {
            return Err(ConfigError::Invalid(
                "listings.default_page_size exceeds listings.max_page_size".into(),
            ));
        }
        if listings.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid("listings.query_timeout_ms must be positive".into()));
        }
        if self.auth.jwt_secret.expose_secret().len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "auth.jwt_secret must be at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }
        if self.media.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("media.max_upload_bytes must be positive".into()));
        }
        self.validate_upload_prefix()
    }

    fn validate_upload_prefix(&self) -> Result<(), ConfigError> {
        let prefix = self.media.route_prefix();
        let invalid = |reason: &str| {
            Err(ConfigError::Invalid(format!(
                "media.url_prefix '{}' {reason}",
                self.media.url_prefix
            )))
        };
        if !prefix.starts_with('/') || prefix.len() < 2 {
            return invalid("must be an absolute path below the root");
        }
        if prefix.contains(|c: char| c.is_whitespace() || matches!(c, '{' | '}' | '*' | '?' | '#')) {
            return invalid("must be a plain path");
        }
        let reserved = RESERVED_PREFIXES
            .iter()
            .any(|r| prefix == *r || prefix.starts_with(&format!("{r}/")));
        if reserved {
            return invalid("collides with an API route");
        }
        Ok(())
    }
}
