//! # seed
//!
//! Applies migrations and inserts the default category tree. Safe to rerun.

use anyhow::Context;
use secrecy::ExposeSecret;

use configs::Settings;
use storage_adapters::{PgStore, DEFAULT_TREE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log.filter)),
        )
        .init();

    if settings.uses_memory_store() {
        anyhow::bail!("database.url is 'memory'; the in-memory store seeds itself at startup");
    }

    let store = PgStore::connect(
        settings.database.url.expose_secret(),
        settings.database.max_connections,
    )
    .await
    .context("connecting to postgres")?;

    let inserted = store
        .seed_categories(DEFAULT_TREE)
        .await
        .context("seeding categories")?;
    tracing::info!(inserted, "seed complete");
    Ok(())
}
