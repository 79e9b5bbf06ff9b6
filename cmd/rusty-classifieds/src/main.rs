//! # rusty-classifieds
//!
//! The entry point that assembles the application from compile-time features
//! and runtime settings.

#[cfg(not(all(feature = "web-axum", feature = "auth-jwt", feature = "media-local")))]
compile_error!("rusty-classifieds needs the web-axum, auth-jwt and media-local features");

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use api_adapters::{build_router, ApiLimits, AppState, HttpOptions, Metrics};
use auth_adapters::JwtVerifier;
use configs::{LogSettings, Settings};
use domains::{CategoryRepository, ListingRepository, MediaStorage, ReviewRepository};
use services::{CategoryService, ListingService, ReviewService, TtlCache};
use storage_adapters::{default_categories, InMemoryStore, LocalMediaStorage};

#[cfg(feature = "db-postgres")]
use secrecy::ExposeSecret;
#[cfg(feature = "db-postgres")]
use storage_adapters::PgStore;

struct Stores {
    categories: Arc<dyn CategoryRepository>,
    listings: Arc<dyn ListingRepository>,
    reviews: Arc<dyn ReviewRepository>,
}

impl Stores {
    fn shared<S>(store: Arc<S>) -> Self
    where
        S: CategoryRepository + ListingRepository + ReviewRepository + 'static,
    {
        Self {
            categories: store.clone(),
            listings: store.clone(),
            reviews: store,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    init_tracing(&settings.log);

    let stores = open_stores(&settings).await?;
    let media: Arc<dyn MediaStorage> = Arc::new(LocalMediaStorage::new(
        settings.media.root.clone(),
        settings.media.route_prefix(),
    ));
    let verifier = Arc::new(
        JwtVerifier::new(&settings.auth.jwt_secret, settings.auth.issuer.as_deref())
            .context("building the token verifier")?,
    );

    let ttl = settings.cache.ttl();
    let categories = CategoryService::new(stores.categories, Arc::new(TtlCache::new(ttl)));
    let listing_cache = Arc::new(TtlCache::new(ttl));
    let listings = ListingService::new(
        stores.listings.clone(),
        categories.clone(),
        media.clone(),
        listing_cache.clone(),
    );
    let reviews = ReviewService::new(stores.reviews, stores.listings, listing_cache);

    let state = AppState {
        categories,
        listings,
        reviews,
        media,
        verifier,
        metrics: Arc::new(Metrics::new()),
        limits: ApiLimits::from_settings(&settings),
    };
    let options = HttpOptions {
        cors_origins: settings.server.cors_origins.clone(),
        uploads: Some((
            settings.media.route_prefix().to_string(),
            settings.media.root.clone(),
        )),
    };
    let app = build_router(state, &options);

    let addr = settings.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, base_url = %settings.base_url, "rusty-classifieds listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await
        .context("server error")?;
    tracing::info!("server stopped");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn open_stores(settings: &Settings) -> anyhow::Result<Stores> {
    if settings.uses_memory_store() {
        tracing::warn!("database.url is 'memory'; data is lost on restart");
        let store = InMemoryStore::with_categories(default_categories());
        return Ok(Stores::shared(Arc::new(store)));
    }

    connect_postgres(settings).await
}

#[cfg(feature = "db-postgres")]
async fn connect_postgres(settings: &Settings) -> anyhow::Result<Stores> {
    let store = PgStore::connect(
        settings.database.url.expose_secret(),
        settings.database.max_connections,
    )
    .await
    .context("connecting to postgres")?;
    Ok(Stores::shared(Arc::new(store)))
}

#[cfg(not(feature = "db-postgres"))]
async fn connect_postgres(_settings: &Settings) -> anyhow::Result<Stores> {
    anyhow::bail!("built without db-postgres; set database.url to \"memory\"")
}

async fn shutdown() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install the Ctrl+C handler");
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install the SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::warn!("signal received, starting graceful shutdown");
}
