//! # api-adapters
//!
//! The JSON HTTP surface of the marketplace.

pub mod metrics;

#[cfg(feature = "web-axum")]
pub mod dto;
#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod extract;
#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod middleware;
#[cfg(feature = "web-axum")]
pub mod state;

pub use metrics::Metrics;

#[cfg(feature = "web-axum")]
pub use router::{build_router, HttpOptions};
#[cfg(feature = "web-axum")]
pub use state::{ApiLimits, AppState};

#[cfg(feature = "web-axum")]
mod router {
    use std::path::PathBuf;

    use axum::extract::DefaultBodyLimit;
    use axum::routing::{get, post};
    use axum::Router;
    use tower_http::services::ServeDir;

    use crate::handlers::{categories, health, listings, media, reviews};
    use crate::middleware::standard_layers;
    use crate::state::AppState;

    /// Router options that are not part of the per-request state.
    #[derive(Debug, Clone, Default)]
    pub struct HttpOptions {
        pub cors_origins: Vec<String>,
        /// Serve stored uploads: (URL prefix, directory).
        pub uploads: Option<(String, PathBuf)>,
    }

    /// Configures every route of the API.
    pub fn build_router(state: AppState, options: &HttpOptions) -> Router {
        let upload_limit = state.limits.max_upload_bytes;

        let api = Router::new()
            .route("/categories", get(categories::tree))
            .route("/categories/{id}/path", get(categories::path))
            .route("/listings", get(listings::list).post(listings::create))
            .route("/listings/search", get(listings::search))
            .route(
                "/listings/{id}",
                get(listings::get)
                    .patch(listings::update)
                    .delete(listings::delete),
            )
            .route(
                "/listings/{id}/reviews",
                get(reviews::list).post(reviews::create),
            )
            .route("/reviews/{id}/replies", get(reviews::replies))
            .route(
                "/media",
                post(media::upload).layer(DefaultBodyLimit::max(upload_limit)),
            );

        let mut router = Router::new()
            .route("/health", get(health::health))
            .route("/metrics", get(health::metrics))
            .nest("/api", api);

        if let Some((prefix, dir)) = &options.uploads {
            router = router.nest_service(prefix, ServeDir::new(dir));
        }

        standard_layers(router.with_state(state), &options.cors_origins)
    }
}
