use std::sync::Arc;
use std::time::Duration;

use domains::TokenVerifier;
use services::{CategoryService, ListingService, ReviewService};

use crate::metrics::Metrics;

/// Request-independent limits the handlers enforce.
#[derive(Debug, Clone)]
pub struct ApiLimits {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub query_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl ApiLimits {
    pub fn from_settings(settings: &configs::Settings) -> Self {
        Self {
            default_page_size: settings.listings.default_page_size,
            max_page_size: settings.listings.max_page_size,
            query_timeout: settings.listings.query_timeout(),
            max_upload_bytes: settings.media.max_upload_bytes,
        }
    }
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
            query_timeout: Duration::from_secs(5),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// State shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub categories: CategoryService,
    pub listings: ListingService,
    pub reviews: ReviewService,
    pub media: Arc<dyn domains::MediaStorage>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub metrics: Arc<Metrics>,
    pub limits: ApiLimits,
}
