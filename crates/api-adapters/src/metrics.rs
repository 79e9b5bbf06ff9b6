//! Prometheus counters exposed on `/metrics`.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

pub struct Metrics {
    registry: Registry,
    pub listing_queries: Counter,
    pub listing_query_failures: Counter,
    pub searches: Counter,
    pub reviews_created: Counter,
    pub listings_deleted: Counter,
    pub image_cleanup_failures: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("classifieds");
        let listing_queries = Counter::default();
        let listing_query_failures = Counter::default();
        let searches = Counter::default();
        let reviews_created = Counter::default();
        let listings_deleted = Counter::default();
        let image_cleanup_failures = Counter::default();

        registry.register(
            "listing_queries",
            "Listing page reads served",
            listing_queries.clone(),
        );
        registry.register(
            "listing_query_failures",
            "Listing page reads answered with the empty failure result",
            listing_query_failures.clone(),
        );
        registry.register("searches", "Type-ahead searches served", searches.clone());
        registry.register(
            "reviews_created",
            "Reviews and replies stored",
            reviews_created.clone(),
        );
        registry.register(
            "listings_deleted",
            "Listings deleted by their owners",
            listings_deleted.clone(),
        );
        registry.register(
            "image_cleanup_failures",
            "Image deletions that failed after a listing delete",
            image_cleanup_failures.clone(),
        );

        Self {
            registry,
            listing_queries,
            listing_query_failures,
            searches,
            reviews_created,
            listings_deleted,
            image_cleanup_failures,
        }
    }

    /// OpenMetrics text exposition of every registered counter.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_rendered_with_prefix() {
        let metrics = Metrics::new();
        metrics.listing_queries.inc();
        metrics.listing_queries.inc();
        let text = metrics.render().unwrap();
        assert!(text.contains("classifieds_listing_queries_total 2"));
        assert!(text.contains("classifieds_image_cleanup_failures_total 0"));
        assert!(text.ends_with("# EOF\n"));
    }
}
