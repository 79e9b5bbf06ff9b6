use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;

use domains::{
    CategoryNames, DomainError, ListingPatch, ListingSort, NewListing, PageRequest, UserId,
    PLACEHOLDER_IMAGE_URL,
};
use integration_tests::{
    listing, Harness, FEATURE_PHONES, LAPTOPS, OTHER_USER, SEDANS, SELLER, SMARTPHONES,
};
use services::{CategorySelector, ListingQuery, SEARCH_LIMIT};

fn by_names(main: &str, sub: Option<&str>, sub_sub: Option<&str>) -> ListingQuery {
    ListingQuery {
        category: CategorySelector::Names(CategoryNames::new(main, sub, sub_sub).unwrap()),
        ..Default::default()
    }
}

fn page(n: u32, size: u32) -> PageRequest {
    PageRequest::new(n, size).unwrap()
}

fn new_listing(subcategory_id: i32) -> NewListing {
    serde_json::from_value(json!({
        "title": "Road bike",
        "description": "Aluminium frame",
        "subcategoryId": subcategory_id,
        "price": "350.00",
        "town": "Split",
    }))
    .unwrap()
}

#[tokio::test]
async fn fifteen_matches_fill_the_first_page() {
    let h = Harness::new();
    h.seed(1, 15, SMARTPHONES).await;

    let outcome = h
        .listings
        .query_listings(by_names("electronics", None, None), page(1, 10))
        .await;

    assert!(outcome.is_ok());
    assert_eq!(outcome.data.total_count, 15);
    assert_eq!(outcome.data.listings.len(), 10);

    let second = h
        .listings
        .query_listings(by_names("electronics", None, None), page(2, 10))
        .await;
    assert_eq!(second.data.total_count, 15);
    assert_eq!(second.data.listings.len(), 5);
}

#[tokio::test]
async fn page_beyond_the_end_is_empty_but_counted() {
    let h = Harness::new();
    h.seed(1, 3, SMARTPHONES).await;

    let outcome = h
        .listings
        .query_listings(ListingQuery::default(), page(5, 10))
        .await;
    assert_eq!(outcome.data.total_count, 3);
    assert!(outcome.data.listings.is_empty());
}

#[tokio::test]
async fn deeper_category_levels_narrow_results() {
    let h = Harness::new();
    h.seed(1, 5, SMARTPHONES).await;
    h.seed(6, 3, FEATURE_PHONES).await;
    h.seed(9, 2, LAPTOPS).await;
    h.seed(11, 4, SEDANS).await;

    let count = |q: ListingQuery| {
        let listings = h.listings.clone();
        async move { listings.query_listings(q, page(1, 50)).await.data.total_count }
    };

    assert_eq!(count(by_names("Electronics", None, None)).await, 10);
    assert_eq!(count(by_names("electronics", Some("phones"), None)).await, 8);
    assert_eq!(
        count(by_names("electronics", Some("phones"), Some("smartphones"))).await,
        5
    );
    assert_eq!(count(by_names("vehicles", None, None)).await, 4);
    assert_eq!(count(ListingQuery::default()).await, 14);
}

#[tokio::test]
async fn unknown_main_category_is_an_empty_success() {
    let h = Harness::new();
    h.seed(1, 5, SMARTPHONES).await;

    let outcome = h
        .listings
        .query_listings(by_names("nonexistent-main", None, None), page(1, 10))
        .await;
    assert!(outcome.is_ok());
    assert_eq!(outcome.data.total_count, 0);
    assert!(outcome.data.listings.is_empty());
}

#[tokio::test]
async fn category_id_selector_expands_descendants() {
    let h = Harness::new();
    h.seed(1, 2, SMARTPHONES).await;
    h.seed(3, 2, LAPTOPS).await;

    let query = ListingQuery {
        category: CategorySelector::Id(integration_tests::PHONES),
        ..Default::default()
    };
    let outcome = h.listings.query_listings(query, page(1, 10)).await;
    assert_eq!(outcome.data.total_count, 2);
}

#[tokio::test]
async fn one_character_search_returns_nothing() {
    let h = Harness::new();
    h.seed(1, 5, SMARTPHONES).await;

    let query = ListingQuery {
        search: Some("L".into()),
        ..Default::default()
    };
    let outcome = h.listings.query_listings(query, page(1, 10)).await;
    assert!(outcome.is_ok());
    assert_eq!(outcome.data.total_count, 0);
}

#[tokio::test]
async fn search_matches_title_and_tags_case_insensitively() {
    let h = Harness::new();
    let mut tagged = listing(1, SMARTPHONES);
    tagged.title = "Phone".into();
    tagged.tags = vec!["Vintage".into()];
    h.store.insert_listing(tagged).await;
    let mut titled = listing(2, SMARTPHONES);
    titled.title = "VINTAGE radio".into();
    h.store.insert_listing(titled).await;
    h.store.insert_listing(listing(3, SMARTPHONES)).await;

    let query = ListingQuery {
        search: Some("vintage".into()),
        ..Default::default()
    };
    let outcome = h.listings.query_listings(query, page(1, 10)).await;
    assert_eq!(outcome.data.total_count, 2);
}

#[tokio::test]
async fn price_bounds_and_location_combine() {
    let h = Harness::new();
    h.seed(1, 10, SMARTPHONES).await;
    let mut elsewhere = listing(11, SMARTPHONES);
    elsewhere.town = Some("Split".into());
    h.store.insert_listing(elsewhere).await;

    // fixture prices are id * 10.00
    let query = ListingQuery {
        location: Some("zagreb".into()),
        min_price: Some(Decimal::new(3000, 2)),
        max_price: Some(Decimal::new(6000, 2)),
        ..Default::default()
    };
    let outcome = h.listings.query_listings(query, page(1, 10)).await;
    assert_eq!(outcome.data.total_count, 4);
    let ids: Vec<_> = outcome.data.listings.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, ["6", "5", "4", "3"]);
}

#[tokio::test]
async fn boosted_listings_come_first_by_default() {
    let h = Harness::new();
    h.seed(1, 4, SMARTPHONES).await;
    let mut boosted = listing(5, SMARTPHONES);
    boosted.id = 0;
    boosted.is_boosted = true;
    boosted.boost_expires_at = Some(Utc::now() + chrono::Duration::days(1));
    h.store.insert_listing(boosted).await;
    let mut lapsed = listing(6, SMARTPHONES);
    lapsed.is_boosted = true;
    lapsed.boost_expires_at = Some(Utc::now() - chrono::Duration::days(1));
    h.store.insert_listing(lapsed).await;

    let outcome = h
        .listings
        .query_listings(ListingQuery::default(), page(1, 10))
        .await;
    let ids: Vec<_> = outcome.data.listings.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, ["0", "6", "4", "3", "2", "1"]);

    let oldest = ListingQuery {
        sort: ListingSort::Oldest,
        ..Default::default()
    };
    let outcome = h.listings.query_listings(oldest, page(1, 1)).await;
    assert_eq!(outcome.data.listings[0].id, "1");
}

#[tokio::test]
async fn listings_without_images_get_the_placeholder() {
    let h = Harness::new();
    h.seed(1, 1, SMARTPHONES).await;

    let outcome = h
        .listings
        .query_listings(ListingQuery::default(), page(1, 10))
        .await;
    let item = &outcome.data.listings[0];
    assert_eq!(item.images, [PLACEHOLDER_IMAGE_URL]);
    assert_eq!(item.cover_image, PLACEHOLDER_IMAGE_URL);
    assert_eq!(item.price.as_deref(), Some("10.00"));
}

#[tokio::test]
async fn writes_invalidate_cached_pages() {
    let h = Harness::new();
    h.seed(1, 2, SMARTPHONES).await;
    let all = || h.listings.query_listings(ListingQuery::default(), page(1, 10));

    assert_eq!(all().await.data.total_count, 2);
    h.listings
        .create_listing(&UserId::from(SELLER), new_listing(SMARTPHONES))
        .await
        .unwrap();
    assert_eq!(all().await.data.total_count, 3);
}

#[tokio::test]
async fn create_requires_a_leaf_category() {
    let h = Harness::new();
    let owner = UserId::from(SELLER);

    let err = h
        .listings
        .create_listing(&owner, new_listing(integration_tests::PHONES))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let err = h
        .listings
        .create_listing(&owner, new_listing(999))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let created = h
        .listings
        .create_listing(&owner, new_listing(SMARTPHONES))
        .await
        .unwrap();
    assert_eq!(created.user_id, SELLER);
    assert_eq!(created.price.as_deref(), Some("350.00"));
}

#[tokio::test]
async fn detail_carries_the_canonical_path() {
    let h = Harness::new();
    h.seed(7, 1, FEATURE_PHONES).await;

    let detail = h.listings.get_listing(7).await.unwrap();
    assert_eq!(
        detail.canonical_path.as_deref(),
        Some("/electronics/phones/feature-phones/7")
    );
    assert!(matches!(
        h.listings.get_listing(8).await,
        Err(DomainError::NotFound { .. })
    ));
}

#[tokio::test]
async fn only_the_owner_may_update() {
    let h = Harness::new();
    h.seed(1, 1, SMARTPHONES).await;
    let patch = ListingPatch {
        title: Some("Renamed".into()),
        ..Default::default()
    };

    let err = h
        .listings
        .update_listing(&UserId::from(OTHER_USER), 1, patch.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));

    let updated = h
        .listings
        .update_listing(&UserId::from(SELLER), 1, patch)
        .await
        .unwrap();
    assert_eq!(updated.title, "Renamed");
}

#[tokio::test]
async fn delete_succeeds_even_when_image_cleanup_fails() {
    let h = Harness::new();
    let mut with_images = listing(1, SMARTPHONES);
    with_images.images = vec!["/uploads/a.png".into(), "/uploads/b.png".into()];
    h.store.insert_listing(with_images).await;
    h.media.fail_on("/uploads/a.png");

    let deleted = h
        .listings
        .delete_listing(&UserId::from(SELLER), 1)
        .await
        .unwrap();
    let report = deleted.cleanup.await.unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.failed, 1);
    let mut attempted = h.media.deleted();
    attempted.sort();
    assert_eq!(attempted, ["/uploads/a.png", "/uploads/b.png"]);
    assert_eq!(h.store.listing_count().await, 0);
}

#[tokio::test]
async fn delete_by_non_owner_keeps_the_listing() {
    let h = Harness::new();
    h.seed(1, 1, SMARTPHONES).await;

    let err = h
        .listings
        .delete_listing(&UserId::from(OTHER_USER), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));
    assert!(matches!(
        h.listings.delete_listing(&UserId::from(SELLER), 2).await,
        Err(DomainError::NotFound { .. })
    ));
    assert_eq!(h.store.listing_count().await, 1);
    assert!(h.media.deleted().is_empty());
}

#[tokio::test]
async fn type_ahead_search_is_capped() {
    let h = Harness::new();
    h.seed(1, 12, SMARTPHONES).await;
    let mut sold = listing(13, SMARTPHONES);
    sold.status = domains::ListingStatus::Sold;
    h.store.insert_listing(sold).await;

    let electronics = CategorySelector::Names(CategoryNames::new("electronics", None, None).unwrap());
    let results = h.listings.search_listings("listing", electronics).await;
    assert!(results.is_ok());
    assert_eq!(results.data.listings.len() as u32, SEARCH_LIMIT);
    assert!(results.data.has_more);

    let few = h
        .listings
        .search_listings("listing 1", CategorySelector::Any)
        .await;
    // "Listing 1", "Listing 10", "Listing 11", "Listing 12"; 13 is sold
    assert_eq!(few.data.listings.len(), 4);
    assert!(!few.data.has_more);

    let short = h.listings.search_listings("l", CategorySelector::Any).await;
    assert!(short.data.listings.is_empty());
}
