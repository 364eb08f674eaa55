//! Offer caching across and within runs

use tally_cache::{CacheStorage, FileStorage, OfferCache, cache_key};
use tally_engine::{AggregateState, Aggregator, ItemErrorPolicy};
use tally_providers::tally_types::VolumeId;
use tally_providers::{CollectionFetcher, PricingClient};

use crate::common::{
    api_client, collection_body, mount_collection, mount_offer, mount_offer_status, start_api,
};

#[tokio::test]
async fn second_run_is_served_from_the_persistent_cache() {
    let server = start_api().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("offers.json");

    mount_collection(
        &server,
        "kocal",
        collection_body(
            &["v1", "v2"],
            &[
                ("v1", Some("9782344001"), None),
                ("v2", Some("9782344002"), Some("B00002")),
            ],
        ),
        2,
    )
    .await;
    mount_offer(&server, "bdfugue_offer", "9782344001", Some("6,95€"), 1).await;
    mount_offer(&server, "bdfugue_offer", "9782344002", None, 1).await;
    mount_offer(&server, "amazon_offer", "B00002", None, 1).await;

    let mut totals = Vec::new();
    for _ in 0..2 {
        let api = api_client(&server);
        let offers = OfferCache::new(
            PricingClient::new(api.clone()),
            FileStorage::open(&cache_path).unwrap(),
        );
        let state = Aggregator::new(CollectionFetcher::new(api), offers)
            .run("kocal", &mut |_: AggregateState| {})
            .await
            .unwrap();
        totals.push(state);
    }

    assert_eq!(totals[0], AggregateState::new(695, 2, 1));
    assert_eq!(totals[1], totals[0]);

    let storage = FileStorage::open(&cache_path).unwrap();
    assert_eq!(
        storage.get(&cache_key(&VolumeId::new("v2"))).unwrap().as_deref(),
        Some(r#"{"has_price":false,"price":0}"#)
    );
}

#[tokio::test]
async fn repeated_possessions_hit_the_network_once() {
    let server = start_api().await;
    let dir = tempfile::tempdir().unwrap();

    mount_collection(
        &server,
        "kocal",
        collection_body(&["v1", "v1", "v1"], &[("v1", Some("9782344001"), None)]),
        1,
    )
    .await;
    mount_offer(&server, "bdfugue_offer", "9782344001", Some("5,00€"), 1).await;

    let api = api_client(&server);
    let offers = OfferCache::new(
        PricingClient::new(api.clone()),
        FileStorage::open(dir.path().join("offers.json")).unwrap(),
    );
    let state = Aggregator::new(CollectionFetcher::new(api), offers)
        .run("kocal", &mut |_: AggregateState| {})
        .await
        .unwrap();

    assert_eq!(state, AggregateState::new(1500, 3, 0));
}

#[tokio::test]
async fn failed_resolutions_are_retried_on_the_next_run() {
    let server = start_api().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("offers.json");

    mount_collection(
        &server,
        "kocal",
        collection_body(&["v1"], &[("v1", Some("9782344001"), Some("B00001"))]),
        2,
    )
    .await;
    mount_offer_status(&server, "bdfugue_offer", "9782344001", 503, 2).await;
    mount_offer_status(&server, "amazon_offer", "B00001", 503, 2).await;

    for _ in 0..2 {
        let api = api_client(&server);
        let offers = OfferCache::new(
            PricingClient::new(api.clone()),
            FileStorage::open(&cache_path).unwrap(),
        );
        let state = Aggregator::new(CollectionFetcher::new(api), offers)
            .with_error_policy(ItemErrorPolicy::Skip)
            .run("kocal", &mut |_: AggregateState| {})
            .await
            .unwrap();
        assert_eq!(state, AggregateState::new(0, 1, 0).with_failed(1));
    }

    assert!(!cache_path.exists());
}
