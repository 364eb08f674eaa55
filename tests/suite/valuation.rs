//! End-to-end valuation runs against a mock API

use tally_cache::{MemoryStorage, OfferCache};
use tally_engine::{AggregateState, Aggregator, ItemErrorPolicy, RunError, RunPhase};
use tally_providers::tally_types::VolumeId;
use tally_providers::{ApiClient, CollectionFetcher, PricingClient, SourceFailure};
use wiremock::MockServer;

use crate::common::{
    api_client, collection_body, forbid_offer_endpoint, mount_collection, mount_offer,
    mount_offer_status, recorder, start_api,
};

type TestAggregator = Aggregator<CollectionFetcher, OfferCache<PricingClient, MemoryStorage>>;

fn aggregator(api: ApiClient) -> TestAggregator {
    let offers = OfferCache::new(PricingClient::new(api.clone()), MemoryStorage::new());
    Aggregator::new(CollectionFetcher::new(api), offers)
}

/// item1 priced by BDfugue, item2 unpriced on Amazon after a BDfugue failure,
/// item3 unknown to both sources.
async fn mount_three_item_collection(server: &MockServer) {
    mount_collection(
        server,
        "kocal",
        collection_body(
            &["v1", "v2", "v3"],
            &[
                ("v1", Some("9782344001"), Some("B00001")),
                ("v2", Some("9782344002"), Some("B00002")),
                ("v3", Some("9782344003"), Some("B00003")),
            ],
        ),
        1,
    )
    .await;

    mount_offer(server, "bdfugue_offer", "9782344001", Some("5,00€"), 1).await;
    mount_offer(server, "amazon_offer", "B00001", Some("9,99€"), 0).await;

    mount_offer_status(server, "bdfugue_offer", "9782344002", 500, 1).await;
    mount_offer(server, "amazon_offer", "B00002", None, 1).await;

    mount_offer_status(server, "bdfugue_offer", "9782344003", 404, 1).await;
    mount_offer_status(server, "amazon_offer", "B00003", 404, 1).await;
}

#[tokio::test]
async fn run_aborts_on_unresolvable_item_after_emitting_prior_progress() {
    let server = start_api().await;
    mount_three_item_collection(&server).await;

    let mut aggregator = aggregator(api_client(&server));
    let mut snapshots = Vec::new();
    let err = aggregator
        .run("kocal", &mut recorder(&mut snapshots))
        .await
        .unwrap_err();

    assert_eq!(
        snapshots,
        vec![AggregateState::new(500, 1, 0), AggregateState::new(500, 2, 1)]
    );
    let RunError::Resolution(resolution) = err else {
        panic!("expected a resolution error, got {err:?}");
    };
    assert_eq!(resolution.volume_id, VolumeId::new("v3"));
    assert_eq!(resolution.failures.len(), 2);
    assert!(
        resolution
            .failures
            .iter()
            .all(|f| matches!(f, SourceFailure::Request { .. }))
    );
    assert_ne!(aggregator.phase(), RunPhase::Done);
}

#[tokio::test]
async fn skip_policy_completes_and_counts_the_failure() {
    let server = start_api().await;
    mount_three_item_collection(&server).await;

    let mut aggregator = aggregator(api_client(&server)).with_error_policy(ItemErrorPolicy::Skip);
    let mut snapshots = Vec::new();
    let state = aggregator
        .run("kocal", &mut recorder(&mut snapshots))
        .await
        .unwrap();

    assert_eq!(state, AggregateState::new(500, 3, 1).with_failed(1));
    assert_eq!(snapshots.len(), 3);
    assert_eq!(snapshots[2], state);
    assert_eq!(aggregator.phase(), RunPhase::Done);
}

#[tokio::test]
async fn dangling_reference_aborts_without_emitting_for_that_item() {
    let server = start_api().await;
    mount_collection(
        &server,
        "kocal",
        collection_body(&["v1", "ghost"], &[("v1", Some("9782344001"), None)]),
        1,
    )
    .await;
    mount_offer(&server, "bdfugue_offer", "9782344001", Some("5,00€"), 1).await;

    let mut aggregator = aggregator(api_client(&server));
    let mut snapshots = Vec::new();
    let err = aggregator
        .run("kocal", &mut recorder(&mut snapshots))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::DanglingReference {
            position: 1,
            ref volume_id,
            ..
        } if *volume_id == VolumeId::new("ghost")
    ));
    assert_eq!(snapshots, vec![AggregateState::new(500, 1, 0)]);
}

#[tokio::test]
async fn collection_fetch_failure_aborts_before_any_pricing() {
    let server = start_api().await;
    forbid_offer_endpoint(&server, "bdfugue_offer").await;
    forbid_offer_endpoint(&server, "amazon_offer").await;

    let mut aggregator = aggregator(api_client(&server));
    let mut snapshots = Vec::new();
    let err = aggregator
        .run("nobody", &mut recorder(&mut snapshots))
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::CollectionFetch(ref e) if e.username == "nobody"));
    assert!(snapshots.is_empty());
    assert_eq!(aggregator.phase(), RunPhase::Fetching);
}

#[tokio::test]
async fn volume_without_isbn_is_priced_by_amazon_alone() {
    let server = start_api().await;
    mount_collection(
        &server,
        "kocal",
        collection_body(&["v1"], &[("v1", None, Some("B0000X"))]),
        1,
    )
    .await;
    forbid_offer_endpoint(&server, "bdfugue_offer").await;
    mount_offer(&server, "amazon_offer", "B0000X", Some("12,99 €"), 1).await;

    let state = aggregator(api_client(&server))
        .run("kocal", &mut |_: AggregateState| {})
        .await
        .unwrap();

    assert_eq!(state, AggregateState::new(1299, 1, 0));
}

#[tokio::test]
async fn unpriced_primary_falls_back_to_priced_secondary() {
    let server = start_api().await;
    mount_collection(
        &server,
        "kocal",
        collection_body(
            &["v1", "v2"],
            &[
                ("v1", Some("9782344001"), Some("B00001")),
                ("v2", Some("9782344002"), None),
            ],
        ),
        1,
    )
    .await;
    mount_offer(&server, "bdfugue_offer", "9782344001", None, 1).await;
    mount_offer(&server, "amazon_offer", "B00001", Some("7,50€"), 1).await;
    mount_offer(&server, "bdfugue_offer", "9782344002", Some("1 049,90 €"), 1).await;

    let state = aggregator(api_client(&server))
        .run("kocal", &mut |_: AggregateState| {})
        .await
        .unwrap();

    assert_eq!(state, AggregateState::new(750 + 104_990, 2, 0));
}
