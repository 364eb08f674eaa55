//! Waiting for a credential before the first request

use std::time::Duration;

use tally_cache::{MemoryStorage, OfferCache};
use tally_engine::{AggregateState, Aggregator};
use tally_providers::{CollectionFetcher, FileCredentialStore, PricingClient, TokenProvider};

use crate::common::{TOKEN, api_client_with, collection_body, mount_collection, start_api};

#[tokio::test]
async fn run_starts_once_the_token_file_appears() {
    let server = start_api().await;
    mount_collection(&server, "kocal", collection_body(&[], &[]), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("token.json");
    let provider = TokenProvider::new(FileCredentialStore::new(&token_path))
        .with_poll_interval(Duration::from_millis(10));

    let writer_path = token_path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let body = format!(r#"{{"access_token":"{TOKEN}","token_type":"Bearer"}}"#);
        std::fs::write(writer_path, body).unwrap();
    });

    let credential = provider
        .acquire_within(Duration::from_secs(10))
        .await
        .expect("token file is written");

    let api = api_client_with(&server, credential);
    let offers = OfferCache::new(PricingClient::new(api.clone()), MemoryStorage::new());
    let state = Aggregator::new(CollectionFetcher::new(api), offers)
        .run("kocal", &mut |_: AggregateState| {})
        .await
        .unwrap();

    assert_eq!(state, AggregateState::default());
}

#[tokio::test]
async fn waiting_gives_up_at_the_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let provider = TokenProvider::new(FileCredentialStore::new(dir.path().join("absent.json")))
        .with_poll_interval(Duration::from_millis(5));

    let err = provider
        .acquire_within(Duration::from_millis(40))
        .await
        .unwrap_err();

    assert_eq!(err.waited, Duration::from_millis(40));
    assert!(err.to_string().contains("no credential"));
}
