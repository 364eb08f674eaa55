//! Shared test utilities and fixtures
//!
//! A wiremock server standing in for the collection and offer endpoints.

#![allow(dead_code)]

use serde_json::{Value, json};
use tally_engine::AggregateState;
use tally_providers::tally_types::{AccessToken, Credential};
use tally_providers::{ApiClient, HttpSettings, build_http_client};
use url::Url;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "integration-token";

pub async fn start_api() -> MockServer {
    MockServer::start().await
}

/// Client for the mock server. Plain HTTP is allowed here only.
pub fn api_client(server: &MockServer) -> ApiClient {
    let credential = Credential::new(AccessToken::new(TOKEN).expect("token"));
    api_client_with(server, credential)
}

pub fn api_client_with(server: &MockServer, credential: Credential) -> ApiClient {
    let http = build_http_client(&HttpSettings {
        https_only: false,
        ..HttpSettings::default()
    })
    .expect("client builds");
    ApiClient::new(http, Url::parse(&server.uri()).expect("server uri"), credential)
}

/// Collection body in the shape of `v2/user/{username}/collection`.
///
/// Each volume is `(id, isbn, asin)`; possessions reference volume ids in order.
pub fn collection_body(
    possessions: &[&str],
    volumes: &[(&str, Option<&str>, Option<&str>)],
) -> Value {
    json!({
        "possessions": possessions
            .iter()
            .enumerate()
            .map(|(i, volume_id)| json!({"id": format!("p{i}"), "volume_id": volume_id}))
            .collect::<Vec<_>>(),
        "volumes": volumes
            .iter()
            .map(|(id, isbn, asin)| json!({"id": id, "isbn": isbn, "asin": asin, "number": 1}))
            .collect::<Vec<_>>(),
        "editions": [],
        "series": []
    })
}

pub async fn mount_collection(server: &MockServer, username: &str, body: Value, calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/user/{username}/collection")))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(calls)
        .mount(server)
        .await;
}

/// Mount an offer endpoint answering `formatted_price`, expecting exactly `calls` hits.
pub async fn mount_offer(
    server: &MockServer,
    endpoint: &str,
    code: &str,
    formatted_price: Option<&str>,
    calls: u64,
) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/{endpoint}/{code}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "formatted_price": formatted_price,
                "url": "https://shop.example/item"
            })),
        )
        .expect(calls)
        .mount(server)
        .await;
}

pub async fn mount_offer_status(
    server: &MockServer,
    endpoint: &str,
    code: &str,
    status: u16,
    calls: u64,
) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/{endpoint}/{code}")))
        .respond_with(ResponseTemplate::new(status))
        .expect(calls)
        .mount(server)
        .await;
}

/// Any request to an offer endpoint of `endpoint` fails the test on drop.
pub async fn forbid_offer_endpoint(server: &MockServer, endpoint: &str) {
    Mock::given(method("GET"))
        .and(path_regex(format!("^/v1/{endpoint}/")))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}

/// Collects every emitted snapshot.
pub fn recorder(snapshots: &mut Vec<AggregateState>) -> impl FnMut(AggregateState) + '_ {
    move |snapshot| snapshots.push(snapshot)
}
