//! HTTP clients for the tally price-resolution pipeline.
//!
//! # Architecture
//!
//! - [`ApiClient`] - Shared request plumbing: endpoint resolution against the API base
//!   URL, bearer authorization, status checking and JSON decoding
//! - [`pricing`] - [`PricingClient`]: ordered lookup across pricing sources with fallback
//! - [`collection`] - [`CollectionFetcher`]: one-shot retrieval of a user's collection
//! - [`token`] - [`TokenProvider`]: waits for a credential to appear in a [`CredentialStore`]
//!
//! # Error Handling
//!
//! A single failed request is a [`RequestFailure`]. Pricing absorbs those into its
//! fallback policy and only surfaces [`ResolutionError`] once every source has been
//! exhausted. Requests are never retried here.

pub mod collection;
pub mod pricing;
pub mod token;

pub use collection::{CollectionFetchError, CollectionFetcher, CollectionSource};
pub use pricing::{
    AttemptOutcome, OfferResolver, PriceSource, PricingClient, RawOffer, ResolutionError,
    SourceAttempt, SourceFailure,
};
pub use token::{
    CredentialStore, CredentialTimeout, FileCredentialStore, MemoryCredentialStore, TokenProvider,
};

pub use tally_types;

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tally_types::Credential;
use thiserror::Error;
use url::Url;

/// Canonical API base URL serving the collection and both offer endpoints.
pub const DEFAULT_API_BASE_URL: &str = "https://api.mangacollec.com";

const DEFAULT_USER_AGENT: &str = concat!("tally/", env!("CARGO_PKG_VERSION"));

// Note: reqwest only exposes tcp_keepalive (idle time); interval/retries use platform defaults.
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;
const MAX_REDIRECTS: usize = 5;

/// Transport settings for the shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Whole-request ceiling. `None` lets a hung request stall the run.
    pub timeout: Option<Duration>,
    /// Refuse plain-HTTP endpoints. Only tests against a local mock turn this off.
    pub https_only: bool,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            https_only: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

pub fn build_http_client(settings: &HttpSettings) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .https_only(settings.https_only)
        .user_agent(settings.user_agent.clone())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)));

    if let Some(timeout) = settings.timeout {
        builder = builder.timeout(timeout);
    }

    builder.build()
}

/// One failed request against a single endpoint.
#[derive(Debug, Error)]
pub enum RequestFailure {
    #[error("cannot derive an endpoint from base URL {0}")]
    InvalidBaseUrl(Url),
    #[error("request to {url} failed: {error}")]
    Transport { url: Url, error: reqwest::Error },
    #[error("{url} answered HTTP {status}")]
    Status { url: Url, status: StatusCode },
    #[error("{url} answered with an unreadable body: {error}")]
    Body { url: Url, error: reqwest::Error },
}

/// Authenticated access to the API.
///
/// Cheap to clone: the underlying `reqwest::Client` is reference counted, so the
/// pricing client and the collection fetcher share one connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    credential: Credential,
}

impl ApiClient {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: Url, credential: Credential) -> Self {
        Self {
            http,
            base_url,
            credential,
        }
    }

    /// Append percent-encoded path segments to the base URL.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, RequestFailure> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RequestFailure::InvalidBaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `GET` an endpoint with the bearer credential and decode its JSON body.
    ///
    /// Any non-2xx status is a failure; nothing is retried.
    pub(crate) async fn get_json<T>(&self, segments: &[&str]) -> Result<T, RequestFailure>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        tracing::debug!(%url, "GET");

        let response = self
            .http
            .get(url.clone())
            .bearer_auth(self.credential.access_token().as_str())
            .send()
            .await
            .map_err(|error| RequestFailure::Transport {
                url: url.clone(),
                error,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RequestFailure::Status { url, status });
        }

        response
            .json::<T>()
            .await
            .map_err(|error| RequestFailure::Body { url, error })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{ApiClient, HttpSettings, build_http_client};
    use tally_types::{AccessToken, Credential};
    use url::Url;

    pub const TEST_TOKEN: &str = "test-token";

    pub fn api_client(base_url: &str) -> ApiClient {
        let settings = HttpSettings {
            https_only: false,
            ..HttpSettings::default()
        };
        let http = build_http_client(&settings).expect("client builds");
        let credential = Credential::new(AccessToken::new(TEST_TOKEN).expect("token"));
        ApiClient::new(http, Url::parse(base_url).expect("base url"), credential)
    }
}
