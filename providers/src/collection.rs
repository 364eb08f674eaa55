//! Retrieval of a user's collection.

use std::future::Future;

use tally_types::Collection;
use thiserror::Error;

use crate::{ApiClient, RequestFailure};

/// Supplies the collection a run iterates over.
pub trait CollectionSource {
    fn fetch_collection(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Collection, CollectionFetchError>> + Send;
}

#[derive(Debug, Error)]
#[error("could not fetch the collection of user {username:?}: {failure}")]
pub struct CollectionFetchError {
    pub username: String,
    pub failure: RequestFailure,
}

/// Fetches `v2/user/{username}/collection` once. No fallback, no cache.
#[derive(Debug, Clone)]
pub struct CollectionFetcher {
    api: ApiClient,
}

impl CollectionFetcher {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

impl CollectionSource for CollectionFetcher {
    async fn fetch_collection(&self, username: &str) -> Result<Collection, CollectionFetchError> {
        let collection: Collection = self
            .api
            .get_json(&["v2", "user", username, "collection"])
            .await
            .map_err(|failure| CollectionFetchError {
                username: username.to_string(),
                failure,
            })?;

        tracing::info!(
            username,
            possessions = collection.possessions.len(),
            volumes = collection.volumes.len(),
            "Collection fetched"
        );
        Ok(collection)
    }
}
