//! Collection valuation run loop.
//!
//! # Architecture
//!
//! [`Aggregator`] drives one run:
//!
//! ```text
//! Idle -> Fetching -> Processing(0) -> ... -> Processing(n-1) -> Done
//!           |              |
//!     CollectionSource  OfferResolver (usually OfferCache<PricingClient, _>)
//!                          |
//!                    ProgressSink (after every possession)
//! ```
//!
//! Possessions are processed one at a time, strictly in the order the collection
//! endpoint returned them. No two requests are ever in flight at once.
//!
//! # Error Handling
//!
//! A failed collection fetch and a possession referencing an unknown volume
//! always abort the run. A volume that cannot be priced by any source aborts
//! the run under [`ItemErrorPolicy::Abort`] and is counted and skipped under
//! [`ItemErrorPolicy::Skip`]. Snapshots already emitted stay valid either way.

mod progress;
mod state;

pub use progress::{ChannelSink, ProgressSink};
pub use state::{AggregateState, RunPhase};

use serde::Deserialize;
use tally_providers::{CollectionFetchError, CollectionSource, OfferResolver, ResolutionError};
use tally_types::VolumeId;
use thiserror::Error;

/// What to do when a single volume cannot be priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemErrorPolicy {
    /// Stop the run at the first unresolvable volume.
    #[default]
    Abort,
    /// Count the volume as failed, contribute nothing, and continue.
    Skip,
}

impl ItemErrorPolicy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemErrorPolicy::Abort => "abort",
            ItemErrorPolicy::Skip => "skip",
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    CollectionFetch(#[from] CollectionFetchError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(
        "possession #{position}{} references volume {volume_id}, which the collection does not contain",
        .possession_id.as_deref().map(|id| format!(" ({id})")).unwrap_or_default()
    )]
    DanglingReference {
        position: usize,
        possession_id: Option<String>,
        volume_id: VolumeId,
    },
}

/// Owns the aggregate for one user's collection and drives it to completion.
#[derive(Debug)]
pub struct Aggregator<C, R> {
    collections: C,
    offers: R,
    policy: ItemErrorPolicy,
    state: AggregateState,
    phase: RunPhase,
}

impl<C, R> Aggregator<C, R>
where
    C: CollectionSource,
    R: OfferResolver,
{
    #[must_use]
    pub fn new(collections: C, offers: R) -> Self {
        Self {
            collections,
            offers,
            policy: ItemErrorPolicy::default(),
            state: AggregateState::default(),
            phase: RunPhase::Idle,
        }
    }

    #[must_use]
    pub fn with_error_policy(mut self, policy: ItemErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn state(&self) -> AggregateState {
        self.state
    }

    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    #[must_use]
    pub fn offers(&self) -> &R {
        &self.offers
    }

    /// Value `username`'s collection, pushing a snapshot to `sink` after each possession.
    ///
    /// Returns the final aggregate once every possession has been processed.
    pub async fn run<P>(&mut self, username: &str, sink: &mut P) -> Result<AggregateState, RunError>
    where
        P: ProgressSink + ?Sized,
    {
        self.state = AggregateState::default();
        self.enter(RunPhase::Fetching);

        let collection = self.collections.fetch_collection(username).await?;
        let volumes = collection.volume_index();
        let total = collection.possessions.len();
        tracing::info!(
            username,
            possessions = total,
            policy = self.policy.as_str(),
            "Valuing collection"
        );

        for (position, possession) in collection.possessions.iter().enumerate() {
            self.enter(RunPhase::Processing {
                index: position,
                total,
            });

            let Some(volume) = volumes.get(&possession.volume_id) else {
                return Err(RunError::DanglingReference {
                    position,
                    possession_id: possession.id.clone(),
                    volume_id: possession.volume_id.clone(),
                });
            };

            match self.offers.resolve_offer(volume).await {
                Ok(offer) => self.state.record_offer(offer),
                Err(error) => match self.policy {
                    ItemErrorPolicy::Abort => return Err(error.into()),
                    ItemErrorPolicy::Skip => {
                        tracing::warn!(volume_id = %volume.id, "Skipping volume: {error}");
                        self.state.record_failure();
                    }
                },
            }

            sink.on_progress(self.state);
        }

        self.enter(RunPhase::Done);
        tracing::info!(
            username,
            total_minor_units = self.state.total_price_minor_units(),
            processed = self.state.items_processed(),
            without_price = self.state.items_without_price(),
            failed = self.state.items_failed(),
            "Collection valued"
        );
        Ok(self.state)
    }

    fn enter(&mut self, phase: RunPhase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "Run phase");
        self.phase = phase;
    }
}
