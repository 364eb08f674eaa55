//! Offer resolution across the pricing sources.
//!
//! Sources are tried in [`PriceSource::PRIORITY`] order. Each try produces a
//! [`SourceAttempt`]; the final [`Offer`] (or the aggregated [`ResolutionError`])
//! is derived from the ordered list of attempts:
//!
//! | Primary | Secondary | Result |
//! |---------|-----------|--------|
//! | priced | not queried | primary offer |
//! | no price | any success | secondary offer (priced or not) |
//! | no price | failure | primary offer (no price) |
//! | failure | any success | secondary offer |
//! | failure | failure | `ResolutionError` listing both failures |
//!
//! A failed request and an offer without a price are equivalent for the purpose of
//! moving on to the next source. A successful answer whose price cannot be read
//! counts as an offer without a price.

use std::fmt;
use std::future::Future;

use serde::Deserialize;
use tally_types::{Offer, Volume, VolumeId};
use thiserror::Error;

use crate::{ApiClient, RequestFailure};

/// Resolves a volume to an [`Offer`].
///
/// Implemented by [`PricingClient`] and by caching layers wrapping it.
pub trait OfferResolver {
    fn resolve_offer(
        &self,
        volume: &Volume,
    ) -> impl Future<Output = Result<Offer, ResolutionError>> + Send;
}

/// The pricing sources, in the order they are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceSource {
    /// BDfugue, looked up by ISBN. Preferred.
    BdFugue,
    /// Amazon, looked up by ASIN. Fallback when BDfugue has no listing.
    Amazon,
}

impl PriceSource {
    pub const PRIORITY: [PriceSource; 2] = [PriceSource::BdFugue, PriceSource::Amazon];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::BdFugue => "bdfugue",
            PriceSource::Amazon => "amazon",
        }
    }

    /// Name of the catalog code this source is keyed by.
    #[must_use]
    pub fn code_name(&self) -> &'static str {
        match self {
            PriceSource::BdFugue => "ISBN",
            PriceSource::Amazon => "ASIN",
        }
    }

    fn endpoint(self) -> &'static str {
        match self {
            PriceSource::BdFugue => "bdfugue_offer",
            PriceSource::Amazon => "amazon_offer",
        }
    }

    fn catalog_code(self, volume: &Volume) -> Option<&str> {
        let code = match self {
            PriceSource::BdFugue => volume.isbn.as_deref(),
            PriceSource::Amazon => volume.asin.as_deref(),
        };
        code.filter(|code| !code.trim().is_empty())
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PriceSource::BdFugue => "BDfugue",
            PriceSource::Amazon => "Amazon",
        })
    }
}

/// Offer record as returned by either offer endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawOffer {
    #[serde(default)]
    pub formatted_price: Option<String>,
}

/// Why a single source could not contribute an offer.
#[derive(Debug, Error)]
pub enum SourceFailure {
    #[error("no {} offer: volume has no {}", .0, .0.code_name())]
    MissingCode(PriceSource),
    #[error(
        "could not fetch {price_source} offer for {} {code:?}: {failure}",
        .price_source.code_name()
    )]
    Request {
        price_source: PriceSource,
        code: String,
        failure: RequestFailure,
    },
}

#[derive(Debug)]
pub enum AttemptOutcome {
    Success(Offer),
    Failure(SourceFailure),
}

/// The result of consulting one source for one volume.
#[derive(Debug)]
pub struct SourceAttempt {
    pub price_source: PriceSource,
    pub outcome: AttemptOutcome,
}

impl SourceAttempt {
    fn is_priced(&self) -> bool {
        matches!(&self.outcome, AttemptOutcome::Success(offer) if offer.has_price())
    }
}

/// Every source failed outright for one volume.
#[derive(Debug, Error)]
#[error("could not resolve an offer for volume {volume_id}, reasons:{}", list_failures(.failures))]
pub struct ResolutionError {
    pub volume_id: VolumeId,
    pub failures: Vec<SourceFailure>,
}

fn list_failures(failures: &[SourceFailure]) -> String {
    failures.iter().map(|failure| format!("\n - {failure}")).collect()
}

/// Derive the final outcome from the ordered attempts.
///
/// The latest success wins; a later source is only ever consulted when the earlier
/// ones produced nothing priced, so the latest success is also the best one.
pub fn settle_attempts(
    volume_id: &VolumeId,
    attempts: Vec<SourceAttempt>,
) -> Result<Offer, ResolutionError> {
    let mut chosen = None;
    let mut failures = Vec::new();

    for attempt in attempts {
        match attempt.outcome {
            AttemptOutcome::Success(offer) => chosen = Some(offer),
            AttemptOutcome::Failure(failure) => failures.push(failure),
        }
    }

    chosen.ok_or_else(|| ResolutionError {
        volume_id: volume_id.clone(),
        failures,
    })
}

/// Stateless client querying the pricing sources in priority order.
#[derive(Debug, Clone)]
pub struct PricingClient {
    api: ApiClient,
}

impl PricingClient {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Consult sources in priority order until one yields a priced offer.
    pub async fn attempt_sources(&self, volume: &Volume) -> Vec<SourceAttempt> {
        let mut attempts = Vec::with_capacity(PriceSource::PRIORITY.len());

        for price_source in PriceSource::PRIORITY {
            let outcome = match self.query(price_source, volume).await {
                Ok(offer) => AttemptOutcome::Success(offer),
                Err(failure) => {
                    tracing::warn!(
                        volume_id = %volume.id,
                        source = price_source.as_str(),
                        "{failure}"
                    );
                    AttemptOutcome::Failure(failure)
                }
            };

            let attempt = SourceAttempt {
                price_source,
                outcome,
            };
            let priced = attempt.is_priced();
            attempts.push(attempt);
            if priced {
                break;
            }
        }

        attempts
    }

    async fn query(
        &self,
        price_source: PriceSource,
        volume: &Volume,
    ) -> Result<Offer, SourceFailure> {
        let Some(code) = price_source.catalog_code(volume) else {
            return Err(SourceFailure::MissingCode(price_source));
        };

        let raw: RawOffer = self
            .api
            .get_json(&["v1", price_source.endpoint(), code])
            .await
            .map_err(|failure| SourceFailure::Request {
                price_source,
                code: code.to_string(),
                failure,
            })?;

        let offer = Offer::from_formatted_price(raw.formatted_price.as_deref()).unwrap_or_else(|e| {
            tracing::warn!(
                volume_id = %volume.id,
                source = price_source.as_str(),
                code,
                "Unreadable offer price, treating as no price: {e}"
            );
            Offer::unpriced()
        });

        tracing::debug!(
            volume_id = %volume.id,
            source = price_source.as_str(),
            has_price = offer.has_price(),
            price = offer.price(),
            "Offer received"
        );
        Ok(offer)
    }
}

impl OfferResolver for PricingClient {
    async fn resolve_offer(&self, volume: &Volume) -> Result<Offer, ResolutionError> {
        let attempts = self.attempt_sources(volume).await;
        settle_attempts(&volume.id, attempts)
    }
}
