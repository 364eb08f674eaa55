//! Permanent per-volume offer cache.
//!
//! [`OfferCache`] wraps any [`OfferResolver`] and stores each successful
//! resolution under `volume:{id}:offer`. Once an offer is stored for a volume,
//! every later lookup returns it without touching the network, for as long as
//! the underlying [`CacheStorage`] keeps it.
//!
//! Failures are never cached: a [`ResolutionError`] propagates and nothing is
//! written. Storage problems are not fatal either way: an unreadable entry is a
//! miss, and a failed write still returns the freshly resolved offer.

mod storage;

pub use storage::{CacheStorage, FileStorage, MemoryStorage, StorageError};

use tally_providers::{OfferResolver, ResolutionError};
use tally_types::{Offer, Volume, VolumeId};

/// Storage key for a volume's offer.
#[must_use]
pub fn cache_key(volume_id: &VolumeId) -> String {
    format!("volume:{volume_id}:offer")
}

#[derive(Debug)]
pub struct OfferCache<R, S> {
    resolver: R,
    storage: S,
}

impl<R, S> OfferCache<R, S>
where
    R: OfferResolver,
    S: CacheStorage,
{
    #[must_use]
    pub fn new(resolver: R, storage: S) -> Self {
        Self { resolver, storage }
    }

    #[must_use]
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The cached offer for `volume_id`, if a readable one exists.
    pub fn cached(&self, volume_id: &VolumeId) -> Option<Offer> {
        let key = cache_key(volume_id);
        let raw = match self.storage.get(&key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(%key, "Offer cache read failed, treating as miss: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(offer) => Some(offer),
            Err(e) => {
                tracing::warn!(%key, "Unreadable cached offer, treating as miss: {e}");
                None
            }
        }
    }

    fn remember(&self, volume_id: &VolumeId, offer: Offer) {
        let key = cache_key(volume_id);
        let raw = match serde_json::to_string(&offer) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(%key, "Failed to serialize offer: {e}");
                return;
            }
        };

        if let Err(e) = self.storage.set(&key, &raw) {
            tracing::warn!(%key, "Failed to persist offer: {e}");
        }
    }
}

impl<R, S> OfferResolver for OfferCache<R, S>
where
    R: OfferResolver + Sync,
    S: CacheStorage,
{
    async fn resolve_offer(&self, volume: &Volume) -> Result<Offer, ResolutionError> {
        if let Some(offer) = self.cached(&volume.id) {
            tracing::debug!(volume_id = %volume.id, "Offer cache hit");
            return Ok(offer);
        }

        let offer = self.resolver.resolve_offer(volume).await?;
        self.remember(&volume.id, offer);
        Ok(offer)
    }
}
