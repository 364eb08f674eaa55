//! Core domain types for tally.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies:
//! the credential handed out by the token provider, the collection model returned by the
//! collection endpoint, and the normalized [`Offer`] every pricing source is reduced to.

mod ids;
mod price;

pub use ids::VolumeId;
pub use price::{PriceParseError, format_euros, parse_formatted_price};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// Credential Types
// ============================================================================

/// Bearer token attached to every outbound request.
///
/// Note: `Debug` is manually implemented to redact the token, preventing accidental
/// credential disclosure in logs or error messages.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

#[derive(Debug, Error)]
#[error("access token must not be empty")]
pub struct EmptyTokenError;

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyTokenError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyTokenError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken(<redacted>)")
    }
}

/// Serialized token object as found in the credential store.
#[derive(Deserialize)]
struct TokenRecord {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum CredentialParseError {
    #[error("credential is not a valid token object: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    EmptyToken(#[from] EmptyTokenError),
}

/// An acquired credential. Read-only once created; never expires within a run.
#[derive(Debug, Clone)]
pub struct Credential {
    access_token: AccessToken,
    token_type: Option<String>,
    acquired_at: DateTime<Utc>,
}

impl Credential {
    #[must_use]
    pub fn new(access_token: AccessToken) -> Self {
        Self {
            access_token,
            token_type: None,
            acquired_at: Utc::now(),
        }
    }

    /// Parse the serialized token object kept in a credential store.
    ///
    /// Only `access_token` is required; unknown fields are ignored.
    pub fn from_json(raw: &str) -> Result<Self, CredentialParseError> {
        let record: TokenRecord = serde_json::from_str(raw)?;
        Ok(Self {
            access_token: AccessToken::new(record.access_token)?,
            token_type: record.token_type,
            acquired_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    #[must_use]
    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    #[must_use]
    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }
}

// ============================================================================
// Collection Types
// ============================================================================

/// A catalog volume: the unit that actually gets priced.
///
/// Each pricing source looks a volume up by its own catalog code, so both are
/// optional; a volume missing a code simply cannot be priced by that source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: VolumeId,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub asin: Option<String>,
}

impl Volume {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: VolumeId::new(id),
            isbn: None,
            asin: None,
        }
    }

    #[must_use]
    pub fn with_isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = Some(isbn.into());
        self
    }

    #[must_use]
    pub fn with_asin(mut self, asin: impl Into<String>) -> Self {
        self.asin = Some(asin.into());
        self
    }
}

/// Entry of a user's collection pointing at a [`Volume`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Possession {
    #[serde(default)]
    pub id: Option<String>,
    pub volume_id: VolumeId,
}

impl Possession {
    #[must_use]
    pub fn of(volume_id: impl Into<String>) -> Self {
        Self {
            id: None,
            volume_id: VolumeId::new(volume_id),
        }
    }
}

/// A user's collection as returned by the collection endpoint.
///
/// `possessions` keeps server order; it is the order items are priced in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub possessions: Vec<Possession>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

impl Collection {
    /// Index volumes by id. When the server repeats an id, the first one wins.
    #[must_use]
    pub fn volume_index(&self) -> HashMap<&VolumeId, &Volume> {
        let mut index = HashMap::with_capacity(self.volumes.len());
        for volume in &self.volumes {
            index.entry(&volume.id).or_insert(volume);
        }
        index
    }
}

// ============================================================================
// Offer
// ============================================================================

/// Normalized pricing result for one volume.
///
/// A volume without a price still resolves successfully; it reports a zero
/// price that callers must not mistake for a real observation. The invalid
/// state "no price but non-zero amount" is unrepresentable, including when an
/// offer is read back from a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OfferRecord", into = "OfferRecord")]
pub struct Offer {
    price: Option<u64>,
}

#[derive(Serialize, Deserialize)]
struct OfferRecord {
    has_price: bool,
    price: u64,
}

#[derive(Debug, Error)]
#[error("offer without a price must carry a zero amount, got {0}")]
pub struct InconsistentOfferError(u64);

impl TryFrom<OfferRecord> for Offer {
    type Error = InconsistentOfferError;

    fn try_from(record: OfferRecord) -> Result<Self, Self::Error> {
        match (record.has_price, record.price) {
            (true, price) => Ok(Self::priced(price)),
            (false, 0) => Ok(Self::unpriced()),
            (false, price) => Err(InconsistentOfferError(price)),
        }
    }
}

impl From<Offer> for OfferRecord {
    fn from(offer: Offer) -> Self {
        Self {
            has_price: offer.has_price(),
            price: offer.price(),
        }
    }
}

impl Offer {
    #[must_use]
    pub const fn priced(minor_units: u64) -> Self {
        Self {
            price: Some(minor_units),
        }
    }

    #[must_use]
    pub const fn unpriced() -> Self {
        Self { price: None }
    }

    /// Normalize a source's `formatted_price` field.
    pub fn from_formatted_price(formatted: Option<&str>) -> Result<Self, PriceParseError> {
        match formatted {
            Some(formatted) => parse_formatted_price(formatted).map(Self::priced),
            None => Ok(Self::unpriced()),
        }
    }

    #[must_use]
    pub const fn has_price(&self) -> bool {
        self.price.is_some()
    }

    /// Price in minor currency units; zero when [`has_price`](Self::has_price) is false.
    #[must_use]
    pub const fn price(&self) -> u64 {
        match self.price {
            Some(price) => price,
            None => 0,
        }
    }
}
