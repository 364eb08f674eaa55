//! Run state: the running aggregate and the phase of the run.

use serde::Serialize;
use tally_types::Offer;

/// Running totals of a valuation run. Doubles as the progress snapshot.
///
/// Only the aggregator mutates it, once per possession, in collection order, so
/// `total_price_minor_units` and `items_processed` never decrease across snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AggregateState {
    total_price_minor_units: u64,
    items_processed: usize,
    items_without_price: usize,
    items_failed: usize,
}

impl AggregateState {
    #[must_use]
    pub const fn new(
        total_price_minor_units: u64,
        items_processed: usize,
        items_without_price: usize,
    ) -> Self {
        Self {
            total_price_minor_units,
            items_processed,
            items_without_price,
            items_failed: 0,
        }
    }

    #[must_use]
    pub const fn with_failed(mut self, items_failed: usize) -> Self {
        self.items_failed = items_failed;
        self
    }

    #[must_use]
    pub const fn total_price_minor_units(&self) -> u64 {
        self.total_price_minor_units
    }

    #[must_use]
    pub const fn items_processed(&self) -> usize {
        self.items_processed
    }

    /// Items that resolved without a price. They contributed zero to the total.
    #[must_use]
    pub const fn items_without_price(&self) -> usize {
        self.items_without_price
    }

    /// Items whose resolution failed and was skipped. Always zero under the abort policy.
    #[must_use]
    pub const fn items_failed(&self) -> usize {
        self.items_failed
    }

    pub(crate) fn record_offer(&mut self, offer: Offer) {
        self.total_price_minor_units = self.total_price_minor_units.saturating_add(offer.price());
        self.items_processed += 1;
        if !offer.has_price() {
            self.items_without_price += 1;
        }
    }

    pub(crate) fn record_failure(&mut self) {
        self.items_processed += 1;
        self.items_failed += 1;
    }
}

/// `Idle -> Fetching -> Processing(i) -> Done`.
///
/// A run that fails stays in the phase it failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Fetching,
    Processing { index: usize, total: usize },
    Done,
}
