//! Outcome aggregation for display.
//!
//! Pure partitioning of per-provider outcomes into the four disjoint buckets
//! the renderer cares about: fresh success, cached, gated, and failure.

use std::collections::HashMap;

use super::strategy::FetchOutcome;

/// Disjoint partition of outcomes by provider id, each bucket sorted.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Aggregation {
    /// Fresh snapshot from a live fetch.
    pub success: Vec<String>,
    /// Stale snapshot served from the cache.
    pub cached: Vec<String>,
    /// Short-circuited by the failure gate, no snapshot.
    pub gated: Vec<String>,
    /// No snapshot at all.
    pub failure: Vec<String>,
}

impl Aggregation {
    /// Whether anything produced a snapshot, live or cached.
    #[must_use]
    pub fn has_any_data(&self) -> bool {
        !self.success.is_empty() || !self.cached.is_empty()
    }

    /// Whether every provider came back empty-handed.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        !self.has_any_data() && (!self.gated.is_empty() || !self.failure.is_empty())
    }

    /// Providers that produced a snapshot, live or cached.
    #[must_use]
    pub fn successful_providers(&self) -> Vec<String> {
        let mut out = [self.success.clone(), self.cached.clone()].concat();
        out.sort();
        out
    }

    /// Providers without a snapshot, gated included.
    #[must_use]
    pub fn failed_providers(&self) -> Vec<String> {
        let mut out = [self.gated.clone(), self.failure.clone()].concat();
        out.sort();
        out
    }
}

/// Partition outcomes into the four display buckets.
///
/// A gated outcome that still served a cached snapshot lands in `cached`;
/// `gated` holds only the short-circuits that had nothing to show.
#[must_use]
pub fn aggregate_outcomes(outcomes: &HashMap<String, FetchOutcome>) -> Aggregation {
    let mut aggregation = Aggregation::default();
    for (provider_id, outcome) in outcomes {
        let bucket = if outcome.success && outcome.cached {
            &mut aggregation.cached
        } else if outcome.success {
            &mut aggregation.success
        } else if outcome.gated {
            &mut aggregation.gated
        } else {
            &mut aggregation.failure
        };
        bucket.push(provider_id.clone());
    }
    aggregation.success.sort();
    aggregation.cached.sort();
    aggregation.gated.sort();
    aggregation.failure.sort();
    aggregation
}
