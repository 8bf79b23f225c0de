//! Per-provider failure gate.
//!
//! A sliding-window circuit breaker: after [`MAX_CONSECUTIVE_FAILURES`]
//! consecutive failures the gate closes for [`GATE_DURATION`], and the
//! pipeline short-circuits live fetches for that provider until it reopens.
//! Failure records older than [`WINDOW`] age out.
//!
//! Gate state is persisted through the cache store after every mutation, so
//! a misbehaving provider stays suppressed across CLI invocations.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCategory;
use crate::storage::CacheStore;

/// How long failure records are retained.
pub const WINDOW: Duration = Duration::from_secs(10 * 60);

/// How long a closed gate suppresses fetching.
pub const GATE_DURATION: Duration = Duration::from_secs(5 * 60);

/// Consecutive failures that close the gate.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Default tail length for [`FailureGate::recent_failures`].
const RECENT_LIMIT: usize = 5;

fn window_chrono() -> chrono::Duration {
    chrono::Duration::seconds(WINDOW.as_secs() as i64)
}

fn gate_duration_chrono() -> chrono::Duration {
    chrono::Duration::seconds(GATE_DURATION.as_secs() as i64)
}

// =============================================================================
// Records and State
// =============================================================================

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub timestamp: DateTime<Utc>,
    pub category: ErrorCategory,
    pub message: String,
}

/// Persisted gate state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateState {
    #[serde(default)]
    pub failures: Vec<FailureRecord>,
    #[serde(default)]
    pub gated_until: Option<DateTime<Utc>>,
}

// =============================================================================
// Failure Gate
// =============================================================================

/// Failure gate for one provider.
#[derive(Debug, Clone)]
pub struct FailureGate {
    pub provider_id: String,
    pub failures: Vec<FailureRecord>,
    pub consecutive_count: u32,
    pub gated_until: Option<DateTime<Utc>>,
}

impl FailureGate {
    /// Fresh, open gate.
    #[must_use]
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            failures: Vec::new(),
            consecutive_count: 0,
            gated_until: None,
        }
    }

    /// Rebuild a gate from persisted state.
    ///
    /// The consecutive counter is reconstructed as the number of records
    /// still inside the window.
    #[must_use]
    pub fn from_state(provider_id: impl Into<String>, state: GateState) -> Self {
        let cutoff = Utc::now() - window_chrono();
        let failures: Vec<FailureRecord> = state
            .failures
            .into_iter()
            .filter(|r| r.timestamp > cutoff)
            .collect();
        Self {
            provider_id: provider_id.into(),
            consecutive_count: failures.len() as u32,
            failures,
            gated_until: state.gated_until,
        }
    }

    /// Snapshot the persistable state.
    #[must_use]
    pub fn to_state(&self) -> GateState {
        GateState {
            failures: self.failures.clone(),
            gated_until: self.gated_until,
        }
    }

    /// Record a failure; closes the gate when the consecutive threshold is
    /// reached.
    pub fn record_failure(&mut self, category: ErrorCategory, message: impl Into<String>) {
        let now = Utc::now();
        let cutoff = now - window_chrono();
        self.failures.retain(|r| r.timestamp > cutoff);
        self.failures.push(FailureRecord {
            timestamp: now,
            category,
            message: message.into(),
        });
        self.consecutive_count += 1;

        if self.consecutive_count >= MAX_CONSECUTIVE_FAILURES {
            self.gated_until = Some(now + gate_duration_chrono());
            tracing::warn!(
                provider = %self.provider_id,
                consecutive = self.consecutive_count,
                "failure gate closed"
            );
        }
    }

    /// Record a success. Resets the consecutive counter; old records still
    /// age out on their own.
    pub fn record_success(&mut self) {
        self.consecutive_count = 0;
    }

    /// Whether the gate is currently closed. An expired `gated_until` is
    /// cleared as a side effect.
    pub fn is_gated(&mut self) -> bool {
        match self.gated_until {
            Some(until) if Utc::now() >= until => {
                self.gated_until = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Time until the gate reopens, when closed.
    #[must_use]
    pub fn gate_remaining(&self) -> Option<Duration> {
        let until = self.gated_until?;
        let remaining = until - Utc::now();
        remaining.to_std().ok().filter(|d| !d.is_zero())
    }

    /// The most recent failures, newest last.
    #[must_use]
    pub fn recent_failures(&self, limit: Option<usize>) -> &[FailureRecord] {
        let limit = limit.unwrap_or(RECENT_LIMIT);
        let start = self.failures.len().saturating_sub(limit);
        &self.failures[start..]
    }

    /// Reset all state.
    pub fn clear(&mut self) {
        self.failures.clear();
        self.consecutive_count = 0;
        self.gated_until = None;
    }
}

// =============================================================================
// Gate Registry
// =============================================================================

/// Process-wide `provider_id -> FailureGate` mapping, lazily populated from
/// disk and persisted after every mutation.
///
/// Held in the fetch context rather than a global so tests can construct one
/// over a temp directory.
#[derive(Debug)]
pub struct GateRegistry {
    cache: CacheStore,
    gates: Mutex<HashMap<String, FailureGate>>,
}

impl GateRegistry {
    /// Registry backed by the given cache store.
    #[must_use]
    pub fn new(cache: CacheStore) -> Self {
        Self {
            cache,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` against the provider's gate, persisting the state afterwards.
    ///
    /// The gate is loaded from disk on first access.
    pub fn with_gate<R>(&self, provider_id: &str, f: impl FnOnce(&mut FailureGate) -> R) -> R {
        let mut gates = self.gates.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let gate = gates.entry(provider_id.to_string()).or_insert_with(|| {
            self.cache
                .load_gate_state::<GateState>(provider_id)
                .map_or_else(
                    || FailureGate::new(provider_id),
                    |state| FailureGate::from_state(provider_id, state),
                )
        });
        let result = f(gate);
        if let Err(e) = self.cache.save_gate_state(provider_id, &gate.to_state()) {
            tracing::debug!(provider = provider_id, error = %e, "failed to persist gate state");
        }
        result
    }

    /// Reset and persist a provider's gate.
    pub fn clear(&self, provider_id: &str) {
        self.with_gate(provider_id, FailureGate::clear);
    }
}

// =============================================================================
// Tests
// =============================================================================
