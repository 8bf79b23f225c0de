//! Fetch-strategy contract.
//!
//! A strategy is one way of obtaining usage data for a provider (OAuth, web
//! session, API key, ...). Strategies are independent siblings behind one
//! trait; the pipeline walks them in order. Failures are values, not
//! exceptions: a [`FetchResult`] carries explicit `should_fallback` and
//! `fatal` flags that drive pipeline control flow.

use std::time::Duration;

use async_trait::async_trait;

use super::models::UsageSnapshot;
use crate::error::{ErrorCategory, UsageError};

// =============================================================================
// Fetch Result
// =============================================================================

/// Outcome of a single strategy invocation.
#[derive(Debug)]
pub struct FetchResult {
    pub success: bool,
    pub snapshot: Option<UsageSnapshot>,
    pub error: Option<UsageError>,
    /// When false, the pipeline must stop after this strategy: the
    /// credentials are definitively invalid.
    pub should_fallback: bool,
    /// When true, the entire fetch is a terminal configuration problem.
    pub fatal: bool,
}

impl FetchResult {
    /// Successful fetch.
    #[must_use]
    pub const fn ok(snapshot: UsageSnapshot) -> Self {
        Self {
            success: true,
            snapshot: Some(snapshot),
            error: None,
            should_fallback: false,
            fatal: false,
        }
    }

    /// Failure that allows the pipeline to try the next strategy.
    #[must_use]
    pub const fn fail(error: UsageError) -> Self {
        Self {
            success: false,
            snapshot: None,
            error: Some(error),
            should_fallback: true,
            fatal: false,
        }
    }

    /// Failure that must stop the pipeline (credentials definitively bad).
    #[must_use]
    pub const fn fail_no_fallback(error: UsageError) -> Self {
        Self {
            success: false,
            snapshot: None,
            error: Some(error),
            should_fallback: false,
            fatal: false,
        }
    }

    /// Terminal configuration problem; the whole fetch is over.
    #[must_use]
    pub const fn fatal(error: UsageError) -> Self {
        Self {
            success: false,
            snapshot: None,
            error: Some(error),
            should_fallback: false,
            fatal: true,
        }
    }

    /// The error message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

// =============================================================================
// Strategy Trait
// =============================================================================

/// One way of fetching usage data for a provider.
///
/// Strategies own their credential file format and must write refreshed
/// credentials back through the credential store.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Stable identifier ("oauth", "web", "api_key", ...).
    fn name(&self) -> &'static str;

    /// Whether the necessary credentials/environment exist. Must not perform
    /// network I/O.
    fn is_available(&self) -> bool;

    /// Perform the fetch.
    async fn fetch(&self) -> FetchResult;

    /// Re-attempt after refreshing credentials. The default just fetches
    /// again; OAuth-style strategies exchange refresh tokens here.
    async fn refresh(&self) -> FetchResult {
        self.fetch().await
    }
}

// =============================================================================
// Attempts and Outcomes
// =============================================================================

/// Record of one strategy invocation inside a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub strategy: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// The pipeline's product for one provider.
#[derive(Debug)]
pub struct FetchOutcome {
    pub provider_id: String,
    pub success: bool,
    pub snapshot: Option<UsageSnapshot>,
    /// Name of the strategy that produced the snapshot, or "cache".
    pub source: Option<String>,
    /// Strategy invocations in order.
    pub attempts: Vec<FetchAttempt>,
    pub error: Option<String>,
    /// Classification of the final error, for exit-code mapping.
    pub error_category: Option<ErrorCategory>,
    /// Snapshot was served from the cache instead of a live fetch.
    pub cached: bool,
    /// The failure gate short-circuited this provider.
    pub gated: bool,
    /// Time until the gate reopens, when gated.
    pub gate_remaining: Option<Duration>,
    /// A strategy reported a terminal configuration problem.
    pub fatal: bool,
}

impl FetchOutcome {
    /// Successful live fetch.
    #[must_use]
    pub fn success(
        provider_id: impl Into<String>,
        snapshot: UsageSnapshot,
        source: impl Into<String>,
        attempts: Vec<FetchAttempt>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            success: true,
            snapshot: Some(snapshot),
            source: Some(source.into()),
            attempts,
            error: None,
            error_category: None,
            cached: false,
            gated: false,
            gate_remaining: None,
            fatal: false,
        }
    }

    /// Snapshot served from cache after live fetching failed or was gated.
    #[must_use]
    pub fn cached(
        provider_id: impl Into<String>,
        snapshot: UsageSnapshot,
        attempts: Vec<FetchAttempt>,
        gated: bool,
        gate_remaining: Option<Duration>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            success: true,
            snapshot: Some(snapshot),
            source: Some("cache".to_string()),
            attempts,
            error: None,
            error_category: None,
            cached: true,
            gated,
            gate_remaining,
            fatal: false,
        }
    }

    /// Failure with no snapshot to show.
    #[must_use]
    pub fn failure(
        provider_id: impl Into<String>,
        error: impl Into<String>,
        attempts: Vec<FetchAttempt>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            success: false,
            snapshot: None,
            source: None,
            attempts,
            error: Some(error.into()),
            error_category: None,
            cached: false,
            gated: false,
            gate_remaining: None,
            fatal: false,
        }
    }

    /// Attach the classification of the final error.
    #[must_use]
    pub const fn with_error_category(mut self, category: ErrorCategory) -> Self {
        self.error_category = Some(category);
        self
    }

    /// Failure because the gate is closed and no cache was available.
    #[must_use]
    pub fn gated(provider_id: impl Into<String>, remaining: Duration) -> Self {
        let provider_id = provider_id.into();
        let error = UsageError::Gated {
            provider: provider_id.clone(),
            remaining,
        };
        Self {
            error_category: Some(error.category()),
            ..Self::failure(provider_id, error.to_string(), Vec::new())
        }
        .with_gate(remaining)
    }

    fn with_gate(mut self, remaining: Duration) -> Self {
        self.gated = true;
        self.gate_remaining = Some(remaining);
        self
    }

    /// Mark this outcome as fatal.
    #[must_use]
    pub fn into_fatal(mut self) -> Self {
        self.fatal = true;
        self
    }
}
