//! Machine-readable JSON output.
//!
//! Two top-level forms:
//! - success: `{"providers": {"<id>": {provider, source, fetched_at,
//!   periods, overage?, identity?, error?, ...}}}`
//! - error: `{"error": {message, category, severity, provider?,
//!   remediation?, timestamp, details?}}`

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::models::{OverageUsage, ProviderIdentity, UsagePeriod};
use crate::core::strategy::{FetchAttempt, FetchOutcome};
use crate::error::UsageError;

#[derive(Debug, Serialize)]
struct UsageReport<'a> {
    providers: BTreeMap<&'a str, ProviderEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct ProviderEntry<'a> {
    provider: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fetched_at: Option<DateTime<Utc>>,
    periods: Vec<&'a UsagePeriod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overage: Option<&'a OverageUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<&'a ProviderIdentity>,
    cached: bool,
    gated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    gate_remaining_secs: Option<u64>,
    attempts: Vec<AttemptEntry<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct AttemptEntry<'a> {
    strategy: &'a str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    duration_ms: u64,
}

#[derive(Debug, Serialize)]
struct ErrorReport<'a> {
    error: ErrorBody<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    message: String,
    category: &'a str,
    severity: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remediation: Option<String>,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

fn attempt_entry(attempt: &FetchAttempt) -> AttemptEntry<'_> {
    AttemptEntry {
        strategy: &attempt.strategy,
        success: attempt.success,
        error: attempt.error.as_deref(),
        duration_ms: attempt.duration_ms,
    }
}

/// Render the providers map for a usage invocation.
#[must_use]
pub fn render_usage_json(outcomes: &HashMap<String, FetchOutcome>, pretty: bool) -> String {
    let providers = outcomes
        .iter()
        .map(|(id, outcome)| {
            let snapshot = outcome.snapshot.as_ref();
            let entry = ProviderEntry {
                provider: id,
                source: outcome.source.as_deref(),
                fetched_at: snapshot.map(|s| s.fetched_at),
                periods: snapshot.map(|s| s.periods.iter().collect()).unwrap_or_default(),
                overage: snapshot.and_then(|s| s.overage.as_ref()),
                identity: snapshot.and_then(|s| s.identity.as_ref()),
                cached: outcome.cached,
                gated: outcome.gated,
                gate_remaining_secs: outcome.gate_remaining.map(|d| d.as_secs()),
                attempts: outcome.attempts.iter().map(attempt_entry).collect(),
                error: outcome.error.as_deref(),
            };
            (id.as_str(), entry)
        })
        .collect();

    let report = UsageReport { providers };
    to_json(&report, pretty)
}

/// Render a classified top-level error.
#[must_use]
pub fn render_error_json(error: &UsageError, pretty: bool) -> String {
    let report = ErrorReport {
        error: ErrorBody {
            message: error.to_string(),
            category: error.category().as_str(),
            severity: error.severity().as_str(),
            provider: error.provider(),
            remediation: error.remediation(),
            timestamp: Utc::now(),
            details: None,
        },
    };
    to_json(&report, pretty)
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> String {
    let result = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    result.unwrap_or_else(|e| format!("{{\"error\":{{\"message\":\"render failed: {e}\"}}}}"))
}
