//! Normalized usage data model.
//!
//! Every provider strategy produces these provider-neutral types; the
//! renderer and caches consume nothing else. All instants are `DateTime<Utc>`
//! so naive timestamps are unrepresentable here.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

// =============================================================================
// Period Type
// =============================================================================

/// Usage window kinds, each with a canonical duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    /// Short burst window (5 hours).
    Session,
    /// 24-hour window.
    Daily,
    /// Rolling 7-day window.
    Weekly,
    /// Rolling 30-day window.
    Monthly,
}

impl PeriodType {
    /// Canonical duration of this window.
    #[must_use]
    pub fn duration(self) -> Duration {
        match self {
            Self::Session => Duration::hours(5),
            Self::Daily => Duration::hours(24),
            Self::Weekly => Duration::days(7),
            Self::Monthly => Duration::days(30),
        }
    }

    /// Sort rank: shorter windows first.
    const fn rank(self) -> u8 {
        match self {
            Self::Session => 0,
            Self::Daily => 1,
            Self::Weekly => 2,
            Self::Monthly => 3,
        }
    }
}

// =============================================================================
// Usage Period
// =============================================================================

/// One rate window for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePeriod {
    /// Display name (e.g. "Session (5h)", "Weekly").
    pub name: String,
    /// Percentage of the window consumed, 0-100.
    pub utilization: u8,
    pub period_type: PeriodType,
    /// When the window resets, if the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
    /// Set only for model-specific breakdowns (e.g. "opus").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl UsagePeriod {
    /// Create a period with just a name, utilization and type.
    #[must_use]
    pub fn new(name: impl Into<String>, utilization: u8, period_type: PeriodType) -> Self {
        Self {
            name: name.into(),
            utilization,
            period_type,
            resets_at: None,
            model: None,
        }
    }

    /// Percentage remaining.
    #[must_use]
    pub const fn remaining(&self) -> u8 {
        100u8.saturating_sub(self.utilization)
    }

    /// Fraction of the window already elapsed at `now`, clamped to [0, 1].
    ///
    /// `None` when the reset time is unknown.
    #[must_use]
    pub fn elapsed_ratio_at(&self, now: DateTime<Utc>) -> Option<f64> {
        let resets_at = self.resets_at?;
        let total = self.period_type.duration();
        let start = resets_at - total;
        let elapsed = (now - start).num_seconds() as f64;
        let ratio = elapsed / total.num_seconds() as f64;
        Some(ratio.clamp(0.0, 1.0))
    }

    /// Fraction of the window already elapsed, clamped to [0, 1].
    #[must_use]
    pub fn elapsed_ratio(&self) -> Option<f64> {
        self.elapsed_ratio_at(Utc::now())
    }

    /// Usage pace relative to linear consumption at `now`.
    ///
    /// 1.0 means exactly on pace, above 1.0 means consuming faster than the
    /// window refills. Undefined until at least 10% of the window has
    /// elapsed, since early readings are meaningless.
    #[must_use]
    pub fn pace_ratio_at(&self, now: DateTime<Utc>) -> Option<f64> {
        let elapsed = self.elapsed_ratio_at(now)?;
        if elapsed < 0.10 {
            return None;
        }
        let expected = elapsed * 100.0;
        Some(f64::from(self.utilization) / expected)
    }

    /// Usage pace relative to linear consumption.
    #[must_use]
    pub fn pace_ratio(&self) -> Option<f64> {
        self.pace_ratio_at(Utc::now())
    }

    /// Time left until the window resets at `now`, floored at zero.
    #[must_use]
    pub fn time_until_reset_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let resets_at = self.resets_at?;
        Some((resets_at - now).max(Duration::zero()))
    }

    /// Time left until the window resets, floored at zero.
    #[must_use]
    pub fn time_until_reset(&self) -> Option<Duration> {
        self.time_until_reset_at(Utc::now())
    }

    /// Validation problems for this period; empty when valid.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.utilization > 100 {
            errors.push(format!(
                "utilization {} out of range [0, 100] for period '{}'",
                self.utilization, self.name
            ));
        }
        errors
    }
}

// =============================================================================
// Overage
// =============================================================================

/// Monetary or credit overflow state beyond the primary quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverageUsage {
    /// Amount consumed, in `currency` units.
    pub used: Decimal,
    /// Allowance, in `currency` units.
    pub limit: Decimal,
    /// "USD", "credits", or an ISO-like code.
    pub currency: String,
    pub is_enabled: bool,
}

impl OverageUsage {
    /// Remaining allowance, floored at zero.
    #[must_use]
    pub fn remaining(&self) -> Decimal {
        (self.limit - self.used).max(Decimal::ZERO)
    }

    /// Consumed fraction as a 0-100 percentage.
    ///
    /// A zero limit reads as fully consumed when anything was used.
    #[must_use]
    pub fn utilization(&self) -> u8 {
        if self.limit <= Decimal::ZERO {
            return if self.used > Decimal::ZERO { 100 } else { 0 };
        }
        let pct = (self.used / self.limit * Decimal::from(100)).floor();
        pct.to_u8().map_or(100, |p| p.min(100))
    }
}

// =============================================================================
// Identity and Status
// =============================================================================

/// Account and plan information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Plan tier (e.g. "free", "pro", "max").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
}

/// Provider operational status levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Operational,
    Degraded,
    PartialOutage,
    MajorOutage,
    #[default]
    Unknown,
}

impl StatusLevel {
    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Operational => "Operational",
            Self::Degraded => "Degraded",
            Self::PartialOutage => "Partial Outage",
            Self::MajorOutage => "Major Outage",
            Self::Unknown => "Unknown",
        }
    }
}

/// Provider health as reported by its status page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub level: StatusLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProviderStatus {
    /// Operational status with no incident attached.
    #[must_use]
    pub const fn operational() -> Self {
        Self {
            level: StatusLevel::Operational,
            description: None,
            updated_at: None,
        }
    }
}

// =============================================================================
// Usage Snapshot
// =============================================================================

/// Complete usage snapshot from a provider.
///
/// The unit of exchange between the fetch core and the renderer, and the
/// value persisted in the snapshot cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Provider identifier (e.g. "claude", "codex").
    pub provider: String,
    /// When this data was fetched (UTC).
    pub fetched_at: DateTime<Utc>,
    /// Rate windows, in the order the strategy produced them.
    #[serde(default)]
    pub periods: Vec<UsagePeriod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overage: Option<OverageUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<ProviderIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProviderStatus>,
    /// Which strategy produced this snapshot ("oauth", "web", "cache", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl UsageSnapshot {
    /// Create a snapshot fetched now with the given periods.
    #[must_use]
    pub fn new(provider: impl Into<String>, periods: Vec<UsagePeriod>) -> Self {
        Self {
            provider: provider.into(),
            fetched_at: Utc::now(),
            periods,
            overage: None,
            identity: None,
            status: None,
            source: None,
        }
    }

    /// The shortest-duration window present: session < daily < weekly < monthly.
    #[must_use]
    pub fn primary_period(&self) -> Option<&UsagePeriod> {
        self.periods.iter().min_by_key(|p| p.period_type.rank())
    }

    /// The next non-model-specific window after the primary.
    #[must_use]
    pub fn secondary_period(&self) -> Option<&UsagePeriod> {
        let primary = self.primary_period()?;
        self.periods
            .iter()
            .find(|p| !std::ptr::eq(*p, primary) && p.model.is_none())
    }

    /// Model-specific windows, in snapshot order.
    #[must_use]
    pub fn model_periods(&self) -> Vec<&UsagePeriod> {
        self.periods.iter().filter(|p| p.model.is_some()).collect()
    }

    /// Age of the snapshot at `now`.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }

    /// Whether the snapshot is older than `max_age`.
    #[must_use]
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age_at(Utc::now()) > max_age
    }

    /// Validation problems for this snapshot; empty when valid.
    ///
    /// All violations are reported, not just the first.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.periods.is_empty() {
            errors.push("at least one period required".to_string());
        }
        for period in &self.periods {
            errors.extend(period.validation_errors());
        }
        errors
    }

    /// Validate, returning a [`crate::error::UsageError::InvalidSnapshot`]
    /// listing every violation.
    pub fn validate(&self) -> crate::error::Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(crate::error::UsageError::InvalidSnapshot {
                provider: self.provider.clone(),
                problems: errors.join("; "),
            })
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
