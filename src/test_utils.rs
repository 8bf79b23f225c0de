//! Shared test fixtures.
//!
//! Available to unit tests and, via the `test-utils` feature, to the
//! integration tests under `tests/`.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;

use crate::core::models::{
    OverageUsage, PeriodType, ProviderIdentity, UsagePeriod, UsageSnapshot,
};
use crate::core::pipeline::FetchContext;
use crate::storage::{AppPaths, CacheStore, Config, CredentialStore};

/// A usage period with a reset time in the future.
#[must_use]
pub fn make_test_period(name: &str, utilization: u8, period_type: PeriodType) -> UsagePeriod {
    let mut period = UsagePeriod::new(name, utilization, period_type);
    period.resets_at = Some(Utc::now() + period_type.duration() / 2);
    period
}

/// A snapshot with session and weekly windows plus identity.
#[must_use]
pub fn make_test_snapshot(provider: &str) -> UsageSnapshot {
    let mut snapshot = UsageSnapshot::new(
        provider,
        vec![
            make_test_period("Session (5h)", 42, PeriodType::Session),
            make_test_period("Weekly", 18, PeriodType::Weekly),
        ],
    );
    snapshot.identity = Some(ProviderIdentity {
        email: Some("dev@example.com".to_string()),
        organization: None,
        plan: Some("pro".to_string()),
    });
    snapshot.source = Some("oauth".to_string());
    snapshot
}

/// A snapshot carrying model-specific breakdowns and overage.
#[must_use]
pub fn make_test_snapshot_with_models(provider: &str) -> UsageSnapshot {
    let mut snapshot = make_test_snapshot(provider);
    let mut opus = make_test_period("opus (7d)", 71, PeriodType::Weekly);
    opus.model = Some("opus".to_string());
    snapshot.periods.push(opus);
    snapshot.overage = Some(OverageUsage {
        used: Decimal::new(1250, 2),
        limit: Decimal::new(2500, 2),
        currency: "USD".to_string(),
        is_enabled: true,
    });
    snapshot
}

/// A snapshot whose fetch time lies `minutes` in the past.
#[must_use]
pub fn make_aged_snapshot(provider: &str, minutes: i64) -> UsageSnapshot {
    let mut snapshot = make_test_snapshot(provider);
    snapshot.fetched_at = Utc::now() - Duration::minutes(minutes);
    snapshot
}

/// Application paths rooted in a temp directory.
#[must_use]
pub fn make_test_paths(dir: &TempDir) -> AppPaths {
    AppPaths::rooted(
        dir.path().join("config"),
        dir.path().join("cache"),
        dir.path().join("state"),
    )
}

/// A fetch context over temp-dir storage with default config.
#[must_use]
pub fn make_test_context(dir: &TempDir) -> FetchContext {
    make_test_context_with_config(dir, Config::default())
}

/// A fetch context over temp-dir storage with the given config.
#[must_use]
pub fn make_test_context_with_config(dir: &TempDir, config: Config) -> FetchContext {
    let paths = make_test_paths(dir);
    FetchContext::new(config, CacheStore::new(&paths))
}

/// A credential store whose home directory is inside the temp dir, so
/// foreign-CLI discovery never sees the real home.
#[must_use]
pub fn make_test_credential_store(dir: &TempDir) -> CredentialStore {
    let paths = make_test_paths(dir);
    CredentialStore::with_home(paths.credentials_dir(), dir.path().join("home"))
}
