//! Per-provider fetch pipeline.
//!
//! Turns an ordered list of strategies into a single [`FetchOutcome`]:
//! consult the failure gate, walk available strategies under the per-request
//! timeout, validate and persist the first good snapshot, and fall back to
//! the cache when everything fails. The ordered attempt list always rides
//! along so the renderer can explain what happened.

use std::time::Instant;

use tokio::time::timeout;

use super::gate::{FailureGate, GateRegistry};
use super::strategy::{FetchAttempt, FetchOutcome, FetchStrategy};
use crate::error::ErrorCategory;
use crate::storage::{CacheStore, Config};

/// Everything a pipeline run needs: resolved config, cache store, and the
/// gate registry. Constructed once per invocation and shared across
/// providers.
#[derive(Debug)]
pub struct FetchContext {
    pub config: Config,
    pub cache: CacheStore,
    pub gates: GateRegistry,
}

impl FetchContext {
    /// Build a context from configuration and a cache store.
    #[must_use]
    pub fn new(config: Config, cache: CacheStore) -> Self {
        let gates = GateRegistry::new(cache.clone());
        Self {
            config,
            cache,
            gates,
        }
    }
}

/// Execute the fetch pipeline for one provider.
///
/// `use_cache` controls both fallback branches: serving a fresh-enough
/// cached snapshot when the gate is closed, and converting total strategy
/// exhaustion into a stale-but-useful cached result.
pub async fn execute_fetch_pipeline(
    ctx: &FetchContext,
    provider_id: &str,
    strategies: &[Box<dyn FetchStrategy>],
    use_cache: bool,
) -> FetchOutcome {
    // Gate check: a closed gate means no strategy runs at all.
    if ctx.gates.with_gate(provider_id, FailureGate::is_gated) {
        let remaining = ctx
            .gates
            .with_gate(provider_id, |gate| gate.gate_remaining())
            .unwrap_or_default();
        tracing::info!(
            provider = provider_id,
            remaining_secs = remaining.as_secs(),
            "provider gated, skipping live fetch"
        );

        if use_cache {
            if let Some(snapshot) = ctx
                .cache
                .load_snapshot_if_fresh(provider_id, ctx.config.fetch.stale_threshold())
            {
                return FetchOutcome::cached(provider_id, snapshot, Vec::new(), true, Some(remaining));
            }
        }
        return FetchOutcome::gated(provider_id, remaining);
    }

    let request_timeout = ctx.config.fetch.timeout_duration();
    let mut attempts: Vec<FetchAttempt> = Vec::new();
    let mut last_error: Option<String> = None;
    let mut last_category = ErrorCategory::Unknown;

    for strategy in strategies {
        if !strategy.is_available() {
            tracing::debug!(
                provider = provider_id,
                strategy = strategy.name(),
                "strategy not available, skipping"
            );
            continue;
        }

        tracing::info!(
            provider = provider_id,
            strategy = strategy.name(),
            "trying fetch strategy"
        );
        let start = Instant::now();

        let result = match timeout(request_timeout, strategy.fetch()).await {
            Ok(result) => result,
            Err(_) => {
                let message = format!("timeout after {}s", request_timeout.as_secs());
                attempts.push(FetchAttempt {
                    strategy: strategy.name().to_string(),
                    success: false,
                    error: Some(message.clone()),
                    duration_ms: start.elapsed().as_millis() as u64,
                });
                last_error = Some(message);
                last_category = ErrorCategory::Network;
                continue;
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        if result.success {
            let Some(snapshot) = result.snapshot else {
                attempts.push(FetchAttempt {
                    strategy: strategy.name().to_string(),
                    success: false,
                    error: Some("strategy reported success without a snapshot".to_string()),
                    duration_ms,
                });
                last_category = ErrorCategory::Parse;
                continue;
            };

            // A snapshot that fails validation is a fallback-eligible
            // failure, not a success.
            if let Err(err) = snapshot.validate() {
                tracing::warn!(
                    provider = provider_id,
                    strategy = strategy.name(),
                    error = %err,
                    "snapshot failed validation"
                );
                attempts.push(FetchAttempt {
                    strategy: strategy.name().to_string(),
                    success: false,
                    error: Some(err.to_string()),
                    duration_ms,
                });
                last_error = Some(err.to_string());
                last_category = ErrorCategory::Parse;
                continue;
            }

            attempts.push(FetchAttempt {
                strategy: strategy.name().to_string(),
                success: true,
                error: None,
                duration_ms,
            });

            ctx.gates
                .with_gate(provider_id, FailureGate::record_success);
            if let Err(e) = ctx.cache.save_snapshot(&snapshot) {
                tracing::debug!(provider = provider_id, error = %e, "failed to cache snapshot");
            }

            tracing::info!(
                provider = provider_id,
                strategy = strategy.name(),
                duration_ms,
                "fetch succeeded"
            );
            return FetchOutcome::success(provider_id, snapshot, strategy.name(), attempts);
        }

        let message = result
            .error_message()
            .unwrap_or_else(|| "fetch failed".to_string());
        if let Some(err) = &result.error {
            last_category = err.category();
        }
        tracing::warn!(
            provider = provider_id,
            strategy = strategy.name(),
            error = %message,
            "fetch strategy failed"
        );
        attempts.push(FetchAttempt {
            strategy: strategy.name().to_string(),
            success: false,
            error: Some(message.clone()),
            duration_ms,
        });
        last_error = Some(message.clone());

        if result.fatal {
            return FetchOutcome::failure(provider_id, message, attempts)
                .with_error_category(last_category)
                .into_fatal();
        }
        if !result.should_fallback {
            tracing::debug!(
                provider = provider_id,
                strategy = strategy.name(),
                "strategy does not allow fallback, stopping"
            );
            break;
        }
    }

    // Exhaustion: every strategy failed, was skipped, or stopped fallback.
    let message = last_error
        .unwrap_or_else(|| format!("no usable fetch strategy for {provider_id}"));
    ctx.gates.with_gate(provider_id, |gate| {
        gate.record_failure(last_category, message.clone());
    });

    if use_cache {
        if let Some(snapshot) = ctx
            .cache
            .load_snapshot_if_fresh(provider_id, ctx.config.fetch.stale_threshold())
        {
            tracing::info!(provider = provider_id, "serving cached snapshot after fetch failure");
            return FetchOutcome::cached(provider_id, snapshot, attempts, false, None);
        }
    }

    FetchOutcome::failure(provider_id, message, attempts).with_error_category(last_category)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gate::MAX_CONSECUTIVE_FAILURES;
    use crate::core::models::{PeriodType, UsagePeriod, UsageSnapshot};
    use crate::core::strategy::FetchResult;
    use crate::error::UsageError;
    use crate::storage::AppPaths;
    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;

    struct StubStrategy {
        name: &'static str,
        available: bool,
        result: fn() -> FetchResult,
    }

    impl StubStrategy {
        fn boxed(
            name: &'static str,
            available: bool,
            result: fn() -> FetchResult,
        ) -> Box<dyn FetchStrategy> {
            Box::new(Self {
                name,
                available,
                result,
            })
        }
    }

    #[async_trait]
    impl FetchStrategy for StubStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn fetch(&self) -> FetchResult {
            (self.result)()
        }
    }

    fn snapshot() -> UsageSnapshot {
        UsageSnapshot::new(
            "claude",
            vec![UsagePeriod::new("Session (5h)", 42, PeriodType::Session)],
        )
    }

    fn ok_result() -> FetchResult {
        FetchResult::ok(snapshot())
    }

    fn failing_result() -> FetchResult {
        FetchResult::fail(UsageError::from_status(500, "claude", "boom"))
    }

    fn auth_dead_end() -> FetchResult {
        FetchResult::fail_no_fallback(UsageError::AuthInvalid {
            provider: "claude".into(),
            reason: "revoked".into(),
        })
    }

    fn fatal_result() -> FetchResult {
        FetchResult::fatal(UsageError::PermissionDenied {
            path: "/creds".into(),
        })
    }

    fn invalid_snapshot_result() -> FetchResult {
        FetchResult::ok(UsageSnapshot::new("claude", vec![]))
    }

    fn ctx(dir: &TempDir) -> FetchContext {
        let paths = AppPaths::rooted(
            dir.path().join("cfg"),
            dir.path().join("cache"),
            dir.path().join("state"),
        );
        FetchContext::new(Config::default(), CacheStore::new(&paths))
    }

    #[tokio::test]
    async fn happy_path_single_strategy() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);
        let strategies = vec![StubStrategy::boxed("oauth", true, ok_result)];

        let outcome = execute_fetch_pipeline(&ctx, "claude", &strategies, false).await;

        assert!(outcome.success);
        assert!(!outcome.cached);
        assert_eq!(outcome.source.as_deref(), Some("oauth"));
        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.attempts[0].success);
        // Snapshot was persisted.
        assert!(ctx.cache.load_snapshot("claude").is_some());
        // Gate saw the success.
        assert_eq!(
            ctx.gates.with_gate("claude", |g| g.consecutive_count),
            0
        );
    }

    #[tokio::test]
    async fn first_fails_second_succeeds() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);
        let strategies = vec![
            StubStrategy::boxed("oauth", true, failing_result),
            StubStrategy::boxed("session", true, ok_result),
        ];

        let outcome = execute_fetch_pipeline(&ctx, "claude", &strategies, false).await;

        assert!(outcome.success);
        assert_eq!(outcome.source.as_deref(), Some("session"));
        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].success);
        assert!(outcome.attempts[1].success);
        assert_eq!(ctx.gates.with_gate("claude", |g| g.consecutive_count), 0);
    }

    #[tokio::test]
    async fn unavailable_strategies_record_nothing() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);
        let strategies = vec![
            StubStrategy::boxed("oauth", false, ok_result),
            StubStrategy::boxed("api_key", true, ok_result),
        ];

        let outcome = execute_fetch_pipeline(&ctx, "claude", &strategies, false).await;

        assert!(outcome.success);
        assert_eq!(outcome.source.as_deref(), Some("api_key"));
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[tokio::test]
    async fn exhaustion_without_cache_is_failure() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);
        let strategies = vec![StubStrategy::boxed("oauth", true, failing_result)];

        let outcome = execute_fetch_pipeline(&ctx, "claude", &strategies, false).await;

        assert!(!outcome.success);
        assert!(outcome.snapshot.is_none());
        assert!(outcome.error.is_some());
        // Exhaustion recorded one gate failure.
        assert_eq!(ctx.gates.with_gate("claude", |g| g.consecutive_count), 1);
    }

    #[tokio::test]
    async fn exhaustion_with_fresh_cache_serves_cached() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);

        let mut cached = snapshot();
        cached.fetched_at = Utc::now() - chrono::Duration::minutes(30);
        ctx.cache.save_snapshot(&cached).unwrap();

        let strategies = vec![StubStrategy::boxed("oauth", true, failing_result)];
        let outcome = execute_fetch_pipeline(&ctx, "claude", &strategies, true).await;

        assert!(outcome.success);
        assert!(outcome.cached);
        assert_eq!(outcome.source.as_deref(), Some("cache"));
        assert!(!outcome.gated);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(ctx.gates.with_gate("claude", |g| g.consecutive_count), 1);
    }

    #[tokio::test]
    async fn exhaustion_ignores_stale_cache() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);

        let mut cached = snapshot();
        cached.fetched_at = Utc::now() - chrono::Duration::minutes(90);
        ctx.cache.save_snapshot(&cached).unwrap();

        let strategies = vec![StubStrategy::boxed("oauth", true, failing_result)];
        let outcome = execute_fetch_pipeline(&ctx, "claude", &strategies, true).await;

        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn fatal_stops_immediately() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);
        let strategies = vec![
            StubStrategy::boxed("oauth", true, fatal_result),
            StubStrategy::boxed("session", true, ok_result),
        ];

        let outcome = execute_fetch_pipeline(&ctx, "claude", &strategies, true).await;

        assert!(!outcome.success);
        assert!(outcome.fatal);
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[tokio::test]
    async fn no_fallback_skips_remaining_strategies() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);
        let strategies = vec![
            StubStrategy::boxed("oauth", true, auth_dead_end),
            StubStrategy::boxed("session", true, ok_result),
        ];

        let outcome = execute_fetch_pipeline(&ctx, "claude", &strategies, false).await;

        assert!(!outcome.success);
        assert!(!outcome.fatal);
        assert_eq!(outcome.attempts.len(), 1);
        // Exhaustion handling still records the gate failure.
        assert_eq!(ctx.gates.with_gate("claude", |g| g.consecutive_count), 1);
    }

    #[tokio::test]
    async fn invalid_snapshot_is_fallback_eligible() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);
        let strategies = vec![
            StubStrategy::boxed("oauth", true, invalid_snapshot_result),
            StubStrategy::boxed("session", true, ok_result),
        ];

        let outcome = execute_fetch_pipeline(&ctx, "claude", &strategies, false).await;

        assert!(outcome.success);
        assert_eq!(outcome.source.as_deref(), Some("session"));
        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].success);
    }

    #[tokio::test]
    async fn gated_with_no_cache_short_circuits() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);

        ctx.gates.with_gate("claude", |gate| {
            for _ in 0..MAX_CONSECUTIVE_FAILURES {
                gate.record_failure(ErrorCategory::Network, "down");
            }
        });

        let strategies = vec![StubStrategy::boxed("oauth", true, ok_result)];
        let outcome = execute_fetch_pipeline(&ctx, "claude", &strategies, true).await;

        assert!(!outcome.success);
        assert!(outcome.gated);
        assert!(outcome.gate_remaining.unwrap().as_secs() > 0);
        assert!(outcome.attempts.is_empty());
        // The strategy was never invoked.
        assert!(ctx.cache.load_snapshot("claude").is_none());
    }

    #[tokio::test]
    async fn gated_with_cache_serves_cached() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);

        ctx.cache.save_snapshot(&snapshot()).unwrap();
        ctx.gates.with_gate("claude", |gate| {
            for _ in 0..MAX_CONSECUTIVE_FAILURES {
                gate.record_failure(ErrorCategory::Network, "down");
            }
        });

        let strategies = vec![StubStrategy::boxed("oauth", true, failing_result)];
        let outcome = execute_fetch_pipeline(&ctx, "claude", &strategies, true).await;

        assert!(outcome.success);
        assert!(outcome.cached);
        assert!(outcome.gated);
        assert_eq!(outcome.source.as_deref(), Some("cache"));
    }

    #[tokio::test]
    async fn third_failure_closes_gate() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);
        let strategies = vec![StubStrategy::boxed("oauth", true, failing_result)];

        for _ in 0..MAX_CONSECUTIVE_FAILURES {
            let outcome = execute_fetch_pipeline(&ctx, "claude", &strategies, false).await;
            assert!(!outcome.success);
        }

        assert!(ctx.gates.with_gate("claude", FailureGate::is_gated));

        // The next run short-circuits without touching a strategy.
        let outcome = execute_fetch_pipeline(&ctx, "claude", &strategies, false).await;
        assert!(outcome.gated);
        assert!(outcome.attempts.is_empty());
    }
}
