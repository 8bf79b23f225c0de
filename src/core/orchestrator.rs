//! Multi-provider fetch orchestration.
//!
//! Runs each provider's pipeline concurrently under a semaphore sized by
//! `fetch.max_concurrent`. Per-provider failures never escape their outcome;
//! the orchestrator itself only errs by returning cancelled outcomes when
//! the caller pulls the cancellation signal.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

use super::pipeline::{FetchContext, execute_fetch_pipeline};
use super::strategy::{FetchOutcome, FetchStrategy};

/// Ordered `provider id -> strategies` assignment for one invocation.
pub type StrategyMap = Vec<(String, Vec<Box<dyn FetchStrategy>>)>;

/// Invoked with each outcome as it completes, in completion order.
///
/// The callback may not fail the fetch: panics are caught and logged.
pub type ProgressCallback = Arc<dyn Fn(&FetchOutcome) + Send + Sync>;

/// Cooperative cancellation signal; flip to `true` to cancel.
pub type CancelSignal = watch::Receiver<bool>;

/// Fetch every provider in `providers` concurrently.
///
/// Returns outcomes keyed by provider id once all pipelines finish. On
/// cancellation, in-flight pipelines are aborted and reported with
/// `error="cancelled"`.
pub async fn fetch_all_providers(
    ctx: Arc<FetchContext>,
    providers: StrategyMap,
    use_cache: bool,
    on_progress: Option<ProgressCallback>,
    cancel: Option<CancelSignal>,
) -> HashMap<String, FetchOutcome> {
    let all_ids: Vec<String> = providers.iter().map(|(id, _)| id.clone()).collect();
    let semaphore = Arc::new(Semaphore::new(ctx.config.fetch.max_concurrent));

    let mut tasks = JoinSet::new();
    for (provider_id, strategies) in providers {
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            // Bounded concurrency: every fetch goes through this gate.
            let _permit = semaphore.acquire_owned().await;
            let outcome = execute_fetch_pipeline(&ctx, &provider_id, &strategies, use_cache).await;
            (provider_id, outcome)
        });
    }

    let mut outcomes = HashMap::new();
    let mut cancel = cancel;

    loop {
        tokio::select! {
            joined = tasks.join_next() => {
                match joined {
                    None => break,
                    Some(Ok((provider_id, outcome))) => {
                        notify_progress(on_progress.as_ref(), &outcome);
                        outcomes.insert(provider_id, outcome);
                    }
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "pipeline task did not complete");
                    }
                }
            }
            () = wait_for_cancel(&mut cancel) => {
                tracing::info!("cancellation requested, aborting in-flight fetches");
                tasks.abort_all();
                while let Some(joined) = tasks.join_next().await {
                    if let Ok((provider_id, outcome)) = joined {
                        outcomes.insert(provider_id, outcome);
                    }
                }
                break;
            }
        }
    }

    // Anything that never produced an outcome was cancelled mid-flight.
    for provider_id in all_ids {
        outcomes.entry(provider_id.clone()).or_insert_with(|| {
            FetchOutcome::failure(provider_id, "cancelled", Vec::new())
        });
    }

    outcomes
}

/// Fetch only the providers the configuration marks enabled.
pub async fn fetch_enabled_providers(
    ctx: Arc<FetchContext>,
    providers: StrategyMap,
    use_cache: bool,
    on_progress: Option<ProgressCallback>,
    cancel: Option<CancelSignal>,
) -> HashMap<String, FetchOutcome> {
    let enabled: StrategyMap = providers
        .into_iter()
        .filter(|(id, _)| {
            let keep = ctx.config.is_provider_enabled(id);
            if !keep {
                tracing::debug!(provider = %id, "provider disabled, skipping");
            }
            keep
        })
        .collect();
    fetch_all_providers(ctx, enabled, use_cache, on_progress, cancel).await
}

/// Single-provider variant used when the command names exactly one provider.
/// Same semantics, no concurrency region.
pub async fn fetch_single_provider(
    ctx: &FetchContext,
    provider_id: &str,
    strategies: &[Box<dyn FetchStrategy>],
    on_complete: Option<ProgressCallback>,
) -> FetchOutcome {
    let outcome = execute_fetch_pipeline(ctx, provider_id, strategies, true).await;
    notify_progress(on_complete.as_ref(), &outcome);
    outcome
}

fn notify_progress(callback: Option<&ProgressCallback>, outcome: &FetchOutcome) {
    if let Some(callback) = callback {
        if catch_unwind(AssertUnwindSafe(|| callback(outcome))).is_err() {
            tracing::debug!(
                provider = %outcome.provider_id,
                "progress callback panicked, ignoring"
            );
        }
    }
}

/// Resolves when the signal flips to `true`; pends forever without a signal.
async fn wait_for_cancel(cancel: &mut Option<CancelSignal>) {
    match cancel {
        Some(rx) => loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without cancelling; nothing will ever fire.
                futures::future::pending::<()>().await;
            }
        },
        None => futures::future::pending().await,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{PeriodType, UsagePeriod, UsageSnapshot};
    use crate::core::strategy::FetchResult;
    use crate::storage::{AppPaths, CacheStore, Config};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct CountingStrategy {
        provider: String,
        delay: Duration,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FetchStrategy for CountingStrategy {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn fetch(&self) -> FetchResult {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            FetchResult::ok(UsageSnapshot::new(
                self.provider.clone(),
                vec![UsagePeriod::new("Session", 10, PeriodType::Session)],
            ))
        }
    }

    fn test_ctx(dir: &TempDir, max_concurrent: usize) -> Arc<FetchContext> {
        let paths = AppPaths::rooted(
            dir.path().join("cfg"),
            dir.path().join("cache"),
            dir.path().join("state"),
        );
        let mut config = Config::default();
        config.fetch.max_concurrent = max_concurrent;
        Arc::new(FetchContext::new(config, CacheStore::new(&paths)))
    }

    fn counting_map(
        ids: &[&str],
        delay: Duration,
        in_flight: &Arc<AtomicUsize>,
        peak: &Arc<AtomicUsize>,
    ) -> StrategyMap {
        ids.iter()
            .map(|id| {
                let strategy: Box<dyn FetchStrategy> = Box::new(CountingStrategy {
                    provider: (*id).to_string(),
                    delay,
                    in_flight: Arc::clone(in_flight),
                    peak: Arc::clone(peak),
                });
                ((*id).to_string(), vec![strategy])
            })
            .collect()
    }

    #[tokio::test]
    async fn fetches_all_providers() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir, 5);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let map = counting_map(
            &["claude", "codex", "gemini"],
            Duration::from_millis(5),
            &in_flight,
            &peak,
        );

        let outcomes = fetch_all_providers(ctx, map, true, None, None).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.values().all(|o| o.success));
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_limit() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir, 2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let map = counting_map(
            &["claude", "codex", "gemini", "copilot", "cursor"],
            Duration::from_millis(25),
            &in_flight,
            &peak,
        );

        let outcomes = fetch_all_providers(ctx, map, true, None, None).await;

        assert_eq!(outcomes.len(), 5);
        assert!(
            peak.load(Ordering::SeqCst) <= 2,
            "peak concurrency was {}",
            peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn progress_callback_sees_every_outcome() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir, 5);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let map = counting_map(
            &["claude", "codex"],
            Duration::from_millis(5),
            &in_flight,
            &peak,
        );

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |outcome: &FetchOutcome| {
            seen_cb.lock().unwrap().push(outcome.provider_id.clone());
        });

        fetch_all_providers(ctx, map, true, Some(callback), None).await;

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["claude".to_string(), "codex".to_string()]);
    }

    #[tokio::test]
    async fn panicking_callback_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir, 5);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let map = counting_map(&["claude"], Duration::from_millis(1), &in_flight, &peak);

        let callback: ProgressCallback = Arc::new(|_: &FetchOutcome| panic!("renderer bug"));
        let outcomes = fetch_all_providers(ctx, map, true, Some(callback), None).await;

        assert!(outcomes["claude"].success);
    }

    #[tokio::test]
    async fn cancellation_reports_cancelled_outcomes() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir, 5);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        // Slow enough that cancellation lands first.
        let map = counting_map(
            &["claude", "codex"],
            Duration::from_secs(30),
            &in_flight,
            &peak,
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(fetch_all_providers(ctx, map, true, None, Some(rx)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let outcomes = handle.await.unwrap();
        assert_eq!(outcomes.len(), 2);
        for outcome in outcomes.values() {
            assert!(!outcome.success);
            assert_eq!(outcome.error.as_deref(), Some("cancelled"));
        }
    }

    #[tokio::test]
    async fn enabled_filter_skips_disabled_providers() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::rooted(
            dir.path().join("cfg"),
            dir.path().join("cache"),
            dir.path().join("state"),
        );
        let mut config = Config::default();
        config.enabled_providers = vec!["claude".to_string()];
        let ctx = Arc::new(FetchContext::new(config, CacheStore::new(&paths)));

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let map = counting_map(
            &["claude", "codex"],
            Duration::from_millis(1),
            &in_flight,
            &peak,
        );

        let outcomes = fetch_enabled_providers(ctx, map, true, None, None).await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes.contains_key("claude"));
    }

    #[tokio::test]
    async fn single_provider_invokes_callback() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir, 5);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let strategy: Box<dyn FetchStrategy> = Box::new(CountingStrategy {
            provider: "claude".to_string(),
            delay: Duration::from_millis(1),
            in_flight,
            peak,
        });
        let strategies = vec![strategy];

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |_: &FetchOutcome| {
            seen_cb.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = fetch_single_provider(&ctx, "claude", &strategies, Some(callback)).await;

        assert!(outcome.success);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
