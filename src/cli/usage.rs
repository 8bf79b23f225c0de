//! The `usage` command: resolve configuration, orchestrate fetches, render,
//! and map the outcome set to an exit code.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use super::args::UsageArgs;
use crate::core::aggregate::aggregate_outcomes;
use crate::core::orchestrator::{
    ProgressCallback, fetch_enabled_providers, fetch_single_provider,
};
use crate::core::pipeline::{FetchContext, execute_fetch_pipeline};
use crate::core::provider::Provider;
use crate::core::strategy::FetchOutcome;
use crate::error::{ErrorCategory, ExitCode, Result, UsageError};
use crate::providers::build_strategy_map;
use crate::render::{DisplayOptions, render_usage, render_usage_json};
use crate::storage::{AppPaths, CacheStore, Config, CredentialStore};

/// Run the usage command. Returns the process exit code.
pub async fn execute(args: &UsageArgs, json: bool, pretty: bool, color: bool) -> Result<ExitCode> {
    let paths = AppPaths::new();
    paths.ensure_dirs()?;

    let mut config = Config::load_from(&paths.config_file())?;
    if let Some(timeout) = args.timeout {
        config.fetch.timeout = timeout;
        config.validate()?;
    }

    let store = CredentialStore::new(paths.credentials_dir())
        .with_keyring(config.credentials.use_keyring);
    let cache = CacheStore::new(&paths);
    let display = DisplayOptions {
        color,
        display: config.display.clone(),
    };

    // Ctrl-C flips the cancellation signal; the orchestrator reports the
    // interrupted providers as cancelled.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let progress: Option<ProgressCallback> = if json {
        None
    } else {
        Some(Arc::new(|outcome: &FetchOutcome| {
            let state = if outcome.gated && !outcome.success {
                "gated"
            } else if outcome.cached {
                "cached"
            } else if outcome.success {
                "ok"
            } else {
                "failed"
            };
            eprintln!("  {} {}", outcome.provider_id, state);
        }))
    };

    let outcomes = if let Some(name) = &args.provider {
        let provider = Provider::from_id(name)?;
        let config_for_map = config.clone();
        let ctx = FetchContext::new(config, cache.clone());
        let map = build_strategy_map(&[provider], &config_for_map, &store, &cache);
        let (provider_id, strategies) = map.into_iter().next().unwrap_or_default();
        let outcome = if args.no_cache {
            execute_fetch_pipeline(&ctx, &provider_id, &strategies, false).await
        } else {
            fetch_single_provider(&ctx, &provider_id, &strategies, progress).await
        };
        HashMap::from([(provider_id, outcome)])
    } else {
        let map = build_strategy_map(Provider::ALL, &config, &store, &cache);
        let ctx = Arc::new(FetchContext::new(config, cache));
        fetch_enabled_providers(ctx, map, !args.no_cache, progress, Some(cancel_rx)).await
    };

    if json {
        println!("{}", render_usage_json(&outcomes, pretty));
    } else {
        print!("{}", render_usage(&outcomes, &display));
    }

    Ok(exit_code_for(&outcomes))
}

/// Exit 0 iff every enabled provider produced a snapshot (live or cached),
/// 5 when some did, and a category-specific code when nothing did.
fn exit_code_for(outcomes: &HashMap<String, FetchOutcome>) -> ExitCode {
    let aggregation = aggregate_outcomes(outcomes);

    if aggregation.failed_providers().is_empty() {
        return ExitCode::Success;
    }
    if aggregation.has_any_data() {
        return ExitCode::PartialFailure;
    }

    // Everything failed: with a single provider, surface its classification.
    if outcomes.len() == 1 {
        if let Some(outcome) = outcomes.values().next() {
            return match outcome.error_category {
                Some(ErrorCategory::Authentication) => ExitCode::AuthError,
                Some(ErrorCategory::Network) => ExitCode::NetworkError,
                Some(ErrorCategory::Configuration) => ExitCode::ConfigError,
                _ => ExitCode::GeneralError,
            };
        }
    }
    ExitCode::GeneralError
}

/// Surface a single-provider failure as a typed error for direct reporting.
#[must_use]
pub fn outcome_as_error(outcome: &FetchOutcome) -> Option<UsageError> {
    if outcome.success {
        return None;
    }
    let message = outcome.error.clone().unwrap_or_default();
    Some(match outcome.error_category {
        Some(ErrorCategory::Authentication) => UsageError::AuthInvalid {
            provider: outcome.provider_id.clone(),
            reason: message,
        },
        Some(ErrorCategory::Network) => UsageError::Network(message),
        Some(ErrorCategory::Configuration) => UsageError::Config(message),
        _ => UsageError::NoAvailableStrategy(outcome.provider_id.clone()),
    })
}
