//! Provider fetch strategies.
//!
//! Each provider contributes an ordered list of [`FetchStrategy`]
//! implementations. Strategies are independent siblings: they own their
//! credential formats and wire parsing, and the core sees only the trait.

pub mod claude;
pub mod codex;
pub mod copilot;
pub mod cursor;
pub mod gemini;

use chrono::{DateTime, Utc};

use crate::core::orchestrator::StrategyMap;
use crate::core::provider::Provider;
use crate::core::strategy::FetchStrategy;
use crate::storage::config::AuthSource;
use crate::storage::{CacheStore, Config, CredentialStore};

/// Build the ordered strategies for one provider, honoring the provider's
/// `auth_source` override.
#[must_use]
pub fn strategies_for(
    provider: Provider,
    config: &Config,
    store: &CredentialStore,
    cache: &CacheStore,
) -> Vec<Box<dyn FetchStrategy>> {
    let source = config.provider_config(provider.id()).auth_source;

    let mut strategies: Vec<(AuthSource, Box<dyn FetchStrategy>)> = match provider {
        Provider::Claude => vec![
            (
                AuthSource::Oauth,
                Box::new(claude::ClaudeOauthStrategy::new(store.clone())),
            ),
            (
                AuthSource::Web,
                Box::new(claude::ClaudeWebStrategy::new(store.clone(), cache.clone())),
            ),
        ],
        Provider::Codex => vec![(
            AuthSource::Oauth,
            Box::new(codex::CodexOauthStrategy::new(store.clone())),
        )],
        Provider::Gemini => vec![(
            AuthSource::Oauth,
            Box::new(gemini::GeminiOauthStrategy::new(store.clone())),
        )],
        Provider::Copilot => vec![(
            AuthSource::Cli,
            Box::new(copilot::CopilotTokenStrategy::new(store.clone())),
        )],
        Provider::Cursor => vec![(
            AuthSource::Web,
            Box::new(cursor::CursorWebStrategy::new(store.clone())),
        )],
    };

    // `auto` and `manual` run the full ladder; anything else pins a family.
    if !matches!(source, AuthSource::Auto | AuthSource::Manual) {
        strategies.retain(|(family, _)| *family == source);
    }

    strategies.into_iter().map(|(_, s)| s).collect()
}

/// Build the `provider -> strategies` assignment for an invocation.
#[must_use]
pub fn build_strategy_map(
    providers: &[Provider],
    config: &Config,
    store: &CredentialStore,
    cache: &CacheStore,
) -> StrategyMap {
    providers
        .iter()
        .map(|provider| {
            (
                provider.id().to_string(),
                strategies_for(*provider, config, store, cache),
            )
        })
        .collect()
}

// =============================================================================
// Shared parsing helpers
// =============================================================================

/// Parse an RFC 3339 timestamp, tolerating a trailing `Z`.
#[must_use]
pub(crate) fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// used/limit as a clamped 0-100 percentage; zero limit reads as 0.
#[must_use]
pub(crate) fn percent(used: f64, limit: f64) -> u8 {
    if limit <= 0.0 {
        return 0;
    }
    let pct = (used / limit * 100.0).floor();
    if pct <= 0.0 {
        0
    } else if pct >= 100.0 {
        100
    } else {
        pct as u8
    }
}
