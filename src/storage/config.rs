//! Configuration file loading and management.
//!
//! Loads `config.toml` from the config root (see [`super::paths`]).
//! Missing file means defaults; an invalid file is an error.
//!
//! ## Environment Variables
//!
//! - `VIBEUSAGE_ENABLED_PROVIDERS`: comma-separated provider list, overrides
//!   `enabled_providers`
//! - `VIBEUSAGE_NO_COLOR` / `NO_COLOR`: force `display.pace_colors` off

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::provider::Provider;
use crate::error::{Result, UsageError};

/// Environment variable overriding the enabled provider list.
pub const ENV_ENABLED_PROVIDERS: &str = "VIBEUSAGE_ENABLED_PROVIDERS";
/// Environment variable disabling colored output.
pub const ENV_NO_COLOR: &str = "VIBEUSAGE_NO_COLOR";
/// Standard environment variable disabling colored output.
pub const ENV_NO_COLOR_STD: &str = "NO_COLOR";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default orchestrator concurrency limit.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;
/// Default cache-freshness threshold in minutes.
pub const DEFAULT_STALE_THRESHOLD_MINUTES: u64 = 60;

// =============================================================================
// Sections
// =============================================================================

/// Renderer hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub show_remaining: bool,
    pub pace_colors: bool,
    pub reset_format: ResetFormat,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_remaining: true,
            pace_colors: true,
            reset_format: ResetFormat::Countdown,
        }
    }
}

/// How reset times are shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetFormat {
    #[default]
    Countdown,
    Absolute,
}

/// Fetch behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// Orchestrator concurrency limit.
    pub max_concurrent: usize,
    /// How old a cached snapshot may be and still substitute for a live fetch.
    pub stale_threshold_minutes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_SECS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            stale_threshold_minutes: DEFAULT_STALE_THRESHOLD_MINUTES,
        }
    }
}

impl FetchConfig {
    /// Per-request timeout as a `Duration`.
    #[must_use]
    pub const fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Cache-freshness threshold as a `chrono::Duration`.
    #[must_use]
    pub fn stale_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.stale_threshold_minutes as i64)
    }
}

/// Credential management settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Prefer the OS secret store for credential bodies.
    pub use_keyring: bool,
    /// Allow discovery of credentials written by provider CLIs.
    pub reuse_provider_credentials: bool,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            use_keyring: false,
            reuse_provider_credentials: true,
        }
    }
}

/// Which strategy family a provider is forced to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthSource {
    #[default]
    Auto,
    Oauth,
    Web,
    Cli,
    Apikey,
    Manual,
}

/// Configuration for a specific provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub auth_source: AuthSource,
    pub enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            auth_source: AuthSource::Auto,
            enabled: true,
        }
    }
}

// =============================================================================
// Main Config
// =============================================================================

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// If empty, all registered providers are eligible.
    pub enabled_providers: Vec<String>,
    pub display: DisplayConfig,
    pub fetch: FetchConfig,
    pub credentials: CredentialsConfig,
    pub providers: HashMap<String, ProviderConfig>,
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// Returns defaults (plus env overrides) if the file doesn't exist;
    /// errors only when the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            tracing::debug!(?path, "loading config file");
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| UsageError::Config(format!("invalid config file: {e}")))?
        } else {
            tracing::debug!(?path, "config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| UsageError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply `VIBEUSAGE_*` environment overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(providers) = std::env::var(ENV_ENABLED_PROVIDERS) {
            self.enabled_providers = providers
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if std::env::var(ENV_NO_COLOR).is_ok() || std::env::var(ENV_NO_COLOR_STD).is_ok() {
            self.display.pace_colors = false;
        }
    }

    /// Config for a provider, defaulted when absent.
    #[must_use]
    pub fn provider_config(&self, provider_id: &str) -> ProviderConfig {
        self.providers
            .get(provider_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a provider is enabled.
    ///
    /// Enabled means not disabled per-provider, and either listed in
    /// `enabled_providers` or that list is empty.
    #[must_use]
    pub fn is_provider_enabled(&self, provider_id: &str) -> bool {
        if !self.provider_config(provider_id).enabled {
            return false;
        }
        self.enabled_providers.is_empty()
            || self.enabled_providers.iter().any(|p| p == provider_id)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        for name in &self.enabled_providers {
            Provider::from_id(name).map_err(|_| {
                UsageError::Config(format!("unknown provider \"{name}\" in enabled_providers"))
            })?;
        }
        if self.fetch.timeout == 0 || self.fetch.timeout > 300 {
            return Err(UsageError::Config(
                "fetch.timeout must be between 1 and 300 seconds".to_string(),
            ));
        }
        if self.fetch.max_concurrent == 0 {
            return Err(UsageError::Config(
                "fetch.max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
