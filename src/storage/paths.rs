//! Application paths for config, cache, and state.
//!
//! Layout:
//!
//! ```text
//! <config>/config.toml
//! <config>/credentials/<provider>/{oauth,session,apikey}.json
//! <cache>/snapshots/<provider>.msgpack
//! <cache>/org-ids/<provider>.txt
//! <state>/gates/<provider>.msgpack
//! ```
//!
//! Each root can be overridden through `VIBEUSAGE_CONFIG_DIR`,
//! `VIBEUSAGE_CACHE_DIR`, and `VIBEUSAGE_STATE_DIR`.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config root.
pub const ENV_CONFIG_DIR: &str = "VIBEUSAGE_CONFIG_DIR";
/// Environment variable overriding the cache root.
pub const ENV_CACHE_DIR: &str = "VIBEUSAGE_CACHE_DIR";
/// Environment variable overriding the state root.
pub const ENV_STATE_DIR: &str = "VIBEUSAGE_STATE_DIR";

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Cache directory.
    pub cache: PathBuf,
    /// State directory for runtime data (failure gates).
    pub state: PathBuf,
}

fn env_override(var: &str) -> Option<PathBuf> {
    std::env::var(var).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

impl AppPaths {
    /// Create paths for the vibeusage application, honoring env overrides.
    #[must_use]
    pub fn new() -> Self {
        let base = ProjectDirs::from("dev", "vibeusage", "vibeusage").map_or_else(
            || {
                let home = directories::BaseDirs::new()
                    .map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf());
                Self {
                    config: home.join(".config/vibeusage"),
                    cache: home.join(".cache/vibeusage"),
                    state: home.join(".local/state/vibeusage"),
                }
            },
            |dirs| Self {
                config: dirs.config_dir().to_path_buf(),
                cache: dirs.cache_dir().to_path_buf(),
                state: dirs
                    .state_dir()
                    .map_or_else(|| dirs.data_dir().to_path_buf(), Path::to_path_buf),
            },
        );

        Self {
            config: env_override(ENV_CONFIG_DIR).unwrap_or(base.config),
            cache: env_override(ENV_CACHE_DIR).unwrap_or(base.cache),
            state: env_override(ENV_STATE_DIR).unwrap_or(base.state),
        }
    }

    /// Create paths rooted in explicit directories (used by tests).
    #[must_use]
    pub fn rooted(config: PathBuf, cache: PathBuf, state: PathBuf) -> Self {
        Self {
            config,
            cache,
            state,
        }
    }

    /// Path to the main config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Credentials subdirectory.
    #[must_use]
    pub fn credentials_dir(&self) -> PathBuf {
        self.config.join("credentials")
    }

    /// Cached snapshots directory.
    #[must_use]
    pub fn snapshots_dir(&self) -> PathBuf {
        self.cache.join("snapshots")
    }

    /// Cached org ids directory.
    #[must_use]
    pub fn org_ids_dir(&self) -> PathBuf {
        self.cache.join("org-ids")
    }

    /// Failure gate state directory.
    #[must_use]
    pub fn gates_dir(&self) -> PathBuf {
        self.state.join("gates")
    }

    /// Ensure all directories exist.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.config,
            &self.cache,
            &self.state,
            &self.credentials_dir(),
            &self.snapshots_dir(),
            &self.org_ids_dir(),
            &self.gates_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
