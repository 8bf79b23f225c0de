//! Snapshot, org-id, and gate caches.
//!
//! Three keyspaces, all keyed by provider id:
//! - `snapshots/<id>.msgpack`: binary-encoded [`UsageSnapshot`]
//! - `org-ids/<id>.txt`: opaque tenant id, plain text
//! - `gates/<id>.msgpack`: serialized failure-gate state
//!
//! Decode errors on any read are treated as cache misses, never as fatal.
//! Writes create parent directories and go through a temp-file rename so a
//! concurrent reader never observes a torn file.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::models::UsageSnapshot;
use crate::error::Result;
use crate::storage::paths::AppPaths;

/// File extension for binary-encoded cache entries.
pub const BINARY_EXT: &str = "msgpack";

/// Disk-backed cache for snapshots, org ids, and gate state.
#[derive(Debug, Clone)]
pub struct CacheStore {
    snapshots_dir: PathBuf,
    org_ids_dir: PathBuf,
    gates_dir: PathBuf,
}

impl CacheStore {
    /// Create a cache store from application paths.
    #[must_use]
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            snapshots_dir: paths.snapshots_dir(),
            org_ids_dir: paths.org_ids_dir(),
            gates_dir: paths.gates_dir(),
        }
    }

    /// Path of a provider's cached snapshot.
    #[must_use]
    pub fn snapshot_path(&self, provider_id: &str) -> PathBuf {
        self.snapshots_dir
            .join(format!("{provider_id}.{BINARY_EXT}"))
    }

    /// Path of a provider's cached org id.
    #[must_use]
    pub fn org_id_path(&self, provider_id: &str) -> PathBuf {
        self.org_ids_dir.join(format!("{provider_id}.txt"))
    }

    /// Path of a provider's gate state.
    #[must_use]
    pub fn gate_path(&self, provider_id: &str) -> PathBuf {
        self.gates_dir.join(format!("{provider_id}.{BINARY_EXT}"))
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Persist a snapshot; called on every pipeline success.
    pub fn save_snapshot(&self, snapshot: &UsageSnapshot) -> Result<()> {
        self.write_binary(&self.snapshot_path(&snapshot.provider), snapshot)
    }

    /// Load a provider's cached snapshot, whatever its age.
    #[must_use]
    pub fn load_snapshot(&self, provider_id: &str) -> Option<UsageSnapshot> {
        self.read_binary(&self.snapshot_path(provider_id))
    }

    /// Load a provider's cached snapshot only if it is younger than
    /// `max_age`.
    #[must_use]
    pub fn load_snapshot_if_fresh(
        &self,
        provider_id: &str,
        max_age: Duration,
    ) -> Option<UsageSnapshot> {
        let snapshot = self.load_snapshot(provider_id)?;
        if snapshot.is_stale(max_age) {
            tracing::debug!(provider = provider_id, "cached snapshot too old");
            None
        } else {
            Some(snapshot)
        }
    }

    /// Remove a provider's cached snapshot. Returns whether one existed.
    pub fn clear_snapshot(&self, provider_id: &str) -> Result<bool> {
        remove_if_present(&self.snapshot_path(provider_id))
    }

    // =========================================================================
    // Org ids
    // =========================================================================

    /// Persist a provider's tenant id.
    pub fn save_org_id(&self, provider_id: &str, org_id: &str) -> Result<()> {
        let path = self.org_id_path(provider_id);
        write_atomic(&path, org_id.as_bytes())
    }

    /// Load a provider's tenant id.
    #[must_use]
    pub fn load_org_id(&self, provider_id: &str) -> Option<String> {
        let content = std::fs::read_to_string(self.org_id_path(provider_id)).ok()?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Forget a provider's tenant id (strategies call this on auth failure).
    pub fn clear_org_id(&self, provider_id: &str) -> Result<bool> {
        remove_if_present(&self.org_id_path(provider_id))
    }

    // =========================================================================
    // Gate state
    // =========================================================================

    /// Persist serialized gate state.
    pub fn save_gate_state<T: Serialize>(&self, provider_id: &str, state: &T) -> Result<()> {
        self.write_binary(&self.gate_path(provider_id), state)
    }

    /// Load serialized gate state.
    #[must_use]
    pub fn load_gate_state<T: DeserializeOwned>(&self, provider_id: &str) -> Option<T> {
        self.read_binary(&self.gate_path(provider_id))
    }

    /// Remove a provider's gate state. Returns whether one existed.
    pub fn clear_gate_state(&self, provider_id: &str) -> Result<bool> {
        remove_if_present(&self.gate_path(provider_id))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn write_binary<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(value)
            .map_err(|e| crate::error::UsageError::Config(format!("cache encode failed: {e}")))?;
        write_atomic(path, &bytes)
    }

    fn read_binary<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let bytes = std::fs::read(path).ok()?;
        match rmp_serde::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(?path, error = %e, "cache decode failed, treating as miss");
                None
            }
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(path)?;
    Ok(true)
}
