//! Credential file management.
//!
//! Credential blobs live under `<config>/credentials/<provider>/<kind>.json`,
//! written atomically with owner-only permissions. Reads refuse files that
//! group or world can touch. Discovery searches the package's own store
//! first, then (when `credentials.reuse_provider_credentials` is on) the
//! provider CLI's well-known files, then the provider's API-key environment
//! variable.
//!
//! When `credentials.use_keyring` is enabled, credential bodies prefer the OS
//! secret store; the filesystem remains the fallback.

use std::path::{Path, PathBuf};

use crate::core::provider::Provider;
use crate::error::{Result, UsageError};
use crate::storage::config::CredentialsConfig;

/// Keyring service name for vibeusage secrets.
const KEYRING_SERVICE: &str = "vibeusage";

/// Kinds of credential files a provider may own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    OAuth,
    Session,
    ApiKey,
}

impl CredentialKind {
    /// All kinds, in discovery order.
    pub const ALL: &'static [Self] = &[Self::OAuth, Self::Session, Self::ApiKey];

    /// File stem for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OAuth => "oauth",
            Self::Session => "session",
            Self::ApiKey => "apikey",
        }
    }
}

/// Where a discovered credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// The package's own credential store.
    Store,
    /// A third-party CLI's credential file.
    ForeignCli,
    /// An environment variable.
    Environment,
}

impl CredentialSource {
    /// Stable name for display and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Store => "vibeusage-store",
            Self::ForeignCli => "foreign-cli",
            Self::Environment => "environment",
        }
    }
}

/// Result of credential discovery.
#[derive(Debug, Clone)]
pub struct CredentialHit {
    pub source: CredentialSource,
    /// Absent for environment hits.
    pub path: Option<PathBuf>,
}

/// Filesystem-backed credential store, optionally fronted by the OS secret
/// store for the bodies of its own credentials.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    credentials_dir: PathBuf,
    home: PathBuf,
    use_keyring: bool,
}

impl CredentialStore {
    /// Create a store over the given credentials directory, discovering
    /// foreign credentials relative to the user's home.
    #[must_use]
    pub fn new(credentials_dir: PathBuf) -> Self {
        let home = directories::BaseDirs::new()
            .map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf());
        Self {
            credentials_dir,
            home,
            use_keyring: false,
        }
    }

    /// Create a store with an explicit home directory (used by tests).
    #[must_use]
    pub const fn with_home(credentials_dir: PathBuf, home: PathBuf) -> Self {
        Self {
            credentials_dir,
            home,
            use_keyring: false,
        }
    }

    /// Prefer the OS secret store for credential bodies
    /// (`credentials.use_keyring`).
    #[must_use]
    pub const fn with_keyring(mut self, enabled: bool) -> Self {
        self.use_keyring = enabled;
        self
    }

    /// Deterministic path for a provider's credential file.
    #[must_use]
    pub fn credential_path(&self, provider: Provider, kind: CredentialKind) -> PathBuf {
        self.credentials_dir
            .join(provider.id())
            .join(format!("{}.json", kind.as_str()))
    }

    /// Absolute paths of the provider CLI's well-known credential files.
    #[must_use]
    pub fn foreign_paths(&self, provider: Provider) -> Vec<PathBuf> {
        provider
            .foreign_credential_paths()
            .iter()
            .map(|rel| self.home.join(rel))
            .collect()
    }

    /// Write a credential blob: temp file, owner-only permissions, atomic
    /// rename over the destination.
    pub fn write(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| map_write_error(&e, parent))?;
        }

        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, content).map_err(|e| map_write_error(&e, &tmp_path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&tmp_path, perms)
                .map_err(|e| map_write_error(&e, &tmp_path))?;
        }

        std::fs::rename(&tmp_path, path).map_err(|e| map_write_error(&e, path))?;
        Ok(())
    }

    /// Read a credential blob.
    ///
    /// Returns `None` if the file is absent, or if group or world holds any
    /// read/write bit on it (the file is treated as untrusted).
    #[must_use]
    pub fn read(&self, path: &Path) -> Option<Vec<u8>> {
        if !path.exists() {
            return None;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = path.metadata().ok()?.permissions().mode();
            if mode & 0o066 != 0 {
                tracing::warn!(
                    ?path,
                    mode = %format!("{mode:o}"),
                    "credential file permissions too open, ignoring"
                );
                return None;
            }
        }

        std::fs::read(path).ok()
    }

    /// Delete a credential file. Returns whether anything was removed.
    pub fn delete(&self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        Ok(true)
    }

    /// Discover a credential for a provider.
    ///
    /// Search order: own store, foreign CLI files (only when
    /// `reuse_provider_credentials`), the provider's API-key env var.
    #[must_use]
    pub fn find(&self, provider: Provider, config: &CredentialsConfig) -> Option<CredentialHit> {
        for kind in CredentialKind::ALL {
            let path = self.credential_path(provider, *kind);
            if path.exists() {
                return Some(CredentialHit {
                    source: CredentialSource::Store,
                    path: Some(path),
                });
            }
        }

        if config.reuse_provider_credentials {
            for rel in provider.foreign_credential_paths() {
                let path = self.home.join(rel);
                if path.exists() {
                    return Some(CredentialHit {
                        source: CredentialSource::ForeignCli,
                        path: Some(path),
                    });
                }
            }
        }

        if std::env::var(provider.api_key_env_var()).is_ok_and(|v| !v.is_empty()) {
            return Some(CredentialHit {
                source: CredentialSource::Environment,
                path: None,
            });
        }

        None
    }

    /// Read one of the package's own credentials, preferring the keyring
    /// when enabled.
    #[must_use]
    pub fn read_own(&self, provider: Provider, kind: CredentialKind) -> Option<Vec<u8>> {
        if self.use_keyring {
            if let Some(body) = Self::keyring_read(provider, kind) {
                return Some(body);
            }
        }
        self.read(&self.credential_path(provider, kind))
    }

    /// Write one of the package's own credentials. With the keyring enabled
    /// the body goes to the secret store; the file is the fallback.
    pub fn write_own(
        &self,
        provider: Provider,
        kind: CredentialKind,
        content: &[u8],
    ) -> Result<()> {
        if self.use_keyring {
            if let Ok(body) = std::str::from_utf8(content) {
                match Self::keyring_write(provider, kind, body) {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        tracing::debug!(error = %e, "keyring write failed, falling back to file");
                    }
                }
            }
        }
        self.write(&self.credential_path(provider, kind), content)
    }

    /// Read a credential body from the OS secret store.
    #[must_use]
    pub fn keyring_read(provider: Provider, kind: CredentialKind) -> Option<Vec<u8>> {
        let entry =
            keyring::Entry::new(KEYRING_SERVICE, &keyring_key(provider, kind)).ok()?;
        entry.get_password().ok().map(String::into_bytes)
    }

    /// Write a credential body to the OS secret store.
    pub fn keyring_write(
        provider: Provider,
        kind: CredentialKind,
        content: &str,
    ) -> Result<()> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_key(provider, kind))
            .map_err(|e| UsageError::Config(format!("keyring unavailable: {e}")))?;
        entry
            .set_password(content)
            .map_err(|e| UsageError::Config(format!("keyring write failed: {e}")))
    }
}

fn keyring_key(provider: Provider, kind: CredentialKind) -> String {
    format!("{}-{}", provider.id(), kind.as_str())
}

/// Permission errors on write are fatal configuration errors.
fn map_write_error(err: &std::io::Error, path: &Path) -> UsageError {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        UsageError::PermissionDenied {
            path: path.display().to_string(),
        }
    } else {
        UsageError::Config(format!("failed to write {}: {err}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CredentialStore {
        CredentialStore::with_home(dir.path().join("credentials"), dir.path().join("home"))
    }

    #[test]
    fn credential_path_layout() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let path = store.credential_path(Provider::Claude, CredentialKind::OAuth);
        assert!(path.ends_with("credentials/claude/oauth.json"));
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let path = store.credential_path(Provider::Claude, CredentialKind::OAuth);

        store.write(&path, b"{\"access_token\":\"tok\"}").unwrap();
        let content = store.read(&path).unwrap();
        assert_eq!(content, b"{\"access_token\":\"tok\"}");
    }

    #[cfg(unix)]
    #[test]
    fn write_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let path = store.credential_path(Provider::Codex, CredentialKind::Session);
        store.write(&path, b"secret").unwrap();

        let mode = path.metadata().unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn read_refuses_group_readable_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let path = store.credential_path(Provider::Claude, CredentialKind::ApiKey);
        store.write(&path, b"secret").unwrap();

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();
        assert!(store.read(&path).is_none());
    }

    #[test]
    fn read_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let path = store.credential_path(Provider::Gemini, CredentialKind::OAuth);
        assert!(store.read(&path).is_none());
    }

    #[test]
    fn delete_reports_presence() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let path = store.credential_path(Provider::Cursor, CredentialKind::Session);

        assert!(!store.delete(&path).unwrap());
        store.write(&path, b"x").unwrap();
        assert!(store.delete(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn find_prefers_own_store() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let config = CredentialsConfig::default();

        // Seed both an own-store credential and a foreign one.
        let own = store.credential_path(Provider::Claude, CredentialKind::OAuth);
        store.write(&own, b"{}").unwrap();
        let foreign = dir.path().join("home/.claude/.credentials.json");
        std::fs::create_dir_all(foreign.parent().unwrap()).unwrap();
        std::fs::write(&foreign, b"{}").unwrap();

        let hit = store.find(Provider::Claude, &config).unwrap();
        assert_eq!(hit.source, CredentialSource::Store);
        assert_eq!(hit.path.unwrap(), own);
    }

    #[test]
    fn find_falls_back_to_foreign_cli() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let config = CredentialsConfig::default();

        let foreign = dir.path().join("home/.codex/auth.json");
        std::fs::create_dir_all(foreign.parent().unwrap()).unwrap();
        std::fs::write(&foreign, b"{}").unwrap();

        let hit = store.find(Provider::Codex, &config).unwrap();
        assert_eq!(hit.source, CredentialSource::ForeignCli);
        assert_eq!(hit.path.unwrap(), foreign);
    }

    #[test]
    fn find_skips_foreign_cli_when_reuse_disabled() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let config = CredentialsConfig {
            reuse_provider_credentials: false,
            ..CredentialsConfig::default()
        };

        let foreign = dir.path().join("home/.codex/auth.json");
        std::fs::create_dir_all(foreign.parent().unwrap()).unwrap();
        std::fs::write(&foreign, b"{}").unwrap();

        assert!(store.find(Provider::Codex, &config).is_none());
    }

    #[test]
    fn source_names_are_stable() {
        assert_eq!(CredentialSource::Store.as_str(), "vibeusage-store");
        assert_eq!(CredentialSource::ForeignCli.as_str(), "foreign-cli");
        assert_eq!(CredentialSource::Environment.as_str(), "environment");
    }
}
