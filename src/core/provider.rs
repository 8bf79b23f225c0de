//! Provider descriptors and registry.
//!
//! Defines the supported providers and the metadata the credential store and
//! strategies need: API-key environment variables and well-known foreign-CLI
//! credential locations. Provider metadata references providers by id string
//! everywhere else in the crate.

use serde::{Deserialize, Serialize};

use crate::error::{Result, UsageError};

/// Supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    Codex,
    Gemini,
    Copilot,
    Cursor,
}

impl Provider {
    /// All providers in display order.
    pub const ALL: &'static [Self] = &[
        Self::Claude,
        Self::Codex,
        Self::Gemini,
        Self::Copilot,
        Self::Cursor,
    ];

    /// Stable id used in config keys, cache filenames, and CLI arguments.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
            Self::Copilot => "copilot",
            Self::Cursor => "cursor",
        }
    }

    /// Display name for human output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::Codex => "Codex",
            Self::Gemini => "Gemini",
            Self::Copilot => "Copilot",
            Self::Cursor => "Cursor",
        }
    }

    /// Parse from an id string.
    pub fn from_id(name: &str) -> Result<Self> {
        let lower = name.to_lowercase();
        Self::ALL
            .iter()
            .find(|p| p.id() == lower)
            .copied()
            .ok_or_else(|| UsageError::InvalidProvider(name.to_string()))
    }

    /// Environment variable holding an API key for this provider.
    #[must_use]
    pub const fn api_key_env_var(self) -> &'static str {
        match self {
            Self::Claude => "ANTHROPIC_API_KEY",
            Self::Codex => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::Copilot => "GITHUB_TOKEN",
            Self::Cursor => "CURSOR_API_KEY",
        }
    }

    /// Well-known credential files written by the provider's own CLI,
    /// relative to the home directory. Consulted only when
    /// `credentials.reuse_provider_credentials` is enabled.
    #[must_use]
    pub const fn foreign_credential_paths(self) -> &'static [&'static str] {
        match self {
            Self::Claude => &[".claude/.credentials.json"],
            Self::Codex => &[".codex/auth.json"],
            Self::Gemini => &[".gemini/oauth_creds.json"],
            Self::Copilot => &[".config/github-copilot/hosts.json"],
            Self::Cursor => &[".cursor/mcp-state.json"],
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
