//! Error types for vibeusage.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are classified along two axes:
//! - **Category**: authentication, authorization, rate_limited, network,
//!   provider, parse, configuration, not_found, unknown
//! - **Severity**: fatal, recoverable, transient, warning
//!
//! HTTP status codes map onto the taxonomy through [`classify_http_status`],
//! which also decides whether a failure is retryable inside the transport,
//! whether the pipeline may fall back to the next strategy, and whether a
//! `Retry-After` header should be honored.

pub mod remedies;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Categories and Severities
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Credentials missing, expired, or rejected (HTTP 401).
    Authentication,
    /// Credentials valid but access denied (HTTP 403).
    Authorization,
    /// Provider throttled the request (HTTP 429).
    RateLimited,
    /// Transport-level failure: timeout, DNS, connection.
    Network,
    /// Provider-side failure (HTTP 5xx, outage).
    Provider,
    /// Response could not be decoded into the expected shape.
    Parse,
    /// Local configuration or filesystem problem.
    Configuration,
    /// Resource missing upstream (HTTP 404).
    NotFound,
    /// Everything else.
    Unknown,
}

impl ErrorCategory {
    /// Stable wire name, matching the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::RateLimited => "rate_limited",
            Self::Network => "network",
            Self::Provider => "provider",
            Self::Parse => "parse",
            Self::Configuration => "configuration",
            Self::NotFound => "not_found",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a classified error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// The whole invocation should stop; nothing will fix itself.
    Fatal,
    /// Won't clear on retry, but another strategy or user action can.
    Recoverable,
    /// Likely to clear on retry.
    Transient,
    /// Informational only.
    Warning,
}

impl ErrorSeverity {
    /// Stable wire name, matching the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Recoverable => "recoverable",
            Self::Transient => "transient",
            Self::Warning => "warning",
        }
    }
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// HTTP Status Classification
// =============================================================================

/// Classification of one HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpErrorMapping {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    /// Whether the transport may retry the request.
    pub should_retry: bool,
    /// Whether the pipeline may fall back to the next strategy.
    pub should_fallback: bool,
    /// Whether a `Retry-After` header should override the computed backoff.
    pub retry_after_header: bool,
}

/// Classify an HTTP status code.
///
/// Unknown 4xx codes are treated as recoverable unknowns, unknown 5xx codes
/// as transient provider failures.
#[must_use]
pub const fn classify_http_status(status: u16) -> HttpErrorMapping {
    match status {
        401 => HttpErrorMapping {
            category: ErrorCategory::Authentication,
            severity: ErrorSeverity::Recoverable,
            should_retry: false,
            should_fallback: true,
            retry_after_header: false,
        },
        403 => HttpErrorMapping {
            category: ErrorCategory::Authorization,
            severity: ErrorSeverity::Recoverable,
            should_retry: false,
            should_fallback: true,
            retry_after_header: false,
        },
        404 => HttpErrorMapping {
            category: ErrorCategory::NotFound,
            severity: ErrorSeverity::Recoverable,
            should_retry: false,
            should_fallback: true,
            retry_after_header: false,
        },
        429 => HttpErrorMapping {
            category: ErrorCategory::RateLimited,
            severity: ErrorSeverity::Transient,
            should_retry: true,
            should_fallback: false,
            retry_after_header: true,
        },
        500..=599 => HttpErrorMapping {
            category: ErrorCategory::Provider,
            severity: ErrorSeverity::Transient,
            should_retry: true,
            should_fallback: true,
            retry_after_header: false,
        },
        _ => HttpErrorMapping {
            category: ErrorCategory::Unknown,
            severity: ErrorSeverity::Recoverable,
            should_retry: false,
            should_fallback: true,
            retry_after_header: false,
        },
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes consumed by the CLI wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// All enabled providers returned a snapshot (live or cached).
    Success = 0,
    /// Unexpected failure.
    GeneralError = 1,
    /// Fatal authentication error.
    AuthError = 2,
    /// Network failure.
    NetworkError = 3,
    /// Configuration problem.
    ConfigError = 4,
    /// Some providers succeeded, some failed.
    PartialFailure = 5,
}

impl From<ExitCode> for u8 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

// =============================================================================
// Main Error Type
// =============================================================================

/// Main error type for vibeusage operations.
#[derive(Error, Debug)]
pub enum UsageError {
    // ==========================================================================
    // Authentication / authorization
    // ==========================================================================
    /// Credentials have expired and could not be refreshed.
    #[error("authentication expired for {provider}")]
    AuthExpired { provider: String },

    /// No credentials configured for the provider.
    #[error("no credentials configured for {provider}")]
    AuthNotConfigured { provider: String },

    /// Credentials were definitively rejected.
    #[error("invalid credentials for {provider}: {reason}")]
    AuthInvalid { provider: String, reason: String },

    /// Access denied despite valid credentials.
    #[error("not authorized for {provider}: {reason}")]
    Forbidden { provider: String, reason: String },

    // ==========================================================================
    // Network
    // ==========================================================================
    /// Request timed out.
    #[error("request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    // ==========================================================================
    // Provider
    // ==========================================================================
    /// Provider throttled the request.
    #[error("rate limited by {provider}: {message}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
        message: String,
    },

    /// Provider returned a non-success HTTP status.
    #[error("HTTP {status} from {provider}: {message}")]
    HttpStatus {
        provider: String,
        status: u16,
        message: String,
    },

    /// Provider is gated by the failure circuit.
    #[error("provider {provider} gated for {}s", .remaining.as_secs())]
    Gated {
        provider: String,
        remaining: Duration,
    },

    /// Every configured strategy failed or was unavailable.
    #[error("no usable fetch strategy for {0}")]
    NoAvailableStrategy(String),

    // ==========================================================================
    // Parse
    // ==========================================================================
    /// Response decoded but did not match the expected shape.
    #[error("failed to parse response: {0}")]
    ParseResponse(String),

    /// A fetched snapshot failed data-model validation.
    #[error("invalid snapshot from {provider}: {problems}")]
    InvalidSnapshot { provider: String, problems: String },

    // ==========================================================================
    // Configuration
    // ==========================================================================
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Expected file missing from the config tree.
    #[error("config file not found: {path}")]
    ConfigNotFound { path: String },

    /// Filesystem permissions prevent an operation.
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// Unknown provider id.
    #[error("invalid provider: {0}")]
    InvalidProvider(String),

    // ==========================================================================
    // Flow control
    // ==========================================================================
    /// The invocation was cancelled (e.g. SIGINT).
    #[error("cancelled")]
    Cancelled,

    /// Some providers succeeded, some failed.
    #[error("partial failure: {failed} provider(s) failed")]
    PartialFailure { failed: usize },

    // ==========================================================================
    // Wrappers
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl UsageError {
    /// Build an error from an HTTP status code, picking the variant the
    /// classification table implies.
    #[must_use]
    pub fn from_status(status: u16, provider: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::AuthExpired {
                provider: provider.to_string(),
            },
            403 => Self::Forbidden {
                provider: provider.to_string(),
                reason: message,
            },
            429 => Self::RateLimited {
                provider: provider.to_string(),
                retry_after: None,
                message,
            },
            _ => Self::HttpStatus {
                provider: provider.to_string(),
                status,
                message,
            },
        }
    }

    /// Classify a transport error from reqwest.
    #[must_use]
    pub fn from_transport(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                seconds: timeout.as_secs(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthExpired { .. } | Self::AuthNotConfigured { .. } | Self::AuthInvalid { .. } => {
                ErrorCategory::Authentication
            }
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::RateLimited { .. } => ErrorCategory::RateLimited,
            Self::Timeout { .. } | Self::Network(_) => ErrorCategory::Network,
            Self::HttpStatus { status, .. } => classify_http_status(*status).category,
            Self::Gated { .. } | Self::NoAvailableStrategy(_) | Self::PartialFailure { .. } => {
                ErrorCategory::Provider
            }
            Self::ParseResponse(_) | Self::InvalidSnapshot { .. } | Self::Json(_) => {
                ErrorCategory::Parse
            }
            Self::Config(_)
            | Self::ConfigNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::InvalidProvider(_)
            | Self::Io(_) => ErrorCategory::Configuration,
            Self::Cancelled | Self::Other(_) => ErrorCategory::Unknown,
        }
    }

    /// Returns the error severity.
    #[must_use]
    pub const fn severity(&self) -> ErrorSeverity {
        match self {
            Self::PermissionDenied { .. } | Self::AuthInvalid { .. } => ErrorSeverity::Fatal,
            Self::Timeout { .. }
            | Self::Network(_)
            | Self::RateLimited { .. }
            | Self::Gated { .. } => ErrorSeverity::Transient,
            Self::HttpStatus { status, .. } => classify_http_status(*status).severity,
            _ => ErrorSeverity::Recoverable,
        }
    }

    /// Returns whether the error is potentially recoverable by retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network(_) | Self::RateLimited { .. } => true,
            Self::HttpStatus { status, .. } => classify_http_status(*status).should_retry,
            _ => false,
        }
    }

    /// Returns the retry-after duration if this error specifies one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the provider name if this error is provider-specific.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::AuthExpired { provider }
            | Self::AuthNotConfigured { provider }
            | Self::AuthInvalid { provider, .. }
            | Self::Forbidden { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::HttpStatus { provider, .. }
            | Self::Gated { provider, .. }
            | Self::InvalidSnapshot { provider, .. } => Some(provider),
            Self::NoAvailableStrategy(p) | Self::InvalidProvider(p) => Some(p),
            _ => None,
        }
    }

    /// Returns a remediation hint, if one is known for this error.
    #[must_use]
    pub fn remediation(&self) -> Option<String> {
        remedies::remediation(self.provider(), self.category())
    }

    /// Map error to a process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::AuthExpired { .. } | Self::AuthNotConfigured { .. } | Self::AuthInvalid { .. } => {
                ExitCode::AuthError
            }
            Self::Timeout { .. } | Self::Network(_) => ExitCode::NetworkError,
            Self::Config(_)
            | Self::ConfigNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::InvalidProvider(_) => ExitCode::ConfigError,
            Self::PartialFailure { .. } => ExitCode::PartialFailure,
            _ => ExitCode::GeneralError,
        }
    }
}

/// Result type alias for vibeusage operations.
pub type Result<T> = std::result::Result<T, UsageError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table_matches_contract() {
        let m = classify_http_status(401);
        assert_eq!(m.category, ErrorCategory::Authentication);
        assert_eq!(m.severity, ErrorSeverity::Recoverable);
        assert!(!m.should_retry);
        assert!(m.should_fallback);
        assert!(!m.retry_after_header);

        let m = classify_http_status(403);
        assert_eq!(m.category, ErrorCategory::Authorization);
        assert!(!m.should_retry);
        assert!(m.should_fallback);

        let m = classify_http_status(404);
        assert_eq!(m.category, ErrorCategory::NotFound);
        assert!(!m.should_retry);

        let m = classify_http_status(429);
        assert_eq!(m.category, ErrorCategory::RateLimited);
        assert_eq!(m.severity, ErrorSeverity::Transient);
        assert!(m.should_retry);
        assert!(!m.should_fallback);
        assert!(m.retry_after_header);

        for status in [500, 502, 503, 504] {
            let m = classify_http_status(status);
            assert_eq!(m.category, ErrorCategory::Provider, "status {status}");
            assert_eq!(m.severity, ErrorSeverity::Transient);
            assert!(m.should_retry);
            assert!(m.should_fallback);
        }
    }

    #[test]
    fn unknown_4xx_is_recoverable_unknown() {
        let m = classify_http_status(418);
        assert_eq!(m.category, ErrorCategory::Unknown);
        assert_eq!(m.severity, ErrorSeverity::Recoverable);
        assert!(!m.should_retry);
        assert!(m.should_fallback);
    }

    #[test]
    fn unknown_5xx_is_transient_provider() {
        let m = classify_http_status(599);
        assert_eq!(m.category, ErrorCategory::Provider);
        assert!(m.should_retry);
    }

    #[test]
    fn from_status_picks_variants() {
        let err = UsageError::from_status(401, "claude", "unauthorized");
        assert!(matches!(err, UsageError::AuthExpired { .. }));
        assert_eq!(err.category(), ErrorCategory::Authentication);

        let err = UsageError::from_status(403, "claude", "forbidden");
        assert_eq!(err.category(), ErrorCategory::Authorization);

        let err = UsageError::from_status(429, "codex", "slow down");
        assert!(err.is_retryable());

        let err = UsageError::from_status(503, "codex", "maintenance");
        assert_eq!(err.category(), ErrorCategory::Provider);
        assert!(err.is_retryable());
    }

    #[test]
    fn retryable_errors() {
        assert!(UsageError::Timeout { seconds: 30 }.is_retryable());
        assert!(UsageError::Network("reset".into()).is_retryable());
        assert!(
            UsageError::RateLimited {
                provider: "claude".into(),
                retry_after: None,
                message: String::new(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn non_retryable_errors() {
        assert!(!UsageError::Config("bad".into()).is_retryable());
        assert!(!UsageError::ParseResponse("bad".into()).is_retryable());
        assert!(
            !UsageError::AuthInvalid {
                provider: "claude".into(),
                reason: "revoked".into(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn permission_denied_is_fatal_configuration() {
        let err = UsageError::PermissionDenied {
            path: "/etc/secret".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.severity(), ErrorSeverity::Fatal);
        assert_eq!(err.exit_code(), ExitCode::ConfigError);
    }

    #[test]
    fn cancelled_is_unknown_category() {
        let err = UsageError::Cancelled;
        assert_eq!(err.category(), ErrorCategory::Unknown);
        assert_eq!(err.to_string(), "cancelled");
    }

    #[test]
    fn exit_codes() {
        assert_eq!(
            UsageError::AuthExpired {
                provider: "claude".into()
            }
            .exit_code(),
            ExitCode::AuthError
        );
        assert_eq!(
            UsageError::Network("down".into()).exit_code(),
            ExitCode::NetworkError
        );
        assert_eq!(
            UsageError::Config("bad".into()).exit_code(),
            ExitCode::ConfigError
        );
        assert_eq!(
            UsageError::PartialFailure { failed: 1 }.exit_code(),
            ExitCode::PartialFailure
        );
        assert_eq!(
            UsageError::ParseResponse("bad".into()).exit_code(),
            ExitCode::GeneralError
        );
    }

    #[test]
    fn retry_after_only_on_rate_limited() {
        let err = UsageError::RateLimited {
            provider: "claude".into(),
            retry_after: Some(Duration::from_secs(60)),
            message: "too many".into(),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
        assert_eq!(UsageError::Timeout { seconds: 30 }.retry_after(), None);
    }

    #[test]
    fn provider_extraction() {
        let err = UsageError::Gated {
            provider: "claude".into(),
            remaining: Duration::from_secs(120),
        };
        assert_eq!(err.provider(), Some("claude"));
        assert_eq!(UsageError::Timeout { seconds: 30 }.provider(), None);
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::RateLimited).unwrap();
        assert_eq!(json, "\"rate_limited\"");
        let json = serde_json::to_string(&ErrorSeverity::Transient).unwrap();
        assert_eq!(json, "\"transient\"");
    }
}
