//! Codex (OpenAI) fetch strategy.
//!
//! OAuth tokens come from the package store or the Codex CLI's `auth.json`.
//! Tokens are refreshed ahead of expiry (the CLI rotates them every ~8
//! days). A 401 on the usage endpoint means the stored token is dead for
//! good, so the strategy stops the pipeline rather than falling through.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde_json::Value;

use crate::core::http::{self, DEFAULT_TIMEOUT, HttpRequest};
use crate::core::models::{
    OverageUsage, PeriodType, ProviderIdentity, UsagePeriod, UsageSnapshot,
};
use crate::core::provider::Provider;
use crate::core::retry::RetryConfig;
use crate::core::strategy::{FetchResult, FetchStrategy};
use crate::error::UsageError;
use crate::storage::{CredentialKind, CredentialStore};

const TOKEN_URL: &str = "https://auth.openai.com/oauth/token";
const USAGE_URL: &str = "https://chatgpt.com/backend-api/wham/usage";
const CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";

/// Refresh this far ahead of expiry.
const REFRESH_THRESHOLD_DAYS: i64 = 8;

pub struct CodexOauthStrategy {
    store: CredentialStore,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct OauthCredentials {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl CodexOauthStrategy {
    #[must_use]
    pub const fn new(store: CredentialStore) -> Self {
        Self { store }
    }

    fn credential_paths(&self) -> Vec<std::path::PathBuf> {
        let mut paths = vec![
            self.store
                .credential_path(Provider::Codex, CredentialKind::OAuth),
        ];
        paths.extend(self.store.foreign_paths(Provider::Codex));
        paths
    }

    fn load_credentials(&self) -> Option<OauthCredentials> {
        if let Some(content) = self.store.read_own(Provider::Codex, CredentialKind::OAuth) {
            if let Ok(creds) = serde_json::from_slice(&content) {
                return Some(creds);
            }
        }
        for path in self.store.foreign_paths(Provider::Codex) {
            if let Some(content) = self.store.read(&path) {
                if let Ok(creds) = serde_json::from_slice(&content) {
                    return Some(creds);
                }
            }
        }
        None
    }

    fn needs_refresh(credentials: &OauthCredentials) -> bool {
        let Some(expiry) = credentials.expires_at else {
            return false;
        };
        Utc::now() + chrono::Duration::days(REFRESH_THRESHOLD_DAYS) >= expiry
    }

    async fn refresh_token(&self, credentials: &OauthCredentials) -> Option<OauthCredentials> {
        let refresh_token = credentials.refresh_token.clone()?;
        let client = http::client(DEFAULT_TIMEOUT).ok()?;

        let request = HttpRequest::post_form(
            TOKEN_URL,
            "codex",
            vec![
                ("grant_type", "refresh_token".to_string()),
                ("refresh_token", refresh_token.clone()),
                ("client_id", CLIENT_ID.to_string()),
            ],
        );
        let response = http::handle_request(client, &request, &RetryConfig::default(), None)
            .await
            .ok()?;
        let body: Value = response.json().await.ok()?;

        let refreshed = OauthCredentials {
            access_token: body
                .get("access_token")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            refresh_token: body
                .get("refresh_token")
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .or(Some(refresh_token)),
            expires_at: body
                .get("expires_in")
                .and_then(Value::as_i64)
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        };
        refreshed.access_token.as_ref()?;

        if let Ok(serialized) = serde_json::to_vec(&refreshed) {
            if let Err(e) =
                self.store
                    .write_own(Provider::Codex, CredentialKind::OAuth, &serialized)
            {
                tracing::warn!(error = %e, "failed to persist refreshed codex credentials");
            }
        }
        Some(refreshed)
    }
}

#[async_trait::async_trait]
impl FetchStrategy for CodexOauthStrategy {
    fn name(&self) -> &'static str {
        "oauth"
    }

    fn is_available(&self) -> bool {
        self.credential_paths().iter().any(|p| p.exists())
    }

    async fn fetch(&self) -> FetchResult {
        let Some(mut credentials) = self.load_credentials() else {
            return FetchResult::fail(UsageError::AuthNotConfigured {
                provider: "codex".to_string(),
            });
        };

        if Self::needs_refresh(&credentials) {
            match self.refresh_token(&credentials).await {
                Some(refreshed) => credentials = refreshed,
                None => {
                    return FetchResult::fail(UsageError::AuthExpired {
                        provider: "codex".to_string(),
                    });
                }
            }
        }

        let Some(access_token) = credentials.access_token else {
            return FetchResult::fail(UsageError::ParseResponse(
                "credentials missing access_token".to_string(),
            ));
        };

        let client = match http::client(DEFAULT_TIMEOUT) {
            Ok(client) => client,
            Err(e) => return FetchResult::fail(e),
        };
        let request = HttpRequest::get(USAGE_URL, "codex").bearer(&access_token);

        let body: Value =
            match http::fetch_json(client, &request, &RetryConfig::default()).await {
                Ok(body) => body,
                Err(err) => {
                    // Refresh already happened (or wasn't due); a 401 here
                    // means the token is definitively invalid.
                    if matches!(err, UsageError::AuthExpired { .. }) {
                        return FetchResult::fail_no_fallback(UsageError::AuthInvalid {
                            provider: "codex".to_string(),
                            reason: "OAuth token expired or invalid".to_string(),
                        });
                    }
                    return FetchResult::fail(err);
                }
            };

        match parse_usage(&body) {
            Some(snapshot) => FetchResult::ok(snapshot),
            None => FetchResult::fail(UsageError::ParseResponse(
                "no rate limit data in response".to_string(),
            )),
        }
    }
}

/// Parse the wham usage payload:
/// `{"rate_limits": {"primary": {"used_percent": 58, "reset_timestamp": ...},
///                   "secondary": ...},
///   "credits": {"has_credits": true, "balance": 10.5},
///   "plan_type": "plus"}`
fn parse_usage(body: &Value) -> Option<UsageSnapshot> {
    let rate_limits = body.get("rate_limits")?;
    let mut periods = Vec::new();

    if let Some(period) = parse_limit(
        rate_limits.get("primary"),
        "Session",
        PeriodType::Session,
    ) {
        periods.push(period);
    }
    if let Some(period) = parse_limit(
        rate_limits.get("secondary"),
        "Weekly",
        PeriodType::Weekly,
    ) {
        periods.push(period);
    }
    if periods.is_empty() {
        return None;
    }

    let overage = body.get("credits").and_then(|credits| {
        if credits.get("has_credits").and_then(Value::as_bool) == Some(true) {
            let balance = credits.get("balance").and_then(Value::as_f64).unwrap_or(0.0);
            Some(OverageUsage {
                // The API reports remaining balance only.
                used: Decimal::ZERO,
                limit: Decimal::from_f64(balance)?.round_dp(2),
                currency: "credits".to_string(),
                is_enabled: true,
            })
        } else {
            None
        }
    });

    let identity = body
        .get("plan_type")
        .and_then(Value::as_str)
        .map(|plan| ProviderIdentity {
            email: None,
            organization: None,
            plan: Some(plan.to_string()),
        });

    let mut snapshot = UsageSnapshot::new("codex", periods);
    snapshot.overage = overage;
    snapshot.identity = identity;
    snapshot.source = Some("oauth".to_string());
    Some(snapshot)
}

fn parse_limit(value: Option<&Value>, name: &str, period_type: PeriodType) -> Option<UsagePeriod> {
    let value = value?;
    let used_percent = value.get("used_percent")?.as_f64()?;
    let mut period = UsagePeriod::new(
        name,
        used_percent.clamp(0.0, 100.0).floor() as u8,
        period_type,
    );
    period.resets_at = value
        .get("reset_timestamp")
        .and_then(Value::as_i64)
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single());
    Some(period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_primary_and_secondary_limits() {
        let body = json!({
            "rate_limits": {
                "primary": {"used_percent": 58, "reset_timestamp": 1_790_000_000},
                "secondary": {"used_percent": 23}
            },
            "plan_type": "plus"
        });

        let snapshot = parse_usage(&body).unwrap();
        assert_eq!(snapshot.provider, "codex");
        assert_eq!(snapshot.periods.len(), 2);
        assert_eq!(snapshot.periods[0].name, "Session");
        assert_eq!(snapshot.periods[0].utilization, 58);
        assert!(snapshot.periods[0].resets_at.is_some());
        assert_eq!(snapshot.periods[1].period_type, PeriodType::Weekly);
        assert!(snapshot.periods[1].resets_at.is_none());
        assert_eq!(snapshot.identity.unwrap().plan.as_deref(), Some("plus"));
    }

    #[test]
    fn credits_become_overage() {
        let body = json!({
            "rate_limits": {"primary": {"used_percent": 10}},
            "credits": {"has_credits": true, "balance": 10.50}
        });

        let snapshot = parse_usage(&body).unwrap();
        let overage = snapshot.overage.unwrap();
        assert_eq!(overage.currency, "credits");
        assert!(overage.is_enabled);
        assert_eq!(overage.remaining(), Decimal::new(1050, 2));
    }

    #[test]
    fn no_credits_means_no_overage() {
        let body = json!({
            "rate_limits": {"primary": {"used_percent": 10}},
            "credits": {"has_credits": false, "balance": 0}
        });
        assert!(parse_usage(&body).unwrap().overage.is_none());
    }

    #[test]
    fn missing_rate_limits_is_none() {
        assert!(parse_usage(&json!({})).is_none());
        assert!(parse_usage(&json!({"rate_limits": {}})).is_none());
    }

    #[test]
    fn used_percent_is_clamped() {
        let body = json!({
            "rate_limits": {"primary": {"used_percent": 130}}
        });
        let snapshot = parse_usage(&body).unwrap();
        assert_eq!(snapshot.periods[0].utilization, 100);
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn refresh_threshold_is_ahead_of_expiry() {
        let soon = OauthCredentials {
            access_token: Some("tok".to_string()),
            refresh_token: Some("ref".to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::days(2)),
        };
        assert!(CodexOauthStrategy::needs_refresh(&soon));

        let far = OauthCredentials {
            access_token: Some("tok".to_string()),
            refresh_token: Some("ref".to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::days(30)),
        };
        assert!(!CodexOauthStrategy::needs_refresh(&far));

        let never = OauthCredentials {
            access_token: Some("tok".to_string()),
            refresh_token: None,
            expires_at: None,
        };
        assert!(!CodexOauthStrategy::needs_refresh(&never));
    }
}
