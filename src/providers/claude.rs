//! Claude (Anthropic) fetch strategies.
//!
//! - `oauth`: stored OAuth token (own store or the Claude CLI's credentials
//!   file), refreshed through the token endpoint once it expires.
//! - `web`: claude.ai session key with an org-id tenant lookup; the org id
//!   is cached and dropped again on authentication failure.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde_json::Value;

use super::{parse_rfc3339, percent};
use crate::core::http::{self, DEFAULT_TIMEOUT, HttpRequest};
use crate::core::models::{
    OverageUsage, PeriodType, ProviderIdentity, UsagePeriod, UsageSnapshot,
};
use crate::core::provider::Provider;
use crate::core::retry::RetryConfig;
use crate::core::strategy::{FetchResult, FetchStrategy};
use crate::error::UsageError;
use crate::storage::{CacheStore, CredentialKind, CredentialStore};

const TOKEN_URL: &str = "https://api.anthropic.com/oauth/token";
const USAGE_URL: &str = "https://api.anthropic.com/api/oauth/usage";
const OAUTH_BETA_HEADER: &str = "oauth-2025-04-20";

const ORG_URL: &str = "https://claude.ai/api/organizations";

// =============================================================================
// OAuth strategy
// =============================================================================

pub struct ClaudeOauthStrategy {
    store: CredentialStore,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct OauthCredentials {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl ClaudeOauthStrategy {
    #[must_use]
    pub const fn new(store: CredentialStore) -> Self {
        Self { store }
    }

    fn credential_paths(&self) -> Vec<std::path::PathBuf> {
        let mut paths = vec![
            self.store
                .credential_path(Provider::Claude, CredentialKind::OAuth),
        ];
        paths.extend(self.store.foreign_paths(Provider::Claude));
        paths
    }

    fn load_credentials(&self) -> Option<OauthCredentials> {
        if let Some(content) = self.store.read_own(Provider::Claude, CredentialKind::OAuth) {
            if let Ok(creds) = serde_json::from_slice(&content) {
                return Some(creds);
            }
        }
        for path in self.store.foreign_paths(Provider::Claude) {
            if let Some(content) = self.store.read(&path) {
                if let Ok(creds) = serde_json::from_slice(&content) {
                    return Some(creds);
                }
            }
        }
        None
    }

    fn needs_refresh(credentials: &OauthCredentials) -> bool {
        credentials
            .expires_at
            .is_some_and(|expiry| Utc::now() >= expiry)
    }

    async fn refresh_token(&self, credentials: &OauthCredentials) -> Option<OauthCredentials> {
        let refresh_token = credentials.refresh_token.clone()?;
        let client = http::client(DEFAULT_TIMEOUT).ok()?;

        let request = HttpRequest::post_form(
            TOKEN_URL,
            "claude",
            vec![
                ("grant_type", "refresh_token".to_string()),
                ("refresh_token", refresh_token.clone()),
            ],
        )
        .header("anthropic-beta", OAUTH_BETA_HEADER);

        let response = http::handle_request(client, &request, &RetryConfig::default(), None)
            .await
            .ok()?;
        let body: Value = response.json().await.ok()?;

        let expires_at = body
            .get("expires_in")
            .and_then(Value::as_i64)
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
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
            expires_at,
        };
        refreshed.access_token.as_ref()?;

        if let Ok(serialized) = serde_json::to_vec(&refreshed) {
            if let Err(e) =
                self.store
                    .write_own(Provider::Claude, CredentialKind::OAuth, &serialized)
            {
                tracing::warn!(error = %e, "failed to persist refreshed claude credentials");
            }
        }
        Some(refreshed)
    }
}

#[async_trait::async_trait]
impl FetchStrategy for ClaudeOauthStrategy {
    fn name(&self) -> &'static str {
        "oauth"
    }

    fn is_available(&self) -> bool {
        self.credential_paths().iter().any(|p| p.exists())
    }

    async fn fetch(&self) -> FetchResult {
        let Some(mut credentials) = self.load_credentials() else {
            return FetchResult::fail(UsageError::AuthNotConfigured {
                provider: "claude".to_string(),
            });
        };

        if Self::needs_refresh(&credentials) {
            match self.refresh_token(&credentials).await {
                Some(refreshed) => credentials = refreshed,
                None => {
                    return FetchResult::fail(UsageError::AuthExpired {
                        provider: "claude".to_string(),
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
        let request = HttpRequest::get(USAGE_URL, "claude")
            .bearer(&access_token)
            .header("anthropic-beta", OAUTH_BETA_HEADER);

        let body: Value =
            match http::fetch_json(client, &request, &RetryConfig::default()).await {
                Ok(body) => body,
                Err(e) => return FetchResult::fail(e),
            };

        match parse_oauth_usage(&body) {
            Some(snapshot) => FetchResult::ok(snapshot),
            None => FetchResult::fail(UsageError::ParseResponse(
                "no usage data in response".to_string(),
            )),
        }
    }
}

/// Parse the OAuth usage payload:
/// `{"usage": {"five_hour": {"usage": 45, "limit": 100, "resets_at": ...},
///             "seven_day": ..., "monthly": ..., "model:opus": ...,
///             "overage": {"used": ..., "limit": ..., "enabled": ...}}}`
fn parse_oauth_usage(body: &Value) -> Option<UsageSnapshot> {
    let usage = body.get("usage")?.as_object()?;
    if usage.is_empty() {
        return None;
    }

    let mut periods = Vec::new();
    let known = [
        ("five_hour", "Session (5h)", PeriodType::Session),
        ("seven_day", "Weekly", PeriodType::Weekly),
        ("monthly", "Monthly", PeriodType::Monthly),
    ];
    for (key, name, period_type) in known {
        if let Some(period) = usage.get(key).and_then(|v| parse_period(v, name, period_type)) {
            periods.push(period);
        }
    }

    for (key, value) in usage {
        if let Some(model) = key.strip_prefix("model:") {
            if let Some(mut period) =
                parse_period(value, &format!("{model} (7d)"), PeriodType::Weekly)
            {
                period.model = Some(model.to_string());
                periods.push(period);
            }
        }
    }

    let overage = usage.get("overage").and_then(parse_overage);

    let mut snapshot = UsageSnapshot::new("claude", periods);
    snapshot.overage = overage;
    snapshot.source = Some("oauth".to_string());
    Some(snapshot)
}

fn parse_period(value: &Value, name: &str, period_type: PeriodType) -> Option<UsagePeriod> {
    let used = value.get("usage")?.as_f64()?;
    let limit = value.get("limit")?.as_f64()?;
    let mut period = UsagePeriod::new(name, percent(used, limit), period_type);
    period.resets_at = value
        .get("resets_at")
        .and_then(Value::as_str)
        .and_then(parse_rfc3339);
    Some(period)
}

fn parse_overage(value: &Value) -> Option<OverageUsage> {
    let used = value.get("used").and_then(Value::as_f64).unwrap_or(0.0);
    let limit = value.get("limit").and_then(Value::as_f64).unwrap_or(0.0);
    Some(OverageUsage {
        used: Decimal::from_f64(used)?.round_dp(2),
        limit: Decimal::from_f64(limit)?.round_dp(2),
        currency: "USD".to_string(),
        is_enabled: value
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

// =============================================================================
// Web strategy
// =============================================================================

pub struct ClaudeWebStrategy {
    store: CredentialStore,
    cache: CacheStore,
}

impl ClaudeWebStrategy {
    #[must_use]
    pub const fn new(store: CredentialStore, cache: CacheStore) -> Self {
        Self { store, cache }
    }

    fn session_path(&self) -> std::path::PathBuf {
        self.store
            .credential_path(Provider::Claude, CredentialKind::Session)
    }

    fn load_session_key(&self) -> Option<String> {
        let content = self
            .store
            .read_own(Provider::Claude, CredentialKind::Session)?;
        if let Ok(value) = serde_json::from_slice::<Value>(&content) {
            if let Some(key) = value.get("session_key").and_then(Value::as_str) {
                return Some(key.to_string());
            }
        }
        let raw = String::from_utf8(content).ok()?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Resolve the org id, preferring the cache. The lookup picks the first
    /// organization with the "chat" capability, falling back to the first
    /// entry.
    async fn resolve_org_id(&self, session_key: &str) -> Option<String> {
        if let Some(cached) = self.cache.load_org_id("claude") {
            return Some(cached);
        }

        let client = http::client(DEFAULT_TIMEOUT).ok()?;
        let request = HttpRequest::get(ORG_URL, "claude")
            .header("Cookie", format!("sessionKey={session_key}"));
        let body: Value = http::fetch_json(client, &request, &RetryConfig::default())
            .await
            .ok()?;

        let orgs = body.as_array()?;
        let org_id = orgs
            .iter()
            .find(|org| {
                org.get("capabilities")
                    .and_then(Value::as_array)
                    .is_some_and(|caps| caps.iter().any(|c| c.as_str() == Some("chat")))
            })
            .or_else(|| orgs.first())
            .and_then(|org| org.get("uuid").or_else(|| org.get("id")))
            .and_then(Value::as_str)
            .map(ToString::to_string)?;

        if let Err(e) = self.cache.save_org_id("claude", &org_id) {
            tracing::debug!(error = %e, "failed to cache claude org id");
        }
        Some(org_id)
    }
}

#[async_trait::async_trait]
impl FetchStrategy for ClaudeWebStrategy {
    fn name(&self) -> &'static str {
        "web"
    }

    fn is_available(&self) -> bool {
        self.session_path().exists()
    }

    async fn fetch(&self) -> FetchResult {
        let Some(session_key) = self.load_session_key() else {
            return FetchResult::fail(UsageError::AuthNotConfigured {
                provider: "claude".to_string(),
            });
        };

        let Some(org_id) = self.resolve_org_id(&session_key).await else {
            return FetchResult::fail(UsageError::ParseResponse(
                "failed to resolve organization id".to_string(),
            ));
        };

        let client = match http::client(DEFAULT_TIMEOUT) {
            Ok(client) => client,
            Err(e) => return FetchResult::fail(e),
        };
        let cookie = format!("sessionKey={session_key}");

        let usage_url = format!("https://claude.ai/api/organizations/{org_id}/usage");
        let request = HttpRequest::get(&usage_url, "claude").header("Cookie", cookie.clone());
        let usage_body: Value =
            match http::fetch_json(client, &request, &RetryConfig::default()).await {
                Ok(body) => body,
                Err(err) => {
                    if matches!(err, UsageError::AuthExpired { .. }) {
                        // A dead session key won't revive; drop the tenant
                        // cache so the next login re-resolves it.
                        let _ = self.cache.clear_org_id("claude");
                        return FetchResult::fail_no_fallback(UsageError::AuthInvalid {
                            provider: "claude".to_string(),
                            reason: "session key expired or invalid".to_string(),
                        });
                    }
                    return FetchResult::fail(err);
                }
            };

        // Overage is best-effort; a failure here never sinks the fetch.
        let overage_url =
            format!("https://claude.ai/api/organizations/{org_id}/overage_spend_limit");
        let overage_request = HttpRequest::get(&overage_url, "claude").header("Cookie", cookie);
        let overage = match http::fetch_json::<Value>(
            client,
            &overage_request,
            &RetryConfig::default(),
        )
        .await
        {
            Ok(body) => parse_web_overage(&body),
            Err(_) => None,
        };

        match parse_web_usage(&usage_body, overage) {
            Some(snapshot) => FetchResult::ok(snapshot),
            None => FetchResult::fail(UsageError::ParseResponse(
                "no usage data in response".to_string(),
            )),
        }
    }
}

fn parse_web_overage(body: &Value) -> Option<OverageUsage> {
    Some(OverageUsage {
        used: Decimal::from_f64(body.get("current_spend").and_then(Value::as_f64)?)?.round_dp(2),
        limit: Decimal::from_f64(body.get("hard_limit").and_then(Value::as_f64).unwrap_or(0.0))?
            .round_dp(2),
        currency: "USD".to_string(),
        is_enabled: body
            .get("has_hard_limit")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn parse_web_usage(body: &Value, overage: Option<OverageUsage>) -> Option<UsageSnapshot> {
    let used = body.get("usage_amount").and_then(Value::as_f64)?;
    let limit = body.get("usage_limit").and_then(Value::as_f64)?;

    let mut period = UsagePeriod::new("Usage", percent(used, limit), PeriodType::Daily);
    period.resets_at = body
        .get("period_end")
        .or_else(|| body.get("reset_at"))
        .and_then(Value::as_str)
        .and_then(parse_rfc3339);

    let identity = if body.get("organization").is_some() || body.get("email").is_some() {
        Some(ProviderIdentity {
            email: body
                .get("email")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            organization: body
                .get("organization")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            plan: body
                .get("plan")
                .and_then(Value::as_str)
                .map(ToString::to_string),
        })
    } else {
        None
    };

    let mut snapshot = UsageSnapshot::new("claude", vec![period]);
    snapshot.overage = overage;
    snapshot.identity = identity;
    snapshot.source = Some("web".to_string());
    Some(snapshot)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn oauth_usage_parses_known_periods() {
        let body = json!({
            "usage": {
                "five_hour": {"usage": 45, "limit": 100},
                "seven_day": {"usage": 320, "limit": 1000, "resets_at": "2026-08-05T00:00:00Z"},
                "monthly": {"usage": 10, "limit": 100}
            }
        });

        let snapshot = parse_oauth_usage(&body).unwrap();
        assert_eq!(snapshot.provider, "claude");
        assert_eq!(snapshot.periods.len(), 3);
        assert_eq!(snapshot.periods[0].utilization, 45);
        assert_eq!(snapshot.periods[0].period_type, PeriodType::Session);
        assert_eq!(snapshot.periods[1].utilization, 32);
        assert!(snapshot.periods[1].resets_at.is_some());
        assert_eq!(snapshot.source.as_deref(), Some("oauth"));
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn oauth_usage_parses_model_breakdowns() {
        let body = json!({
            "usage": {
                "five_hour": {"usage": 50, "limit": 100},
                "model:opus": {"usage": 70, "limit": 100},
                "model:sonnet": {"usage": 20, "limit": 100}
            }
        });

        let snapshot = parse_oauth_usage(&body).unwrap();
        let models = snapshot.model_periods();
        assert_eq!(models.len(), 2);
        assert!(models.iter().any(|p| p.model.as_deref() == Some("opus")));
    }

    #[test]
    fn oauth_usage_parses_overage() {
        let body = json!({
            "usage": {
                "five_hour": {"usage": 5, "limit": 100},
                "overage": {"used": 12.5, "limit": 25.0, "enabled": true}
            }
        });

        let snapshot = parse_oauth_usage(&body).unwrap();
        let overage = snapshot.overage.unwrap();
        assert_eq!(overage.currency, "USD");
        assert!(overage.is_enabled);
        assert_eq!(overage.utilization(), 50);
    }

    #[test]
    fn oauth_usage_empty_is_none() {
        assert!(parse_oauth_usage(&json!({})).is_none());
        assert!(parse_oauth_usage(&json!({"usage": {}})).is_none());
    }

    #[test]
    fn oauth_usage_zero_limit_is_zero_percent() {
        let body = json!({
            "usage": {"five_hour": {"usage": 5, "limit": 0}}
        });
        let snapshot = parse_oauth_usage(&body).unwrap();
        assert_eq!(snapshot.periods[0].utilization, 0);
    }

    #[test]
    fn web_usage_parses_period_and_identity() {
        let body = json!({
            "usage_amount": 45.2,
            "usage_limit": 100.0,
            "period_end": "2026-08-02T00:00:00Z",
            "email": "dev@example.com",
            "plan": "max"
        });

        let snapshot = parse_web_usage(&body, None).unwrap();
        assert_eq!(snapshot.periods.len(), 1);
        assert_eq!(snapshot.periods[0].utilization, 45);
        assert!(snapshot.periods[0].resets_at.is_some());
        assert_eq!(
            snapshot.identity.unwrap().email.as_deref(),
            Some("dev@example.com")
        );
        assert_eq!(snapshot.source.as_deref(), Some("web"));
    }

    #[test]
    fn web_overage_parses_spend_limit() {
        let body = json!({
            "current_spend": 3.33,
            "hard_limit": 10.0,
            "has_hard_limit": true
        });
        let overage = parse_web_overage(&body).unwrap();
        assert!(overage.is_enabled);
        assert_eq!(overage.utilization(), 33);
    }

    #[test]
    fn web_usage_without_amounts_is_none() {
        assert!(parse_web_usage(&json!({"email": "x@y.z"}), None).is_none());
    }
}
