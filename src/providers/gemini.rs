//! Gemini (Google) fetch strategy.
//!
//! Reuses the Gemini CLI's OAuth credentials against the Cloud Code quota
//! endpoint, which reports remaining-fraction quotas per model bucket.
//! Google access tokens are short-lived, so the strategy refreshes a few
//! minutes ahead of expiry.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{parse_rfc3339, percent};
use crate::core::http::{self, DEFAULT_TIMEOUT, HttpRequest};
use crate::core::models::{PeriodType, ProviderIdentity, UsagePeriod, UsageSnapshot};
use crate::core::provider::Provider;
use crate::core::retry::RetryConfig;
use crate::core::strategy::{FetchResult, FetchStrategy};
use crate::error::UsageError;
use crate::storage::{CredentialKind, CredentialStore};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const QUOTA_URL: &str = "https://cloudcode-pa.googleapis.com/v1internal:retrieveUserQuota";

// OAuth client registered by the Gemini CLI.
const CLIENT_ID: &str = "77185425430.apps.googleusercontent.com";
const CLIENT_SECRET: &str = "GOCSPX-1mdrl61JR9D-iFHq4QPq2mJGwZv";

/// Refresh this far ahead of expiry.
const REFRESH_THRESHOLD_MINUTES: i64 = 5;

pub struct GeminiOauthStrategy {
    store: CredentialStore,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct OauthCredentials {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl GeminiOauthStrategy {
    #[must_use]
    pub const fn new(store: CredentialStore) -> Self {
        Self { store }
    }

    fn credential_paths(&self) -> Vec<std::path::PathBuf> {
        let mut paths = vec![
            self.store
                .credential_path(Provider::Gemini, CredentialKind::OAuth),
        ];
        paths.extend(self.store.foreign_paths(Provider::Gemini));
        paths
    }

    fn load_credentials(&self) -> Option<OauthCredentials> {
        let mut bodies = Vec::new();
        if let Some(content) = self.store.read_own(Provider::Gemini, CredentialKind::OAuth) {
            bodies.push(content);
        }
        for path in self.store.foreign_paths(Provider::Gemini) {
            if let Some(content) = self.store.read(&path) {
                bodies.push(content);
            }
        }
        for content in bodies {
            let Ok(value) = serde_json::from_slice::<Value>(&content) else {
                continue;
            };
            if let Some(creds) = Self::convert_credentials(&value) {
                return Some(creds);
            }
        }
        None
    }

    /// Accept both the package's own format and the Gemini CLI's
    /// `oauth_creds.json` (which uses `expiry_date` in epoch millis).
    fn convert_credentials(value: &Value) -> Option<OauthCredentials> {
        let access_token = value
            .get("access_token")
            .and_then(Value::as_str)
            .map(ToString::to_string)?;
        let refresh_token = value
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let expires_at = value
            .get("expires_at")
            .and_then(Value::as_str)
            .and_then(parse_rfc3339)
            .or_else(|| {
                value
                    .get("expiry_date")
                    .and_then(Value::as_i64)
                    .and_then(|millis| DateTime::from_timestamp_millis(millis))
            });
        Some(OauthCredentials {
            access_token: Some(access_token),
            refresh_token,
            expires_at,
        })
    }

    fn needs_refresh(credentials: &OauthCredentials) -> bool {
        let Some(expiry) = credentials.expires_at else {
            return false;
        };
        Utc::now() + chrono::Duration::minutes(REFRESH_THRESHOLD_MINUTES) >= expiry
    }

    async fn refresh_token(&self, credentials: &OauthCredentials) -> Option<OauthCredentials> {
        let refresh_token = credentials.refresh_token.clone()?;
        let client = http::client(DEFAULT_TIMEOUT).ok()?;

        let request = HttpRequest::post_form(
            TOKEN_URL,
            "gemini",
            vec![
                ("grant_type", "refresh_token".to_string()),
                ("refresh_token", refresh_token.clone()),
                ("client_id", CLIENT_ID.to_string()),
                ("client_secret", CLIENT_SECRET.to_string()),
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
            refresh_token: Some(refresh_token),
            expires_at: body
                .get("expires_in")
                .and_then(Value::as_i64)
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        };
        refreshed.access_token.as_ref()?;

        if let Ok(serialized) = serde_json::to_vec(&refreshed) {
            if let Err(e) =
                self.store
                    .write_own(Provider::Gemini, CredentialKind::OAuth, &serialized)
            {
                tracing::warn!(error = %e, "failed to persist refreshed gemini credentials");
            }
        }
        Some(refreshed)
    }
}

#[async_trait::async_trait]
impl FetchStrategy for GeminiOauthStrategy {
    fn name(&self) -> &'static str {
        "oauth"
    }

    fn is_available(&self) -> bool {
        self.credential_paths().iter().any(|p| p.exists())
    }

    async fn fetch(&self) -> FetchResult {
        let Some(mut credentials) = self.load_credentials() else {
            return FetchResult::fail(UsageError::AuthNotConfigured {
                provider: "gemini".to_string(),
            });
        };

        if Self::needs_refresh(&credentials) {
            match self.refresh_token(&credentials).await {
                Some(refreshed) => credentials = refreshed,
                None => {
                    return FetchResult::fail(UsageError::AuthExpired {
                        provider: "gemini".to_string(),
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
        let mut request = HttpRequest::get(QUOTA_URL, "gemini").bearer(&access_token);
        request.method = reqwest::Method::POST;
        request.json = Some(serde_json::json!({}));

        let body: Value = match http::fetch_json(client, &request, &RetryConfig::default()).await
        {
            Ok(body) => body,
            Err(err) => {
                if matches!(err, UsageError::AuthExpired { .. }) {
                    // One refresh was already attempted; the token is done.
                    return FetchResult::fail_no_fallback(UsageError::AuthInvalid {
                        provider: "gemini".to_string(),
                        reason: "OAuth token rejected after refresh".to_string(),
                    });
                }
                return FetchResult::fail(err);
            }
        };

        match parse_quota(&body) {
            Some(snapshot) => FetchResult::ok(snapshot),
            None => FetchResult::fail(UsageError::ParseResponse(
                "no quota data in response".to_string(),
            )),
        }
    }
}

/// Parse the Cloud Code quota payload:
/// `{"buckets": [{"displayName": "gemini-2.5-pro",
///                "remainingFraction": 0.42, "resetTime": ...}],
///   "userTier": "standard", "email": ...}`
fn parse_quota(body: &Value) -> Option<UsageSnapshot> {
    let buckets = body.get("buckets").and_then(Value::as_array)?;

    let mut periods = Vec::new();
    for bucket in buckets {
        let Some(remaining) = bucket.get("remainingFraction").and_then(Value::as_f64) else {
            continue;
        };
        let name = bucket
            .get("displayName")
            .and_then(Value::as_str)
            .unwrap_or("Daily");
        let utilization = percent((1.0 - remaining) * 100.0, 100.0);
        let mut period = UsagePeriod::new(name, utilization, PeriodType::Daily);
        period.resets_at = bucket
            .get("resetTime")
            .and_then(Value::as_str)
            .and_then(parse_rfc3339);
        if let Some(model) = bucket.get("model").and_then(Value::as_str) {
            period.model = Some(model.to_string());
        }
        periods.push(period);
    }

    if periods.is_empty() {
        return None;
    }

    let identity = match (
        body.get("email").and_then(Value::as_str),
        body.get("userTier").and_then(Value::as_str),
    ) {
        (None, None) => None,
        (email, tier) => Some(ProviderIdentity {
            email: email.map(ToString::to_string),
            organization: None,
            plan: tier.map(ToString::to_string),
        }),
    };

    let mut snapshot = UsageSnapshot::new("gemini", periods);
    snapshot.identity = identity;
    snapshot.source = Some("oauth".to_string());
    Some(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_quota_buckets() {
        let body = json!({
            "buckets": [
                {"displayName": "gemini-2.5-pro", "remainingFraction": 0.42,
                 "resetTime": "2026-08-02T00:00:00Z", "model": "gemini-2.5-pro"},
                {"displayName": "gemini-2.5-flash", "remainingFraction": 0.90}
            ],
            "userTier": "standard"
        });

        let snapshot = parse_quota(&body).unwrap();
        assert_eq!(snapshot.provider, "gemini");
        assert_eq!(snapshot.periods.len(), 2);
        assert_eq!(snapshot.periods[0].utilization, 57);
        assert_eq!(snapshot.periods[0].model.as_deref(), Some("gemini-2.5-pro"));
        assert!(snapshot.periods[0].resets_at.is_some());
        assert_eq!(snapshot.periods[1].utilization, 9);
        assert_eq!(snapshot.identity.unwrap().plan.as_deref(), Some("standard"));
    }

    #[test]
    fn empty_buckets_is_none() {
        assert!(parse_quota(&json!({"buckets": []})).is_none());
        assert!(parse_quota(&json!({})).is_none());
    }

    #[test]
    fn cli_expiry_date_millis_is_accepted() {
        let creds = GeminiOauthStrategy::convert_credentials(&json!({
            "access_token": "ya29.tok",
            "refresh_token": "1//ref",
            "expiry_date": 1_790_000_000_000_i64
        }))
        .unwrap();
        assert!(creds.expires_at.is_some());
        assert_eq!(creds.access_token.as_deref(), Some("ya29.tok"));
    }

    #[test]
    fn missing_access_token_rejects_credentials() {
        assert!(
            GeminiOauthStrategy::convert_credentials(&json!({"refresh_token": "r"})).is_none()
        );
    }

    #[test]
    fn refresh_window_is_five_minutes() {
        let soon = OauthCredentials {
            access_token: Some("t".to_string()),
            refresh_token: Some("r".to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::minutes(2)),
        };
        assert!(GeminiOauthStrategy::needs_refresh(&soon));

        let later = OauthCredentials {
            access_token: Some("t".to_string()),
            refresh_token: Some("r".to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        };
        assert!(!GeminiOauthStrategy::needs_refresh(&later));
    }
}
