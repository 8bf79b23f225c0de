//! Copilot (GitHub) fetch strategy.
//!
//! Reuses an existing GitHub token instead of running the interactive
//! device flow: the package store first, then the gh-copilot `hosts.json`,
//! then `GITHUB_TOKEN`.

use serde_json::Value;

use super::{parse_rfc3339, percent};
use crate::core::http::{self, DEFAULT_TIMEOUT, HttpRequest};
use crate::core::models::{PeriodType, ProviderIdentity, UsagePeriod, UsageSnapshot};
use crate::core::provider::Provider;
use crate::core::retry::RetryConfig;
use crate::core::strategy::{FetchResult, FetchStrategy};
use crate::error::UsageError;
use crate::storage::{CredentialKind, CredentialStore};

const USAGE_URL: &str = "https://api.github.com/copilot_internal/user";

pub struct CopilotTokenStrategy {
    store: CredentialStore,
}

impl CopilotTokenStrategy {
    #[must_use]
    pub const fn new(store: CredentialStore) -> Self {
        Self { store }
    }

    fn stored_token_path(&self) -> std::path::PathBuf {
        self.store
            .credential_path(Provider::Copilot, CredentialKind::OAuth)
    }

    fn load_token(&self) -> Option<String> {
        if let Some(content) = self.store.read_own(Provider::Copilot, CredentialKind::OAuth) {
            if let Ok(value) = serde_json::from_slice::<Value>(&content) {
                if let Some(token) = value.get("access_token").and_then(Value::as_str) {
                    return Some(token.to_string());
                }
            }
        }

        // hosts.json: {"github.com": {"oauth_token": "..."}}
        for path in self.store.foreign_paths(Provider::Copilot) {
            let Some(content) = self.store.read(&path) else {
                continue;
            };
            let Ok(value) = serde_json::from_slice::<Value>(&content) else {
                continue;
            };
            if let Some(token) = value
                .as_object()
                .and_then(|hosts| hosts.values().next())
                .and_then(|host| host.get("oauth_token"))
                .and_then(Value::as_str)
            {
                return Some(token.to_string());
            }
        }

        std::env::var(Provider::Copilot.api_key_env_var())
            .ok()
            .filter(|t| !t.is_empty())
    }
}

#[async_trait::async_trait]
impl FetchStrategy for CopilotTokenStrategy {
    fn name(&self) -> &'static str {
        "session"
    }

    fn is_available(&self) -> bool {
        self.stored_token_path().exists()
            || self
                .store
                .foreign_paths(Provider::Copilot)
                .iter()
                .any(|p| p.exists())
            || std::env::var(Provider::Copilot.api_key_env_var())
                .is_ok_and(|t| !t.is_empty())
    }

    async fn fetch(&self) -> FetchResult {
        let Some(token) = self.load_token() else {
            return FetchResult::fail(UsageError::AuthNotConfigured {
                provider: "copilot".to_string(),
            });
        };

        let client = match http::client(DEFAULT_TIMEOUT) {
            Ok(client) => client,
            Err(e) => return FetchResult::fail(e),
        };
        let request = HttpRequest::get(USAGE_URL, "copilot")
            .bearer(&token)
            .header("Accept", "application/json");

        let body: Value =
            match http::fetch_json(client, &request, &RetryConfig::default()).await {
                Ok(body) => body,
                Err(err) => {
                    // GitHub tokens don't refresh; a 401 is a dead end.
                    if matches!(err, UsageError::AuthExpired { .. }) {
                        return FetchResult::fail_no_fallback(UsageError::AuthInvalid {
                            provider: "copilot".to_string(),
                            reason: "GitHub token expired or invalid".to_string(),
                        });
                    }
                    return FetchResult::fail(err);
                }
            };

        match parse_usage(&body) {
            Some(snapshot) => FetchResult::ok(snapshot),
            None => FetchResult::fail(UsageError::ParseResponse(
                "no quota data in response".to_string(),
            )),
        }
    }
}

/// Parse the Copilot user payload:
/// `{"premium_interactions": {"total": 1000, "used": 450, "reset_at": ...},
///   "chat_quotas": [{"model": "gpt-4", "limit": 30, "used": 15, ...}],
///   "account": {"plan": ..., "organization": ..., "email": ...}}`
fn parse_usage(body: &Value) -> Option<UsageSnapshot> {
    let mut periods = Vec::new();

    if let Some(premium) = body.get("premium_interactions") {
        let total = premium.get("total").and_then(Value::as_f64).unwrap_or(0.0);
        let used = premium.get("used").and_then(Value::as_f64).unwrap_or(0.0);
        if total > 0.0 {
            let mut period = UsagePeriod::new("Monthly", percent(used, total), PeriodType::Monthly);
            period.resets_at = premium
                .get("reset_at")
                .and_then(Value::as_str)
                .and_then(parse_rfc3339);
            periods.push(period);
        }
    }

    if let Some(quotas) = body.get("chat_quotas").and_then(Value::as_array) {
        for quota in quotas {
            let model = quota.get("model").and_then(Value::as_str).unwrap_or("unknown");
            let limit = quota.get("limit").and_then(Value::as_f64).unwrap_or(0.0);
            let used = quota.get("used").and_then(Value::as_f64).unwrap_or(0.0);
            if limit <= 0.0 {
                continue;
            }
            let mut period = UsagePeriod::new(
                format!("{model} (Daily)"),
                percent(used, limit),
                PeriodType::Daily,
            );
            period.resets_at = quota
                .get("reset_at")
                .and_then(Value::as_str)
                .and_then(parse_rfc3339);
            period.model = Some(model.to_string());
            periods.push(period);
        }
    }

    if periods.is_empty() {
        return None;
    }

    let identity = body
        .get("account")
        .and_then(Value::as_object)
        .map(|account| ProviderIdentity {
            email: account
                .get("email")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            organization: account
                .get("organization")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            plan: account
                .get("plan")
                .or_else(|| account.get("subscription_tier"))
                .and_then(Value::as_str)
                .map(ToString::to_string),
        });

    let mut snapshot = UsageSnapshot::new("copilot", periods);
    snapshot.identity = identity;
    snapshot.source = Some("session".to_string());
    Some(snapshot)
}
