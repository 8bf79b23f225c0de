//! Cursor fetch strategy.
//!
//! Uses a stored web session token against the usage-summary API. A
//! rejected session token is terminal: there is no refresh path, the user
//! has to sign in again.

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use super::{parse_rfc3339, percent};
use crate::core::http::{self, DEFAULT_TIMEOUT, HttpRequest};
use crate::core::models::{OverageUsage, PeriodType, ProviderIdentity, UsagePeriod, UsageSnapshot};
use crate::core::provider::Provider;
use crate::core::retry::RetryConfig;
use crate::core::strategy::{FetchResult, FetchStrategy};
use crate::error::UsageError;
use crate::storage::{CredentialKind, CredentialStore};

const USAGE_URL: &str = "https://www.cursor.com/api/usage-summary";
const USER_URL: &str = "https://www.cursor.com/api/auth/me";

const SESSION_COOKIE: &str = "__Secure-next-auth.session-token";

pub struct CursorWebStrategy {
    store: CredentialStore,
}

impl CursorWebStrategy {
    #[must_use]
    pub const fn new(store: CredentialStore) -> Self {
        Self { store }
    }

    fn session_path(&self) -> std::path::PathBuf {
        self.store
            .credential_path(Provider::Cursor, CredentialKind::Session)
    }

    fn load_session_token(&self) -> Option<String> {
        let content = self
            .store
            .read_own(Provider::Cursor, CredentialKind::Session)?;
        if let Ok(value) = serde_json::from_slice::<Value>(&content) {
            for key in ["session_token", "token", "session_key", "session"] {
                if let Some(token) = value.get(key).and_then(Value::as_str) {
                    return Some(token.to_string());
                }
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
}

#[async_trait::async_trait]
impl FetchStrategy for CursorWebStrategy {
    fn name(&self) -> &'static str {
        "web"
    }

    fn is_available(&self) -> bool {
        self.session_path().exists()
    }

    async fn fetch(&self) -> FetchResult {
        let Some(token) = self.load_session_token() else {
            return FetchResult::fail(UsageError::AuthNotConfigured {
                provider: "cursor".to_string(),
            });
        };

        let client = match http::client(DEFAULT_TIMEOUT) {
            Ok(client) => client,
            Err(e) => return FetchResult::fail(e),
        };
        let cookie = format!("{SESSION_COOKIE}={token}");

        let mut usage_request = HttpRequest::get(USAGE_URL, "cursor")
            .header("Cookie", cookie.clone())
            .header("User-Agent", "Mozilla/5.0");
        usage_request.method = reqwest::Method::POST;
        usage_request.json = Some(serde_json::json!({}));

        let usage_body: Value =
            match http::fetch_json(client, &usage_request, &RetryConfig::default()).await {
                Ok(body) => body,
                Err(err) => {
                    if matches!(err, UsageError::AuthExpired { .. }) {
                        return FetchResult::fatal(UsageError::AuthInvalid {
                            provider: "cursor".to_string(),
                            reason: "session token expired or invalid".to_string(),
                        });
                    }
                    return FetchResult::fail(err);
                }
            };

        // Identity is best-effort.
        let user_request = HttpRequest::get(USER_URL, "cursor")
            .header("Cookie", cookie)
            .header("User-Agent", "Mozilla/5.0");
        let user_body =
            (http::fetch_json::<Value>(client, &user_request, &RetryConfig::default()).await).ok();

        match parse_usage(&usage_body, user_body.as_ref()) {
            Some(snapshot) => FetchResult::ok(snapshot),
            None => FetchResult::fail(UsageError::ParseResponse(
                "no usage data in response".to_string(),
            )),
        }
    }
}

/// Parse the usage-summary payload:
/// `{"premium_requests": {"used": 120, "available": 380},
///   "billing_cycle": {"end": ...},
///   "on_demand_spend": {"used_cents": 250, "limit_cents": 2000}}`
fn parse_usage(usage: &Value, user: Option<&Value>) -> Option<UsageSnapshot> {
    let premium = usage.get("premium_requests")?;
    let used = premium.get("used").and_then(Value::as_f64).unwrap_or(0.0);
    let available = premium
        .get("available")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let total = used + available;

    let mut period = UsagePeriod::new(
        "Premium Requests",
        percent(used, total),
        PeriodType::Monthly,
    );
    period.resets_at = usage
        .get("billing_cycle")
        .and_then(|cycle| cycle.get("end"))
        .and_then(|end| match end {
            Value::String(s) => parse_rfc3339(s),
            // Unix timestamp in milliseconds.
            Value::Number(n) => n
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
            _ => None,
        });

    let overage = usage
        .get("on_demand_spend")
        .and_then(Value::as_object)
        .and_then(|spend| {
            let limit_cents = spend.get("limit_cents").and_then(Value::as_i64)?;
            if limit_cents <= 0 {
                return None;
            }
            let used_cents = spend.get("used_cents").and_then(Value::as_i64).unwrap_or(0);
            Some(OverageUsage {
                used: Decimal::new(used_cents, 2),
                limit: Decimal::new(limit_cents, 2),
                currency: "USD".to_string(),
                is_enabled: true,
            })
        });

    let identity = user.and_then(Value::as_object).map(|user| ProviderIdentity {
        email: user
            .get("email")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        organization: None,
        plan: user
            .get("membership_type")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    });

    let mut snapshot = UsageSnapshot::new("cursor", vec![period]);
    snapshot.overage = overage;
    snapshot.identity = identity;
    snapshot.source = Some("web".to_string());
    Some(snapshot)
}
