//! Shared HTTP transport.
//!
//! One process-wide `reqwest::Client` amortizes connection setup across all
//! providers; [`client`] hands out borrows and never transfers ownership.
//! [`handle_request`] layers the retry policy on top: transient transport
//! failures and retryable statuses back off and try again, honoring
//! `Retry-After` on 429.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Method, Response};

use super::retry::{OnRetry, RetryConfig, calculate_retry_delay};
use crate::error::{Result, UsageError, classify_http_status};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect-phase timeout, clamped below the overall timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

static CLIENT: OnceLock<Client> = OnceLock::new();

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns an error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .user_agent(format!("vibeusage/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| UsageError::Network(e.to_string()))
}

/// Borrow the process-wide client, creating it on first use.
///
/// The client lives until process exit; reqwest tears down its connection
/// pool on drop, so there is no separate close step.
pub fn client(timeout: Duration) -> Result<&'static Client> {
    if let Some(existing) = CLIENT.get() {
        return Ok(existing);
    }
    let built = build_client(timeout)?;
    Ok(CLIENT.get_or_init(|| built))
}

/// One outgoing request, provider-tagged for error classification.
#[derive(Debug)]
pub struct HttpRequest<'a> {
    pub method: Method,
    pub url: &'a str,
    pub provider: &'a str,
    /// Extra headers as (name, value) pairs.
    pub headers: Vec<(&'static str, String)>,
    /// Form-encoded body, if any.
    pub form: Option<Vec<(&'static str, String)>>,
    /// JSON body, if any.
    pub json: Option<serde_json::Value>,
}

impl<'a> HttpRequest<'a> {
    /// A GET request with no body.
    #[must_use]
    pub const fn get(url: &'a str, provider: &'a str) -> Self {
        Self {
            method: Method::GET,
            url,
            provider,
            headers: Vec::new(),
            form: None,
            json: None,
        }
    }

    /// A POST request with a form body.
    #[must_use]
    pub const fn post_form(
        url: &'a str,
        provider: &'a str,
        form: Vec<(&'static str, String)>,
    ) -> Self {
        Self {
            method: Method::POST,
            url,
            provider,
            headers: Vec::new(),
            form: Some(form),
            json: None,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Add a bearer-token Authorization header.
    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }
}

/// Send a request with retry.
///
/// Retries transport-level timeouts and connection failures, plus 429 and
/// 5xx statuses, up to `retry.max_attempts` total attempts. A `Retry-After`
/// header (integer seconds) replaces the computed backoff. Non-retryable
/// statuses return immediately as classified errors.
///
/// # Errors
///
/// The final error after exhaustion: either a network-kind error or the
/// classified HTTP status error.
pub async fn handle_request(
    client: &Client,
    request: &HttpRequest<'_>,
    retry: &RetryConfig,
    on_retry: Option<OnRetry<'_>>,
) -> Result<Response> {
    let mut last_error: Option<UsageError> = None;

    for attempt in 0..retry.max_attempts {
        let response = match send_once(client, request).await {
            Ok(response) => response,
            Err(err) => {
                if !err.is_retryable() || attempt + 1 == retry.max_attempts {
                    return Err(err);
                }
                let delay = calculate_retry_delay(attempt, retry);
                notify_retry(on_retry, attempt, delay, request);
                tokio::time::sleep(delay).await;
                last_error = Some(err);
                continue;
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        let mapping = classify_http_status(code);
        let retry_after = if mapping.retry_after_header {
            parse_retry_after(&response)
        } else {
            None
        };
        let body = response.text().await.unwrap_or_default();
        let err = match UsageError::from_status(code, request.provider, truncate(&body)) {
            UsageError::RateLimited {
                provider, message, ..
            } => UsageError::RateLimited {
                provider,
                retry_after,
                message,
            },
            other => other,
        };

        if !mapping.should_retry || attempt + 1 == retry.max_attempts {
            return Err(err);
        }

        let delay = retry_after.unwrap_or_else(|| calculate_retry_delay(attempt, retry));
        notify_retry(on_retry, attempt, delay, request);
        tokio::time::sleep(delay).await;
        last_error = Some(err);
    }

    Err(last_error.unwrap_or_else(|| UsageError::Network("retry budget exhausted".to_string())))
}

/// Send a request and parse a JSON response body.
///
/// # Errors
///
/// Network/status errors from [`handle_request`], or a parse error if the
/// body does not decode.
pub async fn fetch_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    request: &HttpRequest<'_>,
    retry: &RetryConfig,
) -> Result<T> {
    let response = handle_request(client, request, retry, None).await?;
    response
        .json()
        .await
        .map_err(|e| UsageError::ParseResponse(e.to_string()))
}

async fn send_once(client: &Client, request: &HttpRequest<'_>) -> Result<Response> {
    let mut builder = client.request(request.method.clone(), request.url);
    for (name, value) in &request.headers {
        builder = builder.header(*name, value.as_str());
    }
    if let Some(form) = &request.form {
        builder = builder.form(form);
    }
    if let Some(json) = &request.json {
        builder = builder.json(json);
    }

    builder
        .send()
        .await
        .map_err(|e| UsageError::from_transport(&e, DEFAULT_TIMEOUT))
}

fn notify_retry(
    on_retry: Option<OnRetry<'_>>,
    attempt: u32,
    delay: Duration,
    request: &HttpRequest<'_>,
) {
    tracing::debug!(
        provider = request.provider,
        url = request.url,
        attempt,
        delay_ms = delay.as_millis() as u64,
        "retrying request"
    );
    if let Some(callback) = on_retry {
        callback(attempt, delay);
    }
}

/// `Retry-After` as integer seconds; other forms are ignored.
fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Keep error messages readable when the body is a page of HTML.
fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}
