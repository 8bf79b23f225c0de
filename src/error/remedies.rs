//! Remediation hints for classified errors.
//!
//! Maps a (provider, category) pair to a short, actionable hint. Hints are
//! surfaced in human error output and in the `remediation` field of the JSON
//! error contract.

use super::ErrorCategory;

/// Login command for a provider's own CLI, when one exists.
fn login_command(provider: &str) -> Option<&'static str> {
    match provider {
        "claude" => Some("claude auth login"),
        "codex" => Some("codex auth login"),
        "gemini" => Some("gemini auth login"),
        "copilot" => Some("gh auth login"),
        "cursor" => Some("sign in from the Cursor app"),
        _ => None,
    }
}

/// Look up a remediation hint for a provider and error category.
///
/// Returns `None` when there is nothing actionable to say.
#[must_use]
pub fn remediation(provider: Option<&str>, category: ErrorCategory) -> Option<String> {
    match category {
        ErrorCategory::Authentication => {
            let hint = provider.and_then(login_command).map_or_else(
                || "re-authenticate with the provider".to_string(),
                |cmd| format!("re-authenticate: {cmd}"),
            );
            Some(hint)
        }
        ErrorCategory::Authorization => Some(
            "your account does not have access to usage data; check your plan".to_string(),
        ),
        ErrorCategory::RateLimited => Some("wait a few minutes and try again".to_string()),
        ErrorCategory::Network => Some("check your internet connection".to_string()),
        ErrorCategory::Provider => {
            Some("the provider is having trouble; try again later".to_string())
        }
        ErrorCategory::Parse => {
            Some("the provider API may have changed; update vibeusage".to_string())
        }
        ErrorCategory::Configuration => Some("check file permissions".to_string()),
        ErrorCategory::NotFound => provider.map(|p| format!("check that your {p} plan includes usage reporting")),
        ErrorCategory::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_mentions_provider_login() {
        let hint = remediation(Some("claude"), ErrorCategory::Authentication).unwrap();
        assert!(hint.contains("claude auth login"));
    }

    #[test]
    fn authentication_without_provider_is_generic() {
        let hint = remediation(None, ErrorCategory::Authentication).unwrap();
        assert!(hint.contains("re-authenticate"));
    }

    #[test]
    fn rate_limited_says_wait() {
        let hint = remediation(Some("codex"), ErrorCategory::RateLimited).unwrap();
        assert!(hint.contains("wait"));
    }

    #[test]
    fn configuration_mentions_permissions() {
        let hint = remediation(None, ErrorCategory::Configuration).unwrap();
        assert!(hint.contains("permissions"));
    }

    #[test]
    fn unknown_has_no_hint() {
        assert!(remediation(Some("claude"), ErrorCategory::Unknown).is_none());
    }
}
