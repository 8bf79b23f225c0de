//! Classified-error rendering.

use colored::Colorize;

use crate::error::UsageError;

use super::robot::render_error_json;

/// Render a top-level error for the selected output mode.
#[must_use]
pub fn render_error(error: &UsageError, json: bool, pretty: bool, color: bool) -> String {
    if json {
        return render_error_json(error, pretty);
    }

    let header = format!("error: {error}");
    let mut out = if color {
        header.red().bold().to_string()
    } else {
        header
    };

    if let Some(remediation) = error.remediation() {
        let hint = format!("  hint: {remediation}");
        out.push('\n');
        out.push_str(&if color {
            hint.dimmed().to_string()
        } else {
            hint
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_error_includes_hint() {
        let err = UsageError::AuthExpired {
            provider: "claude".to_string(),
        };
        let out = render_error(&err, false, false, false);
        assert!(out.contains("error: authentication expired for claude"));
        assert!(out.contains("hint:"));
    }

    #[test]
    fn json_error_is_valid_json() {
        let err = UsageError::Network("down".to_string());
        let out = render_error(&err, true, false, false);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["error"]["category"], "network");
    }

    #[test]
    fn error_without_hint_is_single_line() {
        let err = UsageError::Cancelled;
        let out = render_error(&err, false, false, false);
        assert_eq!(out, "error: cancelled");
    }
}
