//! Time formatting utilities.

use chrono::Duration;

/// Format a countdown as "2d 3h", "3h 12m", "45m", or "now".
#[must_use]
pub fn format_countdown(delta: Duration) -> String {
    let total_seconds = delta.num_seconds();
    if total_seconds <= 0 {
        return "now".to_string();
    }

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
