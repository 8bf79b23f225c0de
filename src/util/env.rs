//! Environment helpers.

/// Check if an environment variable is set to a truthy value.
#[must_use]
pub fn is_env_truthy(var: &str) -> bool {
    std::env::var(var)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Decide whether to emit colored output.
///
/// Colors are off when `--no-color` was passed, when `VIBEUSAGE_NO_COLOR` or
/// the standard `NO_COLOR` is set, or when stdout is not a TTY.
#[must_use]
pub fn should_use_color(no_color_flag: bool) -> bool {
    if no_color_flag {
        return false;
    }
    if std::env::var(crate::storage::config::ENV_NO_COLOR).is_ok()
        || std::env::var(crate::storage::config::ENV_NO_COLOR_STD).is_ok()
    {
        return false;
    }
    atty::is(atty::Stream::Stdout)
}
