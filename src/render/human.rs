//! Human terminal output.
//!
//! One block per provider: a usage bar per period, overage state, identity,
//! and staleness/gated markers. Bars color by pace when enabled (on or
//! under linear pace is green), with a plain utilization threshold fallback
//! when pace is undefined.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use colored::{Color, Colorize};

use crate::core::models::{OverageUsage, UsagePeriod, UsageSnapshot};
use crate::core::provider::Provider;
use crate::core::strategy::FetchOutcome;
use crate::storage::config::{DisplayConfig, ResetFormat};
use crate::util::time::format_countdown;

const BAR_WIDTH: usize = 20;

/// Snapshots older than this get a staleness marker.
const STALE_DISPLAY_MINUTES: i64 = 10;

/// Rendering knobs resolved from config and flags.
#[derive(Debug, Clone)]
pub struct DisplayOptions {
    pub color: bool,
    pub display: DisplayConfig,
}

/// Pick a display color from pace, falling back to utilization thresholds.
#[must_use]
pub fn usage_color(pace: Option<f64>, utilization: u8) -> Color {
    match pace {
        Some(pace) if pace <= 1.15 => Color::Green,
        Some(pace) if pace <= 1.30 => Color::Yellow,
        Some(_) => Color::Red,
        None if utilization < 50 => Color::Green,
        None if utilization < 80 => Color::Yellow,
        None => Color::Red,
    }
}

/// Render all outcomes as one human-readable report.
#[must_use]
pub fn render_usage(outcomes: &HashMap<String, FetchOutcome>, options: &DisplayOptions) -> String {
    let mut ids: Vec<&String> = outcomes.keys().collect();
    ids.sort();

    let mut out = String::new();
    for id in ids {
        let outcome = &outcomes[id];
        out.push_str(&render_provider(outcome, options));
        out.push('\n');
    }
    out
}

fn provider_title(provider_id: &str) -> String {
    Provider::from_id(provider_id)
        .map_or_else(|_| provider_id.to_string(), |p| p.display_name().to_string())
}

fn render_provider(outcome: &FetchOutcome, options: &DisplayOptions) -> String {
    let mut lines = Vec::new();

    let title = provider_title(&outcome.provider_id);
    let header = outcome.source.as_ref().map_or_else(
        || title.clone(),
        |source| format!("{title}  ({source})"),
    );
    lines.push(if options.color {
        header.bold().to_string()
    } else {
        header
    });

    if let Some(snapshot) = &outcome.snapshot {
        let name_width = snapshot
            .periods
            .iter()
            .map(|p| p.name.len())
            .max()
            .unwrap_or(0);
        for period in &snapshot.periods {
            lines.push(render_period(period, name_width, options));
        }
        if let Some(overage) = &snapshot.overage {
            lines.push(render_overage(overage, options));
        }
        if let Some(identity) = &snapshot.identity {
            let mut parts = Vec::new();
            if let Some(email) = &identity.email {
                parts.push(email.clone());
            }
            if let Some(plan) = &identity.plan {
                parts.push(format!("plan: {plan}"));
            }
            if !parts.is_empty() {
                lines.push(format!("  {}", dim(&parts.join("  "), options)));
            }
        }
        if snapshot.is_stale(Duration::minutes(STALE_DISPLAY_MINUTES)) {
            let age = format_age(snapshot);
            lines.push(warn(&format!("  ! data from {age} ago"), options));
        }
        if outcome.cached {
            lines.push(warn("  ! served from cache, live fetch failed", options));
        }
    }

    if outcome.gated {
        let remaining = outcome
            .gate_remaining
            .map_or_else(String::new, |d| {
                format!(" for {}", format_countdown(Duration::seconds(d.as_secs() as i64)))
            });
        lines.push(warn(
            &format!("  ! paused after repeated failures{remaining}"),
            options,
        ));
    }

    if !outcome.success && outcome.snapshot.is_none() {
        let message = outcome.error.as_deref().unwrap_or("fetch failed");
        lines.push(err_line(&format!("  x {message}"), options));
        for attempt in &outcome.attempts {
            if let Some(error) = &attempt.error {
                lines.push(dim(
                    &format!("    {} failed: {error}", attempt.strategy),
                    options,
                ));
            }
        }
    }

    lines.join("\n") + "\n"
}

fn render_period(period: &UsagePeriod, name_width: usize, options: &DisplayOptions) -> String {
    let bar = render_bar(period, options);
    let mut line = format!(
        "  {:<name_width$}  {bar}  {:>3}%",
        period.name, period.utilization
    );

    if options.display.show_remaining {
        line.push_str(&format!("  ({}% left)", period.remaining()));
    }

    if let Some(resets_at) = period.resets_at {
        let reset = match options.display.reset_format {
            ResetFormat::Countdown => {
                format!("resets in {}", format_countdown(resets_at - Utc::now()))
            }
            ResetFormat::Absolute => {
                format!("resets at {}", resets_at.format("%Y-%m-%d %H:%M UTC"))
            }
        };
        line.push_str("  ");
        line.push_str(&dim(&reset, options));
    }

    line
}

fn render_bar(period: &UsagePeriod, options: &DisplayOptions) -> String {
    let filled = (usize::from(period.utilization) * BAR_WIDTH).div_ceil(100).min(BAR_WIDTH);
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled));
    if options.color && options.display.pace_colors {
        let color = usage_color(period.pace_ratio(), period.utilization);
        bar.color(color).to_string()
    } else {
        bar
    }
}

fn render_overage(overage: &OverageUsage, options: &DisplayOptions) -> String {
    let symbol = if overage.currency == "USD" { "$" } else { "" };
    let unit = if overage.currency == "USD" {
        String::new()
    } else {
        format!(" {}", overage.currency)
    };
    let state = if overage.is_enabled { "" } else { " (off)" };
    let line = format!(
        "  extra usage: {symbol}{}{unit} of {symbol}{}{unit} ({}%){state}",
        overage.used,
        overage.limit,
        overage.utilization()
    );
    dim(&line, options)
}

fn format_age(snapshot: &UsageSnapshot) -> String {
    format_countdown(Duration::seconds(
        (Utc::now() - snapshot.fetched_at).num_seconds().max(0),
    ))
}

fn dim(text: &str, options: &DisplayOptions) -> String {
    if options.color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

fn warn(text: &str, options: &DisplayOptions) -> String {
    if options.color {
        text.yellow().to_string()
    } else {
        text.to_string()
    }
}

fn err_line(text: &str, options: &DisplayOptions) -> String {
    if options.color {
        text.red().to_string()
    } else {
        text.to_string()
    }
}
