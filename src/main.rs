//! vibeusage CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use vibeusage::cli::args::UsageArgs;
use vibeusage::cli::{Cli, Commands};
use vibeusage::core::logging;
use vibeusage::render::render_error;
use vibeusage::util::should_use_color;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .or_else(logging::parse_log_level_from_env)
        .unwrap_or_default();
    let log_format = if cli.json {
        logging::LogFormat::Json
    } else {
        logging::parse_log_format_from_env().unwrap_or_default()
    };
    logging::init(log_level, log_format, cli.verbose);

    let color = should_use_color(cli.no_color);
    let json = cli.json;
    let pretty = cli.pretty;

    match run(cli, color).await {
        Ok(code) => ExitCode::from(u8::from(code)),
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}", render_error(&e, json, pretty, color));
            ExitCode::from(u8::from(e.exit_code()))
        }
    }
}

async fn run(cli: Cli, color: bool) -> vibeusage::Result<vibeusage::ExitCode> {
    let json = cli.json;
    let pretty = cli.pretty;

    match cli.command {
        // Bare invocation behaves like `usage`.
        None => vibeusage::cli::usage::execute(&UsageArgs::default(), json, pretty, color).await,
        Some(Commands::Usage(args)) => {
            vibeusage::cli::usage::execute(&args, json, pretty, color).await
        }
        Some(Commands::Cache { command }) => vibeusage::cli::cache::execute_cache(&command),
        Some(Commands::Gate { command }) => vibeusage::cli::cache::execute_gate(&command),
        Some(Commands::Config { command }) => vibeusage::cli::config_cmd::execute(&command),
    }
}
