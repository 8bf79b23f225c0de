//! CLI argument definitions.

use clap::{Args, Parser, Subcommand};

/// Unified usage tracker for AI subscription providers.
#[derive(Debug, Parser)]
#[command(name = "vibeusage", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Emit machine-readable JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose logging (same as --log-level debug).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show usage for enabled providers (the default).
    Usage(UsageArgs),
    /// Inspect or clear cached snapshots and org ids.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Manage the failure gates.
    Gate {
        #[command(subcommand)]
        command: GateCommand,
    },
    /// Show the effective configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Default, Args)]
pub struct UsageArgs {
    /// Fetch a single provider instead of all enabled ones.
    #[arg(long)]
    pub provider: Option<String>,

    /// Never substitute cached snapshots for failed fetches.
    #[arg(long)]
    pub no_cache: bool,

    /// Per-request timeout in seconds (overrides config).
    #[arg(long, env = "VIBEUSAGE_TIMEOUT")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Show per-provider cache and gate state.
    Status,
    /// Drop cached snapshots and org ids, for one provider or all.
    Clear {
        provider: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum GateCommand {
    /// Reopen a provider's failure gate.
    Clear {
        provider: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the config file path.
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_usage_with_provider() {
        let cli = Cli::parse_from(["vibeusage", "usage", "--provider", "claude", "--json"]);
        assert!(cli.json);
        match cli.command {
            Some(Commands::Usage(args)) => {
                assert_eq!(args.provider.as_deref(), Some("claude"));
                assert!(!args.no_cache);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_bare_invocation() {
        let cli = Cli::parse_from(["vibeusage"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_cache_clear() {
        let cli = Cli::parse_from(["vibeusage", "cache", "clear", "codex"]);
        match cli.command {
            Some(Commands::Cache {
                command: CacheCommand::Clear { provider },
            }) => assert_eq!(provider.as_deref(), Some("codex")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_gate_clear() {
        let cli = Cli::parse_from(["vibeusage", "gate", "clear", "claude"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Gate {
                command: GateCommand::Clear { .. }
            })
        ));
    }
}
