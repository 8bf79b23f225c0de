//! The `config` inspection commands.

use super::args::ConfigCommand;
use crate::error::{ExitCode, Result, UsageError};
use crate::storage::{AppPaths, Config};

pub fn execute(command: &ConfigCommand) -> Result<ExitCode> {
    let paths = AppPaths::new();
    match command {
        ConfigCommand::Show => {
            let config = Config::load_from(&paths.config_file())?;
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| UsageError::Config(format!("failed to render config: {e}")))?;
            print!("{rendered}");
            Ok(ExitCode::Success)
        }
        ConfigCommand::Path => {
            println!("{}", paths.config_file().display());
            Ok(ExitCode::Success)
        }
    }
}
