//! The `cache` and `gate` maintenance commands.

use chrono::Utc;

use super::args::{CacheCommand, GateCommand};
use crate::core::gate::GateRegistry;
use crate::core::provider::Provider;
use crate::error::{ExitCode, Result};
use crate::storage::{AppPaths, CacheStore, Config, CredentialStore};
use crate::util::time::format_countdown;

pub fn execute_cache(command: &CacheCommand) -> Result<ExitCode> {
    let paths = AppPaths::new();
    let cache = CacheStore::new(&paths);

    match command {
        CacheCommand::Status => {
            let config = Config::load_from(&paths.config_file())?;
            let store = CredentialStore::new(paths.credentials_dir());
            let gates = GateRegistry::new(cache.clone());

            println!(
                "{:<10} {:<16} {:<22} {}",
                "provider", "credentials", "snapshot", "gate"
            );
            for provider in Provider::ALL {
                let id = provider.id();
                let credentials = store
                    .find(*provider, &config.credentials)
                    .map_or("none", |hit| hit.source.as_str());
                let snapshot = cache.load_snapshot(id).map_or_else(
                    || "none".to_string(),
                    |s| {
                        let age = Utc::now() - s.fetched_at;
                        format!("{} old", format_countdown(age))
                    },
                );
                let gate = gates.with_gate(id, |gate| {
                    if gate.is_gated() {
                        gate.gate_remaining().map_or_else(
                            || "closed".to_string(),
                            |d| {
                                format!(
                                    "closed for {}",
                                    format_countdown(chrono::Duration::seconds(
                                        d.as_secs() as i64
                                    ))
                                )
                            },
                        )
                    } else if gate.consecutive_count > 0 {
                        format!("open ({} recent failures)", gate.consecutive_count)
                    } else {
                        "open".to_string()
                    }
                });
                println!("{id:<10} {credentials:<16} {snapshot:<22} {gate}");
            }
            Ok(ExitCode::Success)
        }
        CacheCommand::Clear { provider } => {
            let targets: Vec<&str> = match provider {
                Some(name) => vec![Provider::from_id(name)?.id()],
                None => Provider::ALL.iter().map(|p| p.id()).collect(),
            };
            let mut cleared = 0usize;
            for id in targets {
                if cache.clear_snapshot(id)? {
                    cleared += 1;
                }
                cache.clear_org_id(id)?;
            }
            println!("cleared {cleared} cached snapshot(s)");
            Ok(ExitCode::Success)
        }
    }
}

pub fn execute_gate(command: &GateCommand) -> Result<ExitCode> {
    let paths = AppPaths::new();
    let cache = CacheStore::new(&paths);
    let gates = GateRegistry::new(cache);

    match command {
        GateCommand::Clear { provider } => {
            let provider = Provider::from_id(provider)?;
            gates.clear(provider.id());
            println!("gate cleared for {}", provider.id());
            Ok(ExitCode::Success)
        }
    }
}
