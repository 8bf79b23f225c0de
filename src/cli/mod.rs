//! Command-line surface.

pub mod args;
pub mod cache;
pub mod config_cmd;
pub mod usage;

pub use args::{Cli, Commands};
