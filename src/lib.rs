//! vibeusage - unified usage tracker for AI subscription providers.
//!
//! Fetches utilization windows, overage state, and provider health across
//! configured providers through ordered credential strategies, with a
//! persistent failure gate and cache fallback.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]

pub mod cli;
pub mod core;
pub mod error;
pub mod providers;
pub mod render;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when the test-utils
/// feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, Result, UsageError};
