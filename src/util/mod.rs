//! Utility functions.

pub mod env;
pub mod time;

pub use env::should_use_color;
pub use time::format_countdown;
