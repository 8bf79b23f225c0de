//! Minimal structured logging for integration tests.
//!
//! Prints phase markers and per-test duration to stderr; `cargo test`
//! captures the output and shows it only on failure.
#![allow(dead_code)]

use std::time::Instant;

pub struct TestLogger {
    name: &'static str,
    started: Instant,
}

impl TestLogger {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        eprintln!("[{name}] start");
        Self {
            name,
            started: Instant::now(),
        }
    }

    pub fn phase(&self, phase: &str) {
        eprintln!("[{}] phase: {phase}", self.name);
    }

    pub fn note(&self, message: impl std::fmt::Display) {
        eprintln!("[{}] {message}", self.name);
    }

    pub fn finish_ok(self) {
        eprintln!("[{}] ok in {:?}", self.name, self.started.elapsed());
    }
}
