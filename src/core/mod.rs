//! The fetch core: data model, transport, gate, pipeline, orchestration.

pub mod aggregate;
pub mod gate;
pub mod http;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod provider;
pub mod retry;
pub mod strategy;

pub use models::UsageSnapshot;
pub use pipeline::FetchContext;
pub use provider::Provider;
pub use strategy::{FetchOutcome, FetchResult, FetchStrategy};
