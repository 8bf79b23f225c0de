//! Persistence: paths, configuration, credentials, and caches.

pub mod cache;
pub mod config;
pub mod credentials;
pub mod paths;

pub use cache::CacheStore;
pub use config::Config;
pub use credentials::{CredentialKind, CredentialSource, CredentialStore};
pub use paths::AppPaths;
