//! Octoharvest: a resumable GitHub metadata and commit-history harvester
//!
//! This crate continuously pulls repository metadata and commit history from
//! the GitHub API into a SQLite database, resuming exactly where it left off
//! after a crash and staying inside the API's hourly request budget.

pub mod config;
pub mod crawl;
pub mod github;
pub mod rate;
pub mod store;

use thiserror::Error;

/// Main error type for harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("API error: {0}")]
    Api(#[from] github::ApiError),

    #[error("Storage error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No fetchable repository after {attempts} attempts")]
    AcquireBudgetExhausted { attempts: u32 },
}

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

// Re-export commonly used types
pub use config::HarvestConfig;
pub use crawl::Harvester;
pub use github::ApiClient;
pub use rate::RateGate;
pub use store::{SharedStore, SqliteStore, Store};
