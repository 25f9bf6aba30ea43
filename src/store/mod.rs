//! Persistent store for harvested data and crawl coordination state
//!
//! This module provides the storage layer for the harvester:
//! - Repository snapshots, commits, and deduplicated people
//! - The pending-repository queue and per-worker checkpoints
//! - The append-only request ledger and dead-letter tables

mod schema;
mod sqlite;
mod traits;

pub use schema::{initialize_schema, SCHEMA_SQL};
pub use sqlite::SqliteStore;
pub use traits::{Store, StoreError, StoreResult};

use std::sync::{Arc, Mutex};

/// Store handle shared between workers
///
/// SQLite connections are not Sync, so all access goes through one mutex.
/// Lock scopes stay short and are never held across an await point.
pub type SharedStore = Arc<Mutex<SqliteStore>>;

/// Immutable-once-written snapshot of a repository
#[derive(Debug, Clone, PartialEq)]
pub struct RepoRecord {
    pub id: i64,
    pub name: Option<String>,
    pub owner_id: Option<i64>,
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub pushed_at: Option<String>,
    pub fetched_at: String,
    pub size: Option<i64>,
    pub stargazers: Option<i64>,
    pub watchers: Option<i64>,
    pub forks: Option<i64>,
    pub subscribers: Option<i64>,
    pub network: Option<i64>,
    pub language: Option<String>,
    pub archived: bool,
    pub license: Option<String>,
}

/// A commit identity as it appears in the wire data
///
/// Identical (name, email) pairs resolve to one person row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersonIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// One commit ready for persistence
#[derive(Debug, Clone)]
pub struct NewCommit {
    pub sha: String,
    pub message: Option<String>,
    pub author: PersonIdentity,
    pub committer: PersonIdentity,
    pub authored_at: Option<String>,
    pub committed_at: Option<String>,
}

/// Per-worker crawl position
///
/// `repo_id = None` means the worker has no repository assigned and should
/// acquire a new one. A set `repo_id` with `cursor = None` means the commit
/// walk starts from the repository's default branch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checkpoint {
    pub repo_id: Option<i64>,
    pub cursor: Option<String>,
}
