//! Storage trait and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::store::{Checkpoint, NewCommit, RepoRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the harvester.
pub trait Store {
    // ===== Repositories =====

    /// Persists a repository snapshot; written exactly once per identifier
    fn insert_repo(&mut self, repo: &RepoRecord) -> StoreResult<()>;

    /// Returns the largest repository identifier ever ingested
    fn largest_repo_id(&self) -> StoreResult<Option<i64>>;

    /// Returns whether a repository snapshot exists
    fn repo_exists(&self, repo_id: i64) -> StoreResult<bool>;

    // ===== Commits and people =====

    /// Persists one page of commits inside a single transaction
    ///
    /// Committer and author identities are resolved through the person
    /// dedup path: a per-batch cache in front of a select-before-insert.
    /// Re-persisting a (repository, sha) pair is a no-op.
    ///
    /// # Returns
    ///
    /// The number of commit rows actually inserted
    fn insert_commit_page(&mut self, repo_id: i64, commits: &[NewCommit]) -> StoreResult<usize>;

    /// Counts persisted commits for a repository
    fn count_commits(&self, repo_id: i64) -> StoreResult<u64>;

    /// Counts person rows
    fn count_people(&self) -> StoreResult<u64>;

    // ===== Pending-repository queue =====

    /// Adds identifiers to the queue, skipping ones already queued or
    /// already ingested
    ///
    /// # Returns
    ///
    /// The number of identifiers actually inserted
    fn enqueue_repos(&mut self, repo_ids: &[i64]) -> StoreResult<usize>;

    /// Pops an arbitrary pending identifier, removing it in the same
    /// transaction
    fn dequeue_repo(&mut self) -> StoreResult<Option<i64>>;

    /// Returns the number of pending identifiers
    fn queue_len(&self) -> StoreResult<u64>;

    // ===== Checkpoints =====

    /// Reads a worker's checkpoint; missing rows read as empty
    fn checkpoint(&self, worker_id: u32) -> StoreResult<Checkpoint>;

    /// Upserts a worker's checkpoint
    fn set_checkpoint(
        &mut self,
        worker_id: u32,
        repo_id: Option<i64>,
        cursor: Option<&str>,
    ) -> StoreResult<()>;

    // ===== Request ledger =====

    /// Appends a request-log entry
    ///
    /// # Returns
    ///
    /// The identifier of the new entry
    fn log_request(
        &mut self,
        url: &str,
        started_at: &str,
        duration_ms: i64,
        status: u16,
        error_body: Option<&str>,
    ) -> StoreResult<i64>;

    /// Counts ledger entries whose start time falls within [start, end]
    fn requests_between(&self, start: &str, end: &str) -> StoreResult<u64>;

    // ===== Dead letters =====

    /// Records a repository-level permanent failure
    fn record_failed_repo(&mut self, repo_id: i64, request_log_id: i64) -> StoreResult<()>;

    /// Records an abandoned commit walk
    fn record_failed_commits(
        &mut self,
        repo_id: i64,
        cursor: Option<&str>,
        request_log_id: i64,
    ) -> StoreResult<()>;

    /// Counts repository-level dead letters
    fn count_failed_repos(&self) -> StoreResult<u64>;

    /// Counts abandoned commit walks
    fn count_failed_commits(&self) -> StoreResult<u64>;
}
