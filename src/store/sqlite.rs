//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Store trait.

use crate::store::schema::initialize_schema;
use crate::store::traits::{Store, StoreResult};
use crate::store::{Checkpoint, NewCommit, PersonIdentity, RepoRecord};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens or creates a database at the given path
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StoreError)` - Failed to open database
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Resolves an identity to a person id, consulting the per-batch cache
    /// before the select-before-insert round trip
    fn person_id(
        tx: &Transaction<'_>,
        cache: &mut HashMap<PersonIdentity, i64>,
        identity: &PersonIdentity,
    ) -> StoreResult<i64> {
        if let Some(&id) = cache.get(identity) {
            return Ok(id);
        }

        // Racy under concurrent workers inserting the same new person;
        // the UNIQUE(name, email) constraint keeps the table consistent.
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM people WHERE name IS ?1 AND email IS ?2",
                params![identity.name, identity.email],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => id,
            None => {
                tx.execute(
                    "INSERT INTO people (name, email) VALUES (?1, ?2)",
                    params![identity.name, identity.email],
                )?;
                tx.last_insert_rowid()
            }
        };

        cache.insert(identity.clone(), id);
        Ok(id)
    }
}

impl Store for SqliteStore {
    // ===== Repositories =====

    fn insert_repo(&mut self, repo: &RepoRecord) -> StoreResult<()> {
        // OR REPLACE: a crash between dequeue and insert can surface the
        // same identifier again through a later listing
        self.conn.execute(
            "INSERT OR REPLACE INTO repos
             (id, name, owner_id, description, created_at, updated_at, pushed_at, fetched_at,
              size, stargazers, watchers, forks, subscribers, network, language, archived, license)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                repo.id,
                repo.name,
                repo.owner_id,
                repo.description,
                repo.created_at,
                repo.updated_at,
                repo.pushed_at,
                repo.fetched_at,
                repo.size,
                repo.stargazers,
                repo.watchers,
                repo.forks,
                repo.subscribers,
                repo.network,
                repo.language,
                repo.archived as i64,
                repo.license,
            ],
        )?;
        Ok(())
    }

    fn largest_repo_id(&self) -> StoreResult<Option<i64>> {
        let id: Option<i64> = self
            .conn
            .query_row("SELECT MAX(id) FROM repos", [], |row| row.get(0))?;
        Ok(id)
    }

    fn repo_exists(&self, repo_id: i64) -> StoreResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM repos WHERE id = ?1",
            params![repo_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ===== Commits and people =====

    fn insert_commit_page(&mut self, repo_id: i64, commits: &[NewCommit]) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let mut cache: HashMap<PersonIdentity, i64> = HashMap::new();
        let mut inserted = 0;

        for commit in commits {
            let committer_id = Self::person_id(&tx, &mut cache, &commit.committer)?;
            let author_id = if commit.author == commit.committer {
                committer_id
            } else {
                Self::person_id(&tx, &mut cache, &commit.author)?
            };

            inserted += tx.execute(
                "INSERT OR IGNORE INTO commits
                 (repo_id, sha, message, committer_id, author_id, authored_at, committed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    repo_id,
                    commit.sha,
                    commit.message,
                    committer_id,
                    author_id,
                    commit.authored_at,
                    commit.committed_at,
                ],
            )?;
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn count_commits(&self, repo_id: i64) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM commits WHERE repo_id = ?1",
            params![repo_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_people(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Pending-repository queue =====

    fn enqueue_repos(&mut self, repo_ids: &[i64]) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;

        for repo_id in repo_ids {
            // An identifier lives in at most one of {queue, repos}
            inserted += tx.execute(
                "INSERT OR IGNORE INTO repo_queue (repo_id)
                 SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM repos WHERE id = ?1)",
                params![repo_id],
            )?;
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn dequeue_repo(&mut self) -> StoreResult<Option<i64>> {
        let tx = self.conn.transaction()?;

        let repo_id: Option<i64> = tx
            .query_row("SELECT repo_id FROM repo_queue LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        if let Some(id) = repo_id {
            tx.execute("DELETE FROM repo_queue WHERE repo_id = ?1", params![id])?;
        }

        tx.commit()?;
        Ok(repo_id)
    }

    fn queue_len(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM repo_queue", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Checkpoints =====

    fn checkpoint(&self, worker_id: u32) -> StoreResult<Checkpoint> {
        let checkpoint = self
            .conn
            .query_row(
                "SELECT repo_id, cursor FROM checkpoints WHERE worker_id = ?1",
                params![worker_id],
                |row| {
                    Ok(Checkpoint {
                        repo_id: row.get(0)?,
                        cursor: row.get(1)?,
                    })
                },
            )
            .optional()?;

        Ok(checkpoint.unwrap_or_default())
    }

    fn set_checkpoint(
        &mut self,
        worker_id: u32,
        repo_id: Option<i64>,
        cursor: Option<&str>,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoints (worker_id, repo_id, cursor) VALUES (?1, ?2, ?3)",
            params![worker_id, repo_id, cursor],
        )?;
        Ok(())
    }

    // ===== Request ledger =====

    fn log_request(
        &mut self,
        url: &str,
        started_at: &str,
        duration_ms: i64,
        status: u16,
        error_body: Option<&str>,
    ) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO request_log (url, started_at, duration_ms, status, error_body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![url, started_at, duration_ms, status, error_body],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn requests_between(&self, start: &str, end: &str) -> StoreResult<u64> {
        // RFC 3339 UTC strings compare correctly as text
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM request_log WHERE started_at >= ?1 AND started_at <= ?2",
            params![start, end],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Dead letters =====

    fn record_failed_repo(&mut self, repo_id: i64, request_log_id: i64) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO failed_repos (repo_id, request_log_id) VALUES (?1, ?2)",
            params![repo_id, request_log_id],
        )?;
        Ok(())
    }

    fn record_failed_commits(
        &mut self,
        repo_id: i64,
        cursor: Option<&str>,
        request_log_id: i64,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO failed_commits (repo_id, cursor, request_log_id) VALUES (?1, ?2, ?3)",
            params![repo_id, cursor, request_log_id],
        )?;
        Ok(())
    }

    fn count_failed_repos(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM failed_repos", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_failed_commits(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM failed_commits", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
