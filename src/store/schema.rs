//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the harvester database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Repository snapshots, written exactly once per identifier
CREATE TABLE IF NOT EXISTS repos (
    id INTEGER PRIMARY KEY,
    name TEXT,
    owner_id INTEGER,
    description TEXT,
    created_at TEXT,
    updated_at TEXT,
    pushed_at TEXT,
    fetched_at TEXT NOT NULL,
    size INTEGER,
    stargazers INTEGER,
    watchers INTEGER,
    forks INTEGER,
    subscribers INTEGER,
    network INTEGER,
    language TEXT,
    archived INTEGER NOT NULL DEFAULT 0,
    license TEXT
);

-- Deduplicated commit identities
CREATE TABLE IF NOT EXISTS people (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    email TEXT,
    UNIQUE(name, email)
);

-- Commit history, one row per (repository, sha)
CREATE TABLE IF NOT EXISTS commits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL REFERENCES repos(id),
    sha TEXT NOT NULL,
    message TEXT,
    committer_id INTEGER NOT NULL REFERENCES people(id),
    author_id INTEGER NOT NULL REFERENCES people(id),
    authored_at TEXT,
    committed_at TEXT,
    UNIQUE(repo_id, sha)
);

CREATE INDEX IF NOT EXISTS idx_commits_repo ON commits(repo_id);

-- Repository identifiers awaiting a detail fetch
CREATE TABLE IF NOT EXISTS repo_queue (
    repo_id INTEGER PRIMARY KEY
);

-- Per-worker crawl position
CREATE TABLE IF NOT EXISTS checkpoints (
    worker_id INTEGER PRIMARY KEY,
    repo_id INTEGER,
    cursor TEXT
);

-- Append-only log of every outbound API call
CREATE TABLE IF NOT EXISTS request_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    started_at TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    status INTEGER NOT NULL,
    error_body TEXT
);

CREATE INDEX IF NOT EXISTS idx_request_log_started ON request_log(started_at);

-- Dead-letter records for repositories we gave up on
CREATE TABLE IF NOT EXISTS failed_repos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    request_log_id INTEGER NOT NULL REFERENCES request_log(id)
);

-- Dead-letter records for abandoned commit walks
CREATE TABLE IF NOT EXISTS failed_commits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    cursor TEXT,
    request_log_id INTEGER NOT NULL REFERENCES request_log(id)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
