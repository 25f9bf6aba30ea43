//! Wire models for the consumed API fields
//!
//! Only the fields the harvester actually persists are modeled; everything
//! else in the response bodies is ignored during deserialization.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One row of the public-repositories listing
#[derive(Debug, Clone, Deserialize)]
pub struct RepoSummary {
    pub id: i64,
}

/// Repository owner reference
#[derive(Debug, Clone, Deserialize)]
pub struct RepoOwner {
    pub id: i64,
}

/// Repository license reference
#[derive(Debug, Clone, Deserialize)]
pub struct RepoLicense {
    pub key: Option<String>,
}

/// Full repository detail, as far as the harvester consumes it
#[derive(Debug, Clone, Deserialize)]
pub struct RepoDetail {
    pub id: i64,
    pub name: Option<String>,
    pub owner: Option<RepoOwner>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub size: Option<i64>,
    pub stargazers_count: Option<i64>,
    pub watchers_count: Option<i64>,
    pub forks_count: Option<i64>,
    pub subscribers_count: Option<i64>,
    pub network_count: Option<i64>,
    pub language: Option<String>,
    #[serde(default)]
    pub archived: bool,
    pub license: Option<RepoLicense>,
}

/// One row of a commit-history page
#[derive(Debug, Clone, Deserialize)]
pub struct CommitEntry {
    pub sha: String,
    pub commit: CommitDetail,
}

/// The nested git commit data
#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub message: Option<String>,
    pub author: Option<GitIdentity>,
    pub committer: Option<GitIdentity>,
}

/// A git author/committer identity stamp
#[derive(Debug, Clone, Deserialize)]
pub struct GitIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// The core-resource quota window
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QuotaSnapshot {
    pub limit: u64,
    pub remaining: u64,
    /// Unix timestamp at which the window turns over
    pub reset: i64,
}

/// Envelope of the quota endpoint response
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct QuotaResponse {
    pub resources: QuotaResources,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct QuotaResources {
    pub core: QuotaSnapshot,
}
