//! Commit history walker
//!
//! Paginates a repository's commit history backward from a cursor,
//! persisting each page and reporting the new cursor.

use crate::config::HarvestConfig;
use crate::github::{ApiClient, ApiError, CommitEntry};
use crate::rate::RateGate;
use crate::store::{NewCommit, PersonIdentity, SharedStore, Store};
use std::sync::Arc;

/// Branch requested when a walk starts without a cursor
const DEFAULT_BRANCH: &str = "master";

/// Outcome of one page advance
///
/// `RateLimited` must stay distinct from `Done`: the caller retries the
/// same cursor later instead of clearing the checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum WalkOutcome {
    /// A page was persisted; resume from this sha
    Advanced(String),
    /// History exhausted (or permanently abandoned) for this repository
    Done,
    /// Quota ran out; the cursor was not advanced
    RateLimited,
}

/// Walks commit history one page at a time
pub struct CommitWalker {
    store: SharedStore,
    api: Arc<ApiClient>,
    gate: Arc<RateGate>,
    page_size: u32,
}

impl CommitWalker {
    pub fn new(
        store: SharedStore,
        api: Arc<ApiClient>,
        gate: Arc<RateGate>,
        config: &HarvestConfig,
    ) -> Self {
        Self {
            store,
            api,
            gate,
            page_size: config.page_size,
        }
    }

    /// Advances the walk for one repository by at most one page
    ///
    /// With `cursor = None` the walk starts from the default branch and
    /// nothing is dropped from the page. With a sha cursor, the first
    /// returned row repeats the cursor commit and is dropped before
    /// persisting. The sha of the oldest persisted row becomes the new
    /// cursor.
    pub async fn advance(
        &self,
        repo_id: i64,
        cursor: Option<&str>,
    ) -> crate::Result<WalkOutcome> {
        let mut page = match self.fetch_page(repo_id, cursor).await {
            Ok(page) => page,

            Err(ApiError::EmptyRepository { .. }) => {
                tracing::info!(repo_id, "repository has no commits");
                return Ok(WalkOutcome::Done);
            }

            Err(ApiError::RateLimited { .. }) => {
                self.gate.sleep_until_reset().await?;
                return Ok(WalkOutcome::RateLimited);
            }

            Err(ApiError::NotFound { log_id } | ApiError::Status { log_id, .. }) => {
                // Abandon further history rather than retry a broken
                // repository forever
                tracing::warn!(repo_id, ?cursor, "commit page unfetchable, dead-lettering");
                let mut store = self.store.lock().unwrap();
                store.record_failed_commits(repo_id, cursor, log_id)?;
                return Ok(WalkOutcome::Done);
            }

            Err(e) => return Err(e.into()),
        };

        if cursor.is_some() && !page.is_empty() {
            // Pagination overlap: the first row is the cursor commit
            page.remove(0);
        }

        if page.is_empty() {
            return Ok(WalkOutcome::Done);
        }

        let commits: Vec<NewCommit> = page.iter().map(to_new_commit).collect();
        let last_sha = page[page.len() - 1].sha.clone();

        let inserted = {
            let mut store = self.store.lock().unwrap();
            store.insert_commit_page(repo_id, &commits)?
        };
        tracing::info!(repo_id, inserted, cursor = %last_sha, "persisted commit page");

        Ok(WalkOutcome::Advanced(last_sha))
    }

    /// Fetches one page, falling back to the source's own default branch
    /// when the conventional branch name does not exist
    async fn fetch_page(
        &self,
        repo_id: i64,
        cursor: Option<&str>,
    ) -> Result<Vec<CommitEntry>, ApiError> {
        match cursor {
            Some(sha) => self.api.list_commits(repo_id, Some(sha), self.page_size).await,
            None => {
                match self
                    .api
                    .list_commits(repo_id, Some(DEFAULT_BRANCH), self.page_size)
                    .await
                {
                    Err(ApiError::NotFound { .. }) => {
                        tracing::debug!(repo_id, "no {} branch, deferring to source default", DEFAULT_BRANCH);
                        self.api.list_commits(repo_id, None, self.page_size).await
                    }
                    other => other,
                }
            }
        }
    }
}

fn to_new_commit(entry: &CommitEntry) -> NewCommit {
    let author = entry.commit.author.as_ref();
    let committer = entry.commit.committer.as_ref();

    NewCommit {
        sha: entry.sha.clone(),
        message: entry.commit.message.clone(),
        author: PersonIdentity {
            name: author.and_then(|a| a.name.clone()),
            email: author.and_then(|a| a.email.clone()),
        },
        committer: PersonIdentity {
            name: committer.and_then(|c| c.name.clone()),
            email: committer.and_then(|c| c.email.clone()),
        },
        authored_at: author.and_then(|a| a.date.map(|d| d.to_rfc3339())),
        committed_at: committer.and_then(|c| c.date.map(|d| d.to_rfc3339())),
    }
}
