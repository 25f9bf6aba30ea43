//! Pending-repository queue
//!
//! A durable set of repository identifiers awaiting a detail fetch,
//! refilled from the remote listing when it runs dry.

use crate::github::ApiClient;
use crate::store::{SharedStore, Store};
use std::sync::Arc;

/// Durable queue of repositories pending ingestion
///
/// Callers must serialize refill-and-dequeue externally; the ingestor's
/// assignment lock is that region.
pub struct CrawlQueue {
    store: SharedStore,
    api: Arc<ApiClient>,
}

impl CrawlQueue {
    pub fn new(store: SharedStore, api: Arc<ApiClient>) -> Self {
        Self { store, api }
    }

    /// Pops an arbitrary pending identifier, removing it from the queue
    pub fn dequeue(&self) -> crate::Result<Option<i64>> {
        let mut store = self.store.lock().unwrap();
        Ok(store.dequeue_repo()?)
    }

    /// Puts an identifier back, e.g. when its fetch was denied by quota
    pub fn requeue(&self, repo_id: i64) -> crate::Result<()> {
        let mut store = self.store.lock().unwrap();
        store.enqueue_repos(&[repo_id])?;
        Ok(())
    }

    /// Refills the queue by listing repositories after the largest
    /// identifier ever ingested
    ///
    /// # Returns
    ///
    /// The number of identifiers actually enqueued
    pub async fn refill(&self) -> crate::Result<usize> {
        let after = {
            let store = self.store.lock().unwrap();
            store.largest_repo_id()?
        };

        tracing::info!(?after, "queue empty, listing repositories");
        let listed = self.api.list_repositories(after).await?;
        let ids: Vec<i64> = listed.iter().map(|summary| summary.id).collect();

        let mut store = self.store.lock().unwrap();
        Ok(store.enqueue_repos(&ids)?)
    }
}
