//! Repository ingestion
//!
//! This module acquires the next fetchable repository for a worker:
//! dequeue (refilling the queue when empty), fetch the detail, classify
//! the outcome, persist or dead-letter, and hand the identifier back.

use crate::config::HarvestConfig;
use crate::crawl::queue::CrawlQueue;
use crate::github::{ApiClient, ApiError, RepoDetail};
use crate::rate::RateGate;
use crate::store::{RepoRecord, SharedStore, Store};
use crate::HarvestError;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Acquires repositories for workers, one at a time
///
/// The assignment lock serializes the whole dequeue-refill-fetch sequence
/// so two workers can never race to refill the queue or claim the same
/// identifier.
pub struct RepoIngestor {
    store: SharedStore,
    api: Arc<ApiClient>,
    gate: Arc<RateGate>,
    queue: CrawlQueue,
    max_attempts: u32,
    assign_lock: Mutex<()>,
}

impl RepoIngestor {
    pub fn new(
        store: SharedStore,
        api: Arc<ApiClient>,
        gate: Arc<RateGate>,
        queue: CrawlQueue,
        config: &HarvestConfig,
    ) -> Self {
        Self {
            store,
            api,
            gate,
            queue,
            max_attempts: config.max_acquire_attempts,
            assign_lock: Mutex::new(()),
        }
    }

    /// Acquires the next fetchable repository
    ///
    /// Tries queued identifiers until one is successfully ingested.
    /// Permanent per-repository failures are dead-lettered and the next
    /// identifier is tried; quota exhaustion re-enqueues the identifier,
    /// sleeps until reset, and reports transient-empty (`Ok(None)`).
    /// The attempt bound is a circuit breaker against a pathological run
    /// of unfetchable repositories burning quota on failures alone.
    pub async fn acquire_next(&self) -> crate::Result<Option<i64>> {
        let guard = self.assign_lock.lock().await;

        for attempt in 1..=self.max_attempts {
            let repo_id = match self.queue.dequeue()? {
                Some(id) => id,
                None => {
                    let added = self.queue.refill().await?;
                    tracing::info!(added, "refilled repository queue");
                    match self.queue.dequeue()? {
                        Some(id) => id,
                        None => {
                            tracing::warn!("listing returned nothing new, nothing to ingest");
                            return Ok(None);
                        }
                    }
                }
            };

            match self.api.get_repository(repo_id).await {
                Ok(detail) => {
                    let record = snapshot(&detail);
                    {
                        let mut store = self.store.lock().unwrap();
                        store.insert_repo(&record)?;
                    }
                    tracing::info!(repo_id, "ingested repository");
                    return Ok(Some(repo_id));
                }

                Err(ApiError::RateLimited { .. }) => {
                    // Put the identifier back before sleeping so it is
                    // not lost from the queue
                    self.queue.requeue(repo_id)?;
                    drop(guard);
                    self.gate.sleep_until_reset().await?;
                    return Ok(None);
                }

                Err(
                    ApiError::NotFound { log_id }
                    | ApiError::EmptyRepository { log_id }
                    | ApiError::Status { log_id, .. },
                ) => {
                    tracing::warn!(repo_id, attempt, "repository unfetchable, dead-lettering");
                    let mut store = self.store.lock().unwrap();
                    store.record_failed_repo(repo_id, log_id)?;
                    // Already removed from the queue by the dequeue;
                    // try the next identifier
                }

                Err(e) => return Err(e.into()),
            }
        }

        Err(HarvestError::AcquireBudgetExhausted {
            attempts: self.max_attempts,
        })
    }
}

/// Builds the persisted snapshot from a repository detail
fn snapshot(detail: &RepoDetail) -> RepoRecord {
    RepoRecord {
        id: detail.id,
        name: detail.name.clone(),
        owner_id: detail.owner.as_ref().map(|owner| owner.id),
        description: detail.description.clone(),
        created_at: detail.created_at.map(|t| t.to_rfc3339()),
        updated_at: detail.updated_at.map(|t| t.to_rfc3339()),
        pushed_at: detail.pushed_at.map(|t| t.to_rfc3339()),
        fetched_at: Utc::now().to_rfc3339(),
        size: detail.size,
        stargazers: detail.stargazers_count,
        watchers: detail.watchers_count,
        forks: detail.forks_count,
        subscribers: detail.subscribers_count,
        network: detail.network_count,
        language: detail.language.clone(),
        archived: detail.archived,
        license: detail
            .license
            .as_ref()
            .and_then(|license| license.key.clone()),
    }
}
