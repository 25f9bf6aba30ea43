//! Crawl orchestration
//!
//! This module contains the components that make forward progress:
//! - The pending-repository queue and its refill-from-listing path
//! - Repository ingestion with bounded-retry acquisition
//! - The commit history walker
//! - The per-worker supervising loop and the pool that runs them

mod ingest;
mod queue;
mod walker;
mod worker;

pub use ingest::RepoIngestor;
pub use queue::CrawlQueue;
pub use walker::{CommitWalker, WalkOutcome};
pub use worker::Worker;

use crate::config::HarvestConfig;
use crate::github::ApiClient;
use crate::rate::RateGate;
use crate::store::{SharedStore, SqliteStore};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::Instrument;

/// The assembled harvester: shared components plus a fixed worker pool
pub struct Harvester {
    workers: Vec<Arc<Worker>>,
}

impl Harvester {
    /// Opens the store, reads the credential, and wires up the worker pool
    ///
    /// # Arguments
    ///
    /// * `database` - Path to the SQLite database file
    /// * `config` - Harvester tunables
    pub fn new(database: &Path, config: HarvestConfig) -> crate::Result<Self> {
        let store: SharedStore = Arc::new(Mutex::new(SqliteStore::open(database)?));
        let api = Arc::new(ApiClient::from_config(&config, store.clone())?);
        Ok(Self::with_components(store, api, config))
    }

    /// Wires a harvester from pre-built store and client (used by tests
    /// to point at a mock server)
    pub fn with_components(
        store: SharedStore,
        api: Arc<ApiClient>,
        config: HarvestConfig,
    ) -> Self {
        let gate = Arc::new(RateGate::new(
            api.clone(),
            store.clone(),
            config.quota_leeway,
            config.quota_low_water,
        ));
        let queue = CrawlQueue::new(store.clone(), api.clone());
        let ingestor = Arc::new(RepoIngestor::new(
            store.clone(),
            api.clone(),
            gate.clone(),
            queue,
            &config,
        ));
        let walker = Arc::new(CommitWalker::new(
            store.clone(),
            api.clone(),
            gate.clone(),
            &config,
        ));

        let workers = (1..=config.workers)
            .map(|id| {
                Arc::new(Worker::new(
                    id,
                    store.clone(),
                    gate.clone(),
                    ingestor.clone(),
                    walker.clone(),
                    config.crash_cooldown,
                ))
            })
            .collect();

        Self { workers }
    }

    /// Spawns the worker pool and runs until the process is terminated
    ///
    /// Workers never return on their own; shutdown is abrupt process
    /// termination.
    pub async fn run(&self) -> crate::Result<()> {
        let mut handles = Vec::new();

        for worker in &self.workers {
            let worker = worker.clone();
            let span = tracing::info_span!("worker", id = worker.id());
            handles.push(tokio::spawn(
                async move { worker.run().await }.instrument(span),
            ));
        }

        for handle in handles {
            let _ = handle.await;
        }

        Ok(())
    }
}
