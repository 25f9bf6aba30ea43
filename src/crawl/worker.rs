//! Worker loop
//!
//! Each worker runs the same supervising loop: read the checkpoint, make
//! exactly one state transition, write the checkpoint back. Iterations
//! are crash-isolated; any error is logged and followed by a cooldown,
//! and the loop itself never exits.

use crate::crawl::ingest::RepoIngestor;
use crate::crawl::walker::{CommitWalker, WalkOutcome};
use crate::rate::RateGate;
use crate::store::{SharedStore, Store};
use std::sync::Arc;
use std::time::Duration;

/// Quota units for acquiring a repository (listing + detail fetch)
const ACQUIRE_UNITS: u64 = 2;

/// Quota units for one commit page
const WALK_UNITS: u64 = 1;

/// One crawl worker
///
/// A worker owns its checkpoint row exclusively; everything else it
/// touches (gate, queue, store) is shared and internally serialized.
pub struct Worker {
    id: u32,
    store: SharedStore,
    gate: Arc<RateGate>,
    ingestor: Arc<RepoIngestor>,
    walker: Arc<CommitWalker>,
    crash_cooldown: Duration,
}

impl Worker {
    pub fn new(
        id: u32,
        store: SharedStore,
        gate: Arc<RateGate>,
        ingestor: Arc<RepoIngestor>,
        walker: Arc<CommitWalker>,
        crash_cooldown: Duration,
    ) -> Self {
        Self {
            id,
            store,
            gate,
            ingestor,
            walker,
            crash_cooldown,
        }
    }

    /// Returns the worker identifier
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Runs the worker forever
    pub async fn run(&self) {
        tracing::info!("worker started");
        loop {
            if let Err(e) = self.step().await {
                tracing::error!(error = %e, "worker step failed, cooling down");
                tokio::time::sleep(self.crash_cooldown).await;
            }
        }
    }

    /// Performs exactly one state transition
    ///
    /// Idle (no repository in the checkpoint): reserve two quota units,
    /// acquire a repository, and begin walking from its default branch.
    /// Walking: reserve one unit and advance the commit cursor by one
    /// page, clearing the checkpoint when history is exhausted. A denied
    /// reservation sleeps until the window resets and leaves the state
    /// unchanged.
    pub async fn step(&self) -> crate::Result<()> {
        let checkpoint = {
            let store = self.store.lock().unwrap();
            store.checkpoint(self.id)?
        };
        tracing::debug!(?checkpoint, "running step");

        match checkpoint.repo_id {
            None => {
                if !self.gate.try_reserve(ACQUIRE_UNITS).await? {
                    self.gate.sleep_until_reset().await?;
                    return Ok(());
                }

                if let Some(repo_id) = self.ingestor.acquire_next().await? {
                    let mut store = self.store.lock().unwrap();
                    store.set_checkpoint(self.id, Some(repo_id), None)?;
                }
            }

            Some(repo_id) => {
                if !self.gate.try_reserve(WALK_UNITS).await? {
                    self.gate.sleep_until_reset().await?;
                    return Ok(());
                }

                match self
                    .walker
                    .advance(repo_id, checkpoint.cursor.as_deref())
                    .await?
                {
                    WalkOutcome::Advanced(sha) => {
                        let mut store = self.store.lock().unwrap();
                        store.set_checkpoint(self.id, Some(repo_id), Some(&sha))?;
                    }
                    WalkOutcome::Done => {
                        tracing::info!(repo_id, "commit history complete, clearing checkpoint");
                        let mut store = self.store.lock().unwrap();
                        store.set_checkpoint(self.id, None, None)?;
                    }
                    WalkOutcome::RateLimited => {
                        // Same cursor will be retried next iteration
                    }
                }
            }
        }

        Ok(())
    }
}
