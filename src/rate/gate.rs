//! Quota window admission controller
//!
//! All workers share one gate. A reservation either fits under the
//! window's budget (limit minus a safety leeway) or is denied; denied
//! callers sleep until the window turns over. The gate's cached view is
//! reconciled against the request ledger on every window refresh, so a
//! process restart mid-window starts from the ledger's count instead
//! of zero.

use crate::github::{ApiClient, QuotaSnapshot};
use crate::store::{SharedStore, Store};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Length of the remote quota window
const WINDOW_SECS: i64 = 3600;

/// Coarse polling interval while waiting for a reset
const COARSE_SLEEP_SECS: i64 = 8;

/// Within this many seconds of the reset, sleep the exact remainder
const FINE_SLEEP_WITHIN_SECS: i64 = 10;

#[derive(Debug, Default)]
struct GateState {
    window: Option<QuotaSnapshot>,
    /// Requests charged against the current window: the ledger count at
    /// the last refresh plus reservations granted since
    used: u64,
}

/// Shared admission controller for the API request budget
pub struct RateGate {
    api: Arc<ApiClient>,
    store: SharedStore,
    leeway: u64,
    low_water: u64,
    state: Mutex<GateState>,
}

impl RateGate {
    pub fn new(api: Arc<ApiClient>, store: SharedStore, leeway: u64, low_water: u64) -> Self {
        Self {
            api,
            store,
            leeway,
            low_water,
            state: Mutex::new(GateState::default()),
        }
    }

    /// Reserves `n` request units against the current window
    ///
    /// Returns `Ok(false)` without mutating the counter when the
    /// reservation would push usage past `limit - leeway`, after one
    /// refresh to rule out a stale window. The whole sequence runs under
    /// one lock, so checks and increments are atomic across workers.
    pub async fn try_reserve(&self, n: u64) -> crate::Result<bool> {
        let mut state = self.state.lock().await;
        let now = Utc::now().timestamp();

        let stale = !state.window.as_ref().is_some_and(|w| w.reset > now);
        if stale {
            self.refresh(&mut state).await?;
        }

        if state.used + n > self.budget(&state) {
            // The cached window may have just turned over
            self.refresh(&mut state).await?;
            if state.used + n > self.budget(&state) {
                tracing::debug!(
                    requested = n,
                    used = state.used,
                    budget = self.budget(&state),
                    "reservation denied"
                );
                return Ok(false);
            }
        }

        state.used += n;
        Ok(true)
    }

    /// Blocks the calling worker until the quota window turns over
    ///
    /// Polls in coarse steps, switching to a fine-grained "remainder plus
    /// one" sleep close to the reset. If remaining quota is still above
    /// the low-water mark this is a caller error (a reservation was
    /// bypassed): log and return without sleeping.
    pub async fn sleep_until_reset(&self) -> crate::Result<()> {
        let quota = self.api.quota().await?;

        if quota.remaining > self.low_water {
            tracing::warn!(
                remaining = quota.remaining,
                "sleep requested with quota to spare; reservation was bypassed"
            );
            return Ok(());
        }

        tracing::info!(reset = quota.reset, "quota exhausted, sleeping until reset");
        loop {
            let left = quota.reset - Utc::now().timestamp();
            if left <= 0 {
                break;
            }
            let step = if left < FINE_SLEEP_WITHIN_SECS {
                left + 1
            } else {
                COARSE_SLEEP_SECS
            };
            tokio::time::sleep(Duration::from_secs(step as u64)).await;
        }

        tracing::info!("quota window turned over");
        Ok(())
    }

    fn budget(&self, state: &GateState) -> u64 {
        state
            .window
            .as_ref()
            .map(|w| w.limit.saturating_sub(self.leeway))
            .unwrap_or(0)
    }

    /// Re-fetches the quota window and reconciles the usage counter
    /// against the request ledger
    ///
    /// Within an unchanged window the counter can only grow: granted
    /// reservations may not be ledger-visible yet, so the reconciled
    /// value is the max of the two.
    async fn refresh(&self, state: &mut GateState) -> crate::Result<()> {
        let quota = self.api.quota().await?;

        let window_end = rfc3339(quota.reset);
        let window_start = rfc3339(quota.reset - WINDOW_SECS);
        let ledger_used = {
            let store = self.store.lock().unwrap();
            store.requests_between(&window_start, &window_end)?
        };

        let same_window = state
            .window
            .as_ref()
            .is_some_and(|w| w.reset == quota.reset);
        state.used = if same_window {
            state.used.max(ledger_used)
        } else {
            ledger_used
        };
        state.window = Some(quota);

        tracing::debug!(
            limit = quota.limit,
            reset = quota.reset,
            used = state.used,
            "quota window refreshed"
        );
        Ok(())
    }
}

fn rfc3339(unix_secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(unix_secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use std::sync::Mutex as StdMutex;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_store() -> SharedStore {
        Arc::new(StdMutex::new(SqliteStore::open_in_memory().unwrap()))
    }

    fn test_api(base_url: &str, store: SharedStore) -> Arc<ApiClient> {
        Arc::new(
            ApiClient::new("test-token", base_url, store, 2, Duration::from_millis(5)).unwrap(),
        )
    }

    fn quota_body(limit: u64, remaining: u64, reset: i64) -> serde_json::Value {
        serde_json::json!({
            "resources": {
                "core": {"limit": limit, "remaining": remaining, "reset": reset}
            }
        })
    }

    async fn mount_quota(server: &MockServer, limit: u64, remaining: u64, reset: i64) {
        Mock::given(method("GET"))
            .and(path("/rate_limit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(quota_body(
                limit, remaining, reset,
            )))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_reservations_fit_under_budget_then_first_overflow_denied() {
        let server = MockServer::start().await;
        // Budget is limit - leeway = 8
        mount_quota(&server, 10, 10, Utc::now().timestamp() + 3600).await;

        let store = test_store();
        let api = test_api(&server.uri(), store.clone());
        let gate = RateGate::new(api, store, 2, 10);

        // The first refresh's own quota call lands in the ledger: 1 unit
        assert!(gate.try_reserve(3).await.unwrap()); // used 4
        assert!(gate.try_reserve(3).await.unwrap()); // used 7
        assert!(!gate.try_reserve(3).await.unwrap()); // 10 > 8, denied

        // The denied call must not have charged anything
        assert!(gate.try_reserve(1).await.unwrap()); // used 8
        assert!(!gate.try_reserve(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_restart_reconciles_from_ledger() {
        let server = MockServer::start().await;
        let reset = Utc::now().timestamp() + 3600;
        mount_quota(&server, 10, 4, reset).await;

        let store = test_store();
        // Six requests already in the ledger from a previous process life
        {
            let mut s = store.lock().unwrap();
            let now = Utc::now().to_rfc3339();
            for i in 0..6 {
                s.log_request(&format!("https://api.example.com/{}", i), &now, 10, 200, None)
                    .unwrap();
            }
        }

        let api = test_api(&server.uri(), store.clone());
        let gate = RateGate::new(api, store, 2, 10);

        // Ledger shows 6 plus the refresh's quota call: one unit left of 8
        assert!(gate.try_reserve(1).await.unwrap());
        assert!(!gate.try_reserve(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_sleep_guard_refuses_with_quota_to_spare() {
        let server = MockServer::start().await;
        mount_quota(&server, 5000, 4000, Utc::now().timestamp() + 3600).await;

        let store = test_store();
        let api = test_api(&server.uri(), store.clone());
        let gate = RateGate::new(api, store, 2, 10);

        let begun = Instant::now();
        gate.sleep_until_reset().await.unwrap();
        assert!(begun.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_exhausted_window_denies_then_recovers_after_reset() {
        let server = MockServer::start().await;
        let now = Utc::now().timestamp();
        let reset = now + 2;

        // Exhausted window, served for the calls made before the turnover:
        // deny-path refresh x2, then the sleep's own quota check
        Mock::given(method("GET"))
            .and(path("/rate_limit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(quota_body(5, 0, reset)))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        // Fresh window after the turnover
        mount_quota(&server, 5000, 4998, now + 3600).await;

        let store = test_store();
        // Fill the old window's budget (5 - 2 = 3) in the ledger
        {
            let mut s = store.lock().unwrap();
            let started = Utc::now().to_rfc3339();
            for i in 0..3 {
                s.log_request(&format!("https://api.example.com/{}", i), &started, 10, 200, None)
                    .unwrap();
            }
        }

        let api = test_api(&server.uri(), store.clone());
        let gate = RateGate::new(api, store, 2, 10);

        assert!(!gate.try_reserve(1).await.unwrap());

        gate.sleep_until_reset().await.unwrap();
        assert!(Utc::now().timestamp() >= reset);

        assert!(gate.try_reserve(1).await.unwrap());
    }
}
