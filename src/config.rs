//! Harvester configuration
//!
//! All tunables live in one place with defaults matching the production
//! deployment: two workers against the GitHub API's 5000-requests-per-hour
//! core quota.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a harvester instance
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Number of concurrent worker loops
    pub workers: u32,

    /// Commits fetched per history page
    pub page_size: u32,

    /// Safety margin subtracted from the nominal quota limit
    pub quota_leeway: u64,

    /// Remaining-quota level above which sleeping until reset is treated
    /// as a caller error rather than honored
    pub quota_low_water: u64,

    /// Maximum repositories tried per acquisition before giving up
    pub max_acquire_attempts: u32,

    /// Attempts per API call before a transient failure escalates
    pub max_request_attempts: u32,

    /// Delay between transient-failure retries of a single API call
    pub retry_delay: Duration,

    /// Cooldown after a worker iteration fails
    pub crash_cooldown: Duration,

    /// Local file holding the bearer token, read once at startup
    pub credentials_path: PathBuf,

    /// Base URL of the remote API
    pub api_base_url: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            page_size: 100,
            quota_leeway: 2,
            quota_low_water: 10,
            max_acquire_attempts: 50,
            max_request_attempts: 5,
            retry_delay: Duration::from_secs(4),
            crash_cooldown: Duration::from_secs(10),
            credentials_path: PathBuf::from("creds.txt"),
            api_base_url: "https://api.github.com".to_string(),
        }
    }
}
