//! Authenticated API client
//!
//! This module handles all HTTP traffic to the remote API, including:
//! - Bearer authentication from a local credentials file
//! - Appending every outbound call to the request ledger
//! - Bounded retries for transient failures
//! - Classifying error responses for the crawl components

use crate::config::HarvestConfig;
use crate::github::types::{CommitEntry, QuotaResponse, QuotaSnapshot, RepoDetail, RepoSummary};
use crate::store::{SharedStore, Store, StoreError};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Classified outcome of an API call
///
/// Variants that stem from a logged HTTP response carry the ledger row id
/// so dead-letter records can reference the triggering request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limit exhausted (request log {log_id})")]
    RateLimited { log_id: i64 },

    #[error("not found (request log {log_id})")]
    NotFound { log_id: i64 },

    #[error("empty repository (request log {log_id})")]
    EmptyRepository { log_id: i64 },

    #[error("HTTP {status} (request log {log_id})")]
    Status { status: u16, log_id: i64 },

    #[error("request failed after {attempts} attempts: {source}")]
    Network { attempts: u32, source: reqwest::Error },

    #[error("malformed response body: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to read credentials from {path}: {source}")]
    Credentials {
        path: String,
        source: std::io::Error,
    },

    #[error("request ledger write failed: {0}")]
    Ledger(#[from] StoreError),
}

/// Authenticated client for the remote source API
///
/// The client is stateless aside from the auth credential; every call is
/// appended to the request ledger in the shared store.
pub struct ApiClient {
    http: Client,
    base_url: String,
    store: SharedStore,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ApiClient {
    /// Creates a client with an explicit token and base URL
    ///
    /// # Arguments
    ///
    /// * `token` - Bearer credential for the API
    /// * `base_url` - API root, without a trailing slash
    /// * `store` - Shared store holding the request ledger
    /// * `max_attempts` - Attempts per call before a transient failure escalates
    /// * `retry_delay` - Delay between retries of a single call
    pub fn new(
        token: &str,
        base_url: &str,
        store: SharedStore,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("token {}", token))
            .map_err(|_| ApiError::Credentials {
                path: "<token>".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "credential contains non-header characters",
                ),
            })?;
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .user_agent(concat!("octoharvest/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            max_attempts,
            retry_delay,
        })
    }

    /// Creates a client from the configured credentials file
    ///
    /// The credential is read exactly once, at startup.
    pub fn from_config(config: &HarvestConfig, store: SharedStore) -> Result<Self, ApiError> {
        let token =
            std::fs::read_to_string(&config.credentials_path).map_err(|e| ApiError::Credentials {
                path: config.credentials_path.display().to_string(),
                source: e,
            })?;

        Self::new(
            token.trim(),
            &config.api_base_url,
            store,
            config.max_request_attempts,
            config.retry_delay,
        )
    }

    /// Lists public repositories with identifiers after `since`
    pub async fn list_repositories(&self, since: Option<i64>) -> Result<Vec<RepoSummary>, ApiError> {
        let mut params = Vec::new();
        if let Some(since) = since {
            params.push(("since", since.to_string()));
        }
        self.get_json("/repositories", &params).await
    }

    /// Fetches the full detail for one repository
    pub async fn get_repository(&self, repo_id: i64) -> Result<RepoDetail, ApiError> {
        self.get_json(&format!("/repositories/{}", repo_id), &[])
            .await
    }

    /// Fetches one page of commits reachable backward from `sha`
    ///
    /// With `sha = None` the source's own default branch is used.
    pub async fn list_commits(
        &self,
        repo_id: i64,
        sha: Option<&str>,
        per_page: u32,
    ) -> Result<Vec<CommitEntry>, ApiError> {
        let mut params = vec![("per_page", per_page.to_string())];
        if let Some(sha) = sha {
            params.push(("sha", sha.to_string()));
        }
        self.get_json(&format!("/repositories/{}/commits", repo_id), &params)
            .await
    }

    /// Fetches the current core quota window
    ///
    /// This call is itself ledger-logged but exempt from admission control;
    /// gating it through the admission controller would deadlock.
    pub async fn quota(&self) -> Result<QuotaSnapshot, ApiError> {
        let response: QuotaResponse = self.get_json("/rate_limit", &[]).await?;
        Ok(response.resources.core)
    }

    /// Performs a GET with ledger logging, bounded retries, and
    /// response classification
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = Url::parse_with_params(
            &format!("{}{}", self.base_url, path),
            params.iter().map(|(k, v)| (*k, v.as_str())),
        )?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let started_at = Utc::now().to_rfc3339();
            let timer = Instant::now();
            let response = self.http.get(url.clone()).send().await;
            let duration_ms = timer.elapsed().as_millis() as i64;

            let res = match response {
                Ok(res) => res,
                Err(e) => {
                    if attempt >= self.max_attempts {
                        return Err(ApiError::Network {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    tracing::warn!(url = %url, error = %e, attempt, "network error, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
            };

            let status = res.status();
            if status.is_success() || status.is_redirection() {
                self.log(url.as_str(), &started_at, duration_ms, status.as_u16(), None)?;
                return res.json::<T>().await.map_err(ApiError::Decode);
            }

            let body = res.text().await.unwrap_or_default();
            let log_id = self.log(
                url.as_str(),
                &started_at,
                duration_ms,
                status.as_u16(),
                Some(&body),
            )?;

            if status == StatusCode::TOO_MANY_REQUESTS
                || (status == StatusCode::FORBIDDEN && mentions_rate_limit(&body))
            {
                return Err(ApiError::RateLimited { log_id });
            }

            match status.as_u16() {
                404 => return Err(ApiError::NotFound { log_id }),
                409 => return Err(ApiError::EmptyRepository { log_id }),
                s if status.is_server_error() && attempt < self.max_attempts => {
                    tracing::warn!(url = %url, status = s, attempt, "transient API failure, retrying");
                    // TODO: scale the delay with the attempt number instead
                    // of sleeping a flat interval every retry
                    tokio::time::sleep(self.retry_delay).await;
                }
                s => return Err(ApiError::Status { status: s, log_id }),
            }
        }
    }

    fn log(
        &self,
        url: &str,
        started_at: &str,
        duration_ms: i64,
        status: u16,
        error_body: Option<&str>,
    ) -> Result<i64, ApiError> {
        let mut store = self.store.lock().unwrap();
        Ok(store.log_request(url, started_at, duration_ms, status, error_body)?)
    }
}

/// Distinguishes quota exhaustion from other 403 responses by the message
/// body, the way the remote API reports it
fn mentions_rate_limit(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_lowercase().contains("rate"))
        })
        .unwrap_or(false)
}
