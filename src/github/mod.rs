//! GitHub API surface
//!
//! This module contains everything that talks to the remote API:
//! - serde models for the consumed response fields
//! - the authenticated client with retry, classification, and
//!   request-ledger logging

mod client;
mod types;

pub use client::{ApiClient, ApiError};
pub use types::{
    CommitDetail, CommitEntry, GitIdentity, QuotaSnapshot, RepoDetail, RepoLicense, RepoOwner,
    RepoSummary,
};
