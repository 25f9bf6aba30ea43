//! End-to-end worker tests against a mock API server
//!
//! Each test wires a real store, client, gate, and worker, then drives
//! the worker one step at a time and asserts on the persisted state.

use chrono::Utc;
use octoharvest::crawl::{CommitWalker, CrawlQueue, RepoIngestor, Worker};
use octoharvest::store::{RepoRecord, SharedStore, Store};
use octoharvest::{ApiClient, HarvestConfig, RateGate, SqliteStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> HarvestConfig {
    HarvestConfig {
        retry_delay: Duration::from_millis(5),
        crash_cooldown: Duration::from_millis(5),
        ..HarvestConfig::default()
    }
}

fn test_store() -> SharedStore {
    Arc::new(Mutex::new(SqliteStore::open_in_memory().unwrap()))
}

/// Wires one worker (id 1) against a mock server
fn test_worker(server_uri: &str, store: SharedStore) -> Worker {
    let config = test_config();
    let api = Arc::new(
        ApiClient::new(
            "test-token",
            server_uri,
            store.clone(),
            2,
            config.retry_delay,
        )
        .unwrap(),
    );
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
    Worker::new(1, store, gate, ingestor, walker, config.crash_cooldown)
}

async fn mount_fresh_quota(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "resources": {
                "core": {
                    "limit": 5000,
                    "remaining": 5000,
                    "reset": Utc::now().timestamp() + 3600
                }
            }
        })))
        .mount(server)
        .await;
}

fn repo_detail(id: i64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": format!("repo-{}", id),
        "owner": {"id": 1000 + id},
        "description": "a repository",
        "created_at": "2011-01-26T19:01:12Z",
        "updated_at": "2011-01-26T19:14:43Z",
        "pushed_at": "2011-01-26T19:06:43Z",
        "size": 108,
        "stargazers_count": 80,
        "watchers_count": 80,
        "forks_count": 9,
        "subscribers_count": 42,
        "network_count": 11,
        "language": "Rust",
        "archived": false,
        "license": {"key": "mit"}
    })
}

/// Builds a commit listing page for labelled shas c<lo>..=c<hi>
fn commit_page(lo: u32, hi: u32) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = (lo..=hi)
        .map(|i| {
            serde_json::json!({
                "sha": format!("c{:03}", i),
                "commit": {
                    "message": format!("commit {}", i),
                    "author": {
                        "name": "Alice",
                        "email": "alice@example.com",
                        "date": "2020-05-01T10:00:00Z"
                    },
                    "committer": {
                        "name": "Alice",
                        "email": "alice@example.com",
                        "date": "2020-05-01T10:05:00Z"
                    }
                }
            })
        })
        .collect();
    serde_json::Value::Array(rows)
}

fn manual_repo(id: i64) -> RepoRecord {
    RepoRecord {
        id,
        name: Some(format!("repo-{}", id)),
        owner_id: Some(1000 + id),
        description: None,
        created_at: None,
        updated_at: None,
        pushed_at: None,
        fetched_at: Utc::now().to_rfc3339(),
        size: None,
        stargazers: None,
        watchers: None,
        forks: None,
        subscribers: None,
        network: None,
        language: None,
        archived: false,
        license: None,
    }
}

#[tokio::test]
async fn test_worker_walks_a_repository_to_completion() {
    let server = MockServer::start().await;
    mount_fresh_quota(&server).await;

    Mock::given(method("GET"))
        .and(path("/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 1}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repositories/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repo_detail(1)))
        .mount(&server)
        .await;

    // 250 commits across three full-size pages plus the final
    // cursor-only page; each cursor page repeats the cursor commit
    Mock::given(method("GET"))
        .and(path("/repositories/1/commits"))
        .and(query_param("sha", "master"))
        .respond_with(ResponseTemplate::new(200).set_body_json(commit_page(1, 100)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repositories/1/commits"))
        .and(query_param("sha", "c100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(commit_page(100, 199)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repositories/1/commits"))
        .and(query_param("sha", "c199"))
        .respond_with(ResponseTemplate::new(200).set_body_json(commit_page(199, 250)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repositories/1/commits"))
        .and(query_param("sha", "c250"))
        .respond_with(ResponseTemplate::new(200).set_body_json(commit_page(250, 250)))
        .mount(&server)
        .await;

    let store = test_store();
    let worker = test_worker(&server.uri(), store.clone());

    // Idle: refill the queue, ingest repository 1, begin the walk
    worker.step().await.unwrap();
    {
        let s = store.lock().unwrap();
        assert!(s.repo_exists(1).unwrap());
        let cp = s.checkpoint(1).unwrap();
        assert_eq!(cp.repo_id, Some(1));
        assert_eq!(cp.cursor, None);
    }

    // Three pages, each advancing the cursor to its oldest sha
    worker.step().await.unwrap();
    assert_eq!(
        store.lock().unwrap().checkpoint(1).unwrap().cursor,
        Some("c100".to_string())
    );
    worker.step().await.unwrap();
    assert_eq!(
        store.lock().unwrap().checkpoint(1).unwrap().cursor,
        Some("c199".to_string())
    );
    worker.step().await.unwrap();
    assert_eq!(
        store.lock().unwrap().checkpoint(1).unwrap().cursor,
        Some("c250".to_string())
    );

    // Final page repeats only the cursor commit: history is complete
    worker.step().await.unwrap();
    {
        let s = store.lock().unwrap();
        assert_eq!(s.checkpoint(1).unwrap().repo_id, None);
        assert_eq!(s.count_commits(1).unwrap(), 250);
        // Every commit shares one identity
        assert_eq!(s.count_people().unwrap(), 1);
        assert_eq!(s.count_failed_repos().unwrap(), 0);
    }
}

#[tokio::test]
async fn test_worker_resumes_from_persisted_cursor() {
    let server = MockServer::start().await;
    mount_fresh_quota(&server).await;

    // The repository detail must not be re-fetched on resume
    Mock::given(method("GET"))
        .and(path("/repositories/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repo_detail(1)))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repositories/1/commits"))
        .and(query_param("sha", "c100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(commit_page(100, 101)))
        .mount(&server)
        .await;

    let store = test_store();
    {
        let mut s = store.lock().unwrap();
        s.insert_repo(&manual_repo(1)).unwrap();
        s.set_checkpoint(1, Some(1), Some("c100")).unwrap();
    }

    let worker = test_worker(&server.uri(), store.clone());
    worker.step().await.unwrap();

    let s = store.lock().unwrap();
    assert_eq!(s.checkpoint(1).unwrap().cursor, Some("c101".to_string()));
    // Only the one commit past the cursor was persisted
    assert_eq!(s.count_commits(1).unwrap(), 1);
}

#[tokio::test]
async fn test_unfetchable_repository_is_dead_lettered_and_skipped() {
    let server = MockServer::start().await;
    mount_fresh_quota(&server).await;

    Mock::given(method("GET"))
        .and(path("/repositories/7"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not Found"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 8}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repositories/8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repo_detail(8)))
        .mount(&server)
        .await;

    let store = test_store();
    store.lock().unwrap().enqueue_repos(&[7]).unwrap();

    let worker = test_worker(&server.uri(), store.clone());
    worker.step().await.unwrap();

    let s = store.lock().unwrap();
    assert_eq!(s.count_failed_repos().unwrap(), 1);
    assert!(!s.repo_exists(7).unwrap());
    assert!(s.repo_exists(8).unwrap());
    assert_eq!(s.checkpoint(1).unwrap().repo_id, Some(8));
    // The failed identifier is gone from the queue, not retried
    assert_eq!(s.queue_len().unwrap(), 0);
}

#[tokio::test]
async fn test_empty_repository_completes_without_dead_letter() {
    let server = MockServer::start().await;
    mount_fresh_quota(&server).await;

    Mock::given(method("GET"))
        .and(path("/repositories/5/commits"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(serde_json::json!({"message": "Git Repository is empty."})),
        )
        .mount(&server)
        .await;

    let store = test_store();
    {
        let mut s = store.lock().unwrap();
        s.insert_repo(&manual_repo(5)).unwrap();
        s.set_checkpoint(1, Some(5), None).unwrap();
    }

    let worker = test_worker(&server.uri(), store.clone());
    worker.step().await.unwrap();

    let s = store.lock().unwrap();
    // Having no commits is a normal completion, not a failure
    assert_eq!(s.checkpoint(1).unwrap().repo_id, None);
    assert_eq!(s.count_commits(5).unwrap(), 0);
    assert_eq!(s.count_failed_commits().unwrap(), 0);
}

#[tokio::test]
async fn test_walk_falls_back_when_conventional_branch_is_missing() {
    let server = MockServer::start().await;
    mount_fresh_quota(&server).await;

    // Specific mock first: the conventional branch name does not exist
    Mock::given(method("GET"))
        .and(path("/repositories/5/commits"))
        .and(query_param("sha", "master"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not Found"})),
        )
        .mount(&server)
        .await;
    // The retry without a branch hits the source's own default
    Mock::given(method("GET"))
        .and(path("/repositories/5/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(commit_page(1, 2)))
        .mount(&server)
        .await;

    let store = test_store();
    {
        let mut s = store.lock().unwrap();
        s.insert_repo(&manual_repo(5)).unwrap();
        s.set_checkpoint(1, Some(5), None).unwrap();
    }

    let worker = test_worker(&server.uri(), store.clone());
    worker.step().await.unwrap();

    let s = store.lock().unwrap();
    assert_eq!(s.checkpoint(1).unwrap().cursor, Some("c002".to_string()));
    assert_eq!(s.count_commits(5).unwrap(), 2);
    assert_eq!(s.count_failed_commits().unwrap(), 0);
}

#[tokio::test]
async fn test_broken_commit_listing_abandons_the_walk() {
    let server = MockServer::start().await;
    mount_fresh_quota(&server).await;

    // Both the conventional branch and the fallback fail
    Mock::given(method("GET"))
        .and(path("/repositories/5/commits"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not Found"})),
        )
        .mount(&server)
        .await;

    let store = test_store();
    {
        let mut s = store.lock().unwrap();
        s.insert_repo(&manual_repo(5)).unwrap();
        s.set_checkpoint(1, Some(5), None).unwrap();
    }

    let worker = test_worker(&server.uri(), store.clone());
    worker.step().await.unwrap();

    let s = store.lock().unwrap();
    assert_eq!(s.checkpoint(1).unwrap().repo_id, None);
    assert_eq!(s.count_failed_commits().unwrap(), 1);
}

#[tokio::test]
async fn test_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");

    {
        let mut store = SqliteStore::open(&db_path).unwrap();
        store.insert_repo(&manual_repo(1)).unwrap();
        store.set_checkpoint(1, Some(1), Some("c042")).unwrap();
        store.enqueue_repos(&[2, 3]).unwrap();
    }

    let store = SqliteStore::open(&db_path).unwrap();
    assert!(store.repo_exists(1).unwrap());
    assert_eq!(store.checkpoint(1).unwrap().cursor, Some("c042".to_string()));
    assert_eq!(store.queue_len().unwrap(), 2);
}
