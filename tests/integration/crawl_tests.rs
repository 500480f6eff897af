//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run complete
//! crawls against them, checking the task store and the mirrored files.

use site_mirror::config::{Config, ConsistencyMode, RuntimeSettings};
use site_mirror::crawler::{cancel_pair, crawl, CancelSignal, PoolReport};
use site_mirror::output::PidLock;
use site_mirror::storage::{RunStatus, SqliteTaskStore, Task, TaskStore};
use site_mirror::{MirrorError, ProcessedOutcome};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds run settings pointing at the mock server, with short pauses
fn settings_for(
    server: &MockServer,
    dir: &TempDir,
    workers: u32,
    mode: ConsistencyMode,
) -> Arc<RuntimeSettings> {
    let mut config = Config::default();
    config.crawler.start_url = Some(format!("{}/", server.uri()));
    config.crawler.workers = workers;
    config.crawler.http_timeout = 2;
    config.crawler.pause_between_jobs = 10;
    config.crawler.consistency = mode;
    config.output.output_dir = Some(dir.path().to_path_buf());
    config.output.log_to_stdout = true;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.user_agent.crawler_version = "1.0.0".to_string();

    Arc::new(RuntimeSettings::resolve(&config).expect("test settings should resolve"))
}

fn page_url(server: &MockServer, p: &str) -> String {
    format!("{}{}", server.uri(), p)
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

async fn mount_page(server: &MockServer, p: &str, body: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(html(body))
        .expect(times)
        .mount(server)
        .await;
}

async fn run_crawl(settings: Arc<RuntimeSettings>, cancel: CancelSignal) -> PoolReport {
    tokio::time::timeout(Duration::from_secs(30), crawl(settings, cancel))
        .await
        .expect("crawl did not finish in time")
        .expect("crawl failed")
}

async fn run_to_completion(settings: Arc<RuntimeSettings>) -> PoolReport {
    let (_handle, signal) = cancel_pair();
    run_crawl(settings, signal).await
}

/// Processed tasks keyed by URL path
fn processed(settings: &RuntimeSettings) -> HashMap<String, ProcessedOutcome> {
    let store = SqliteTaskStore::open_for_stats(&settings.store_path)
        .expect("store should exist after a crawl");
    store
        .processed_tasks()
        .expect("failed to list processed tasks")
        .into_iter()
        .map(|(task, outcome)| {
            let url = task.to_url().expect("stored task is a valid URL");
            (url.path().to_string(), outcome)
        })
        .collect()
}

fn temp_files(root: &Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let p = entry.path();
            if p.is_dir() {
                stack.push(p);
            } else if p.to_string_lossy().ends_with(".temp") {
                found.push(p);
            }
        }
    }
    found
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_crawl_single_site() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<html><body>
            <a href="/a">A</a>
            <a href="/a#section">A again</a>
            <a href="https://other.com/x">Elsewhere</a>
        </body></html>"#,
        1,
    )
    .await;
    mount_page(&server, "/a", "<html><body>leaf</body></html>", 1).await;

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&server, &dir, 1, ConsistencyMode::Split);

    let report = run_to_completion(Arc::clone(&settings)).await;
    assert!(report.drained());
    assert_eq!(report.tasks_completed(), 2);
    assert_eq!(report.tasks_abandoned(), 0);

    let done = processed(&settings);
    assert_eq!(done.len(), 2);
    assert_eq!(done.get("/"), Some(&ProcessedOutcome::Stored));
    assert_eq!(done.get("/a"), Some(&ProcessedOutcome::Stored));

    let docs = &settings.documents_root;
    assert!(docs.join("index.html").is_file());
    assert!(docs.join("index").is_file(), "root marker should exist");
    let leaf = std::fs::read_to_string(docs.join("a.html")).unwrap();
    assert_eq!(leaf, "<html><body>leaf</body></html>");

    let store = SqliteTaskStore::open_for_stats(&settings.store_path).unwrap();
    assert_eq!(store.stats().unwrap().pending, 0);
    let run = store.latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_index_html_resolves_to_stored_root() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<a href="/index.html">home</a>"#,
        1,
    )
    .await;
    mount_page(&server, "/index.html", "never served", 0).await;

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&server, &dir, 1, ConsistencyMode::Split);

    let report = run_to_completion(Arc::clone(&settings)).await;
    assert!(report.drained());

    let done = processed(&settings);
    assert_eq!(done.get("/"), Some(&ProcessedOutcome::Stored));
    assert_eq!(
        done.get("/index.html"),
        Some(&ProcessedOutcome::AlreadyPresent)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_run_fetches_nothing() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/a">A</a>"#, 1).await;
    mount_page(&server, "/a", "leaf", 1).await;

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&server, &dir, 2, ConsistencyMode::Split);
    assert!(run_to_completion(Arc::clone(&settings)).await.drained());
    server.verify().await;

    // Same server, same output dir: everything is already processed
    server.reset().await;
    mount_page(&server, "/", "changed", 0).await;
    mount_page(&server, "/a", "changed", 0).await;

    let report = run_to_completion(Arc::clone(&settings)).await;
    assert!(report.drained());
    assert_eq!(report.tasks_completed(), 0);

    let store = SqliteTaskStore::open_for_stats(&settings.store_path).unwrap();
    assert_eq!(store.count_runs().unwrap(), 2);
    assert_eq!(store.stats().unwrap().processed, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resumes_from_persisted_queue() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "root", 0).await;
    mount_page(&server, "/b", "<p>b</p>", 1).await;

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&server, &dir, 1, ConsistencyMode::Split);
    settings.prepare_dirs().unwrap();

    // Simulate an earlier run that processed the root and stopped
    {
        let seed = Task::from_url(&settings.start_url);
        let store =
            SqliteTaskStore::open(&settings.store_path, &seed, ConsistencyMode::Split).unwrap();
        let root = store.dequeue().unwrap().unwrap();
        store.mark_processed(&root, ProcessedOutcome::Stored).unwrap();
        store
            .enqueue(&Task::parse(&page_url(&server, "/b")).unwrap())
            .unwrap();
        store.close().unwrap();
    }

    let report = run_to_completion(Arc::clone(&settings)).await;
    assert!(report.drained());
    assert_eq!(report.tasks_completed(), 1);

    let done = processed(&settings);
    assert_eq!(done.get("/b"), Some(&ProcessedOutcome::Stored));
    assert!(settings.documents_root.join("b.html").is_file());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_existing_document_is_rescanned_for_links() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "should not be fetched", 0).await;
    mount_page(&server, "/c", "<p>c</p>", 1).await;

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&server, &dir, 1, ConsistencyMode::Split);
    settings.prepare_dirs().unwrap();
    std::fs::write(
        settings.documents_root.join("index.html"),
        r#"<html><a href="/c">c</a></html>"#,
    )
    .unwrap();

    let report = run_to_completion(Arc::clone(&settings)).await;
    assert!(report.drained());

    let done = processed(&settings);
    assert_eq!(done.get("/"), Some(&ProcessedOutcome::AlreadyPresent));
    assert_eq!(done.get("/c"), Some(&ProcessedOutcome::Stored));
    assert!(settings.documents_root.join("c.html").is_file());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_workers_fetch_each_page_once() {
    const PAGES: usize = 20;

    let server = MockServer::start().await;
    let index: String = (0..PAGES)
        .map(|i| format!(r#"<a href="/p{}">page {}</a>"#, i, i))
        .collect();
    mount_page(&server, "/", &index, 1).await;

    for i in 0..PAGES {
        let body = format!(
            r#"<a href="/">home</a><a href="/p{}">next</a><a href="p{}#top">self</a>"#,
            (i + 1) % PAGES,
            i
        );
        mount_page(&server, &format!("/p{}", i), &body, 1).await;
    }

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&server, &dir, 4, ConsistencyMode::Split);

    let report = run_to_completion(Arc::clone(&settings)).await;
    assert!(report.drained());
    assert_eq!(report.workers.len(), 4);
    assert_eq!(report.tasks_completed(), (PAGES + 1) as u64);

    let done = processed(&settings);
    assert_eq!(done.len(), PAGES + 1);
    assert!(done.values().all(|o| *o == ProcessedOutcome::Stored));

    for i in 0..PAGES {
        assert!(settings
            .documents_root
            .join(format!("p{}.html", i))
            .is_file());
    }
    assert!(temp_files(&settings.documents_root).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_before_start() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "root", 0).await;

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&server, &dir, 2, ConsistencyMode::Split);

    let (handle, signal) = cancel_pair();
    handle.cancel();

    let report = run_crawl(Arc::clone(&settings), signal).await;
    assert!(report.cancelled());
    assert!(!report.drained());
    assert_eq!(report.tasks_completed(), 0);

    let store = SqliteTaskStore::open_for_stats(&settings.store_path).unwrap();
    assert_eq!(
        store.pending_tasks().unwrap(),
        vec![Task::from_url(&settings.start_url)]
    );
    assert_eq!(
        store.latest_run().unwrap().unwrap().status,
        RunStatus::Interrupted
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rejections_are_terminal() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<a href="/missing">gone</a><img src="/logo.png">"#,
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(vec![0x89, 0x50, 0x4e, 0x47], "image/png"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&server, &dir, 2, ConsistencyMode::Split);

    let report = run_to_completion(Arc::clone(&settings)).await;
    assert!(report.drained());

    let done = processed(&settings);
    assert_eq!(done.get("/missing"), Some(&ProcessedOutcome::BadStatus));
    assert_eq!(
        done.get("/logo.png"),
        Some(&ProcessedOutcome::UnsupportedContentType)
    );
    assert!(!settings.documents_root.join("missing.html").exists());
    assert!(!settings.documents_root.join("logo.png").exists());

    // Rejected tasks are not retried on the next run
    let report = run_to_completion(Arc::clone(&settings)).await;
    assert_eq!(report.tasks_completed(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_journaled_crawl_leaves_no_claims() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<a href="/a">A</a><a href="/docs/">docs</a>"#,
        1,
    )
    .await;
    mount_page(&server, "/a", "leaf", 1).await;
    mount_page(&server, "/docs/", r#"<a href="../a">up</a>"#, 1).await;

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&server, &dir, 2, ConsistencyMode::Journaled);

    let report = run_to_completion(Arc::clone(&settings)).await;
    assert!(report.drained());

    let store = SqliteTaskStore::open_for_stats(&settings.store_path).unwrap();
    let stats = store.stats().unwrap();
    assert_eq!(stats.claimed, 0);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.processed, 3);

    assert!(settings.documents_root.join("docs/index.html").is_file());
    assert!(settings.documents_root.join("docs/index").is_file());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refuses_to_run_while_locked() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "root", 0).await;

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&server, &dir, 1, ConsistencyMode::Split);
    settings.prepare_dirs().unwrap();

    let _held = PidLock::acquire(&settings.crawl_root).unwrap();

    let (_handle, signal) = cancel_pair();
    let result = crawl(Arc::clone(&settings), signal).await;
    assert!(matches!(result, Err(MirrorError::AlreadyRunning { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_mid_task_finishes_current_task() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/a">A</a>"#).set_delay(Duration::from_millis(600)))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/a", "leaf", 0).await;

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&server, &dir, 1, ConsistencyMode::Split);

    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.cancel();
    });

    let report = run_crawl(Arc::clone(&settings), signal).await;
    assert!(report.cancelled());
    assert_eq!(report.tasks_completed(), 1);

    let done = processed(&settings);
    assert_eq!(done.len(), 1);
    assert_eq!(done.get("/"), Some(&ProcessedOutcome::Stored));
    assert!(settings.documents_root.join("index.html").is_file());

    let store = SqliteTaskStore::open_for_stats(&settings.store_path).unwrap();
    assert_eq!(
        store.pending_tasks().unwrap(),
        vec![Task::parse(&page_url(&server, "/a")).unwrap()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeout_is_recorded_as_network_error() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/slow">slow</a>"#, 1).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("late").set_delay(Duration::from_secs(4)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let settings = settings_for(&server, &dir, 2, ConsistencyMode::Split);

    let report = run_to_completion(Arc::clone(&settings)).await;
    assert!(report.drained());
    assert_eq!(report.tasks_abandoned(), 0);

    let done = processed(&settings);
    assert_eq!(done.get("/slow"), Some(&ProcessedOutcome::NetworkError));
    assert!(!settings.documents_root.join("slow.html").exists());
    assert!(temp_files(&settings.documents_root).is_empty());
}
