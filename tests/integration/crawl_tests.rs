//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end through the default HTTP fetcher and HTML
//! extractor.

use async_trait::async_trait;
use ripple_crawl::config::Config;
use ripple_crawl::crawler::{CrawlController, CrawlPolicy, CrawlSummary, Page};
use ripple_crawl::frontier::Frontier;
use ripple_crawl::storage::{open_storage, KvStore, Table};
use ripple_crawl::{CrawlError, WebUrl};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records every visited URL
#[derive(Default)]
struct RecordingPolicy {
    visited: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingPolicy {
    fn failing_on(url: String) -> Self {
        Self {
            fail_on: Some(url),
            ..Self::default()
        }
    }

    fn visited(&self) -> Vec<String> {
        let mut visited = self.visited.lock().unwrap().clone();
        visited.sort();
        visited
    }
}

#[async_trait]
impl CrawlPolicy for RecordingPolicy {
    async fn visit(&self, page: &Page) -> Result<(), CrawlError> {
        if self.fail_on.as_deref() == Some(page.url.url.as_str()) {
            return Err(CrawlError::ParseFailure {
                url: page.url.url.clone(),
                reason: "rejected by test".to_string(),
            });
        }
        self.visited.lock().unwrap().push(page.url.url.clone());
        Ok(())
    }
}

/// Creates a fast-cycling test configuration
fn create_test_config() -> Config {
    let mut config = Config::default();
    config.user_agent.crawler_name = "TestBot".to_string();
    config.crawler.max_depth = 3;
    config.crawler.batch_size = 2;
    config.crawler.monitor_interval = 20;
    config.crawler.termination_grace = 50;
    config.crawler.claim_timeout = 50;
    config.crawler.empty_claim_sleep = 10;
    config.politeness.delay = 0;
    config
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/plain"))
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, page: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
        .mount(server)
        .await;
}

async fn run(controller: &CrawlController, workers: usize) -> CrawlSummary {
    tokio::time::timeout(Duration::from_secs(10), controller.start(workers))
        .await
        .expect("crawl did not finish in time")
        .expect("crawl failed")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_crawl_single_site() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(
        &server,
        "/",
        format!(
            r#"<html><head><title>Home</title></head><body>
            <a href="{base}/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            <a href="/#top">Top</a>
            </body></html>"#
        ),
    )
    .await;
    mount_page(
        &server,
        "/page1",
        r#"<a href="/page3">Page 3</a> <a href="/">Home</a>"#.to_string(),
    )
    .await;
    mount_page(&server, "/page2", "<p>No links</p>".to_string()).await;
    mount_page(
        &server,
        "/page3",
        r#"<a href="/page1">Back</a>"#.to_string(),
    )
    .await;

    let policy = Arc::new(RecordingPolicy::default());
    let controller = CrawlController::new(Arc::new(create_test_config()), policy.clone()).unwrap();
    controller.add_seed(&base).await.unwrap();

    let summary = run(&controller, 3).await;

    let mut expected = vec![
        format!("{base}/"),
        format!("{base}/page1"),
        format!("{base}/page2"),
        format!("{base}/page3"),
    ];
    expected.sort();
    assert_eq!(policy.visited(), expected);
    assert_eq!(summary.pages_fetched, 4);
    assert_eq!(summary.pages_visited, 4);
    assert_eq!(summary.frontier.scheduled, 4);
    assert_eq!(summary.frontier.pending, 0);
    assert!(!summary.halted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_robots_disallow_is_respected() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_robots(&server, "User-agent: *\nDisallow: /private").await;
    mount_page(
        &server,
        "/",
        r#"<a href="/private/secret">Secret</a> <a href="/public">Public</a>"#.to_string(),
    )
    .await;
    mount_page(&server, "/public", "<p>Hello</p>".to_string()).await;
    Mock::given(method("GET"))
        .and(path("/private/secret"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let policy = Arc::new(RecordingPolicy::default());
    let controller = CrawlController::new(Arc::new(create_test_config()), policy.clone()).unwrap();
    controller.add_seed(&base).await.unwrap();

    let summary = run(&controller, 2).await;

    assert_eq!(
        policy.visited(),
        vec![format!("{base}/"), format!("{base}/public")]
    );
    assert_eq!(summary.disallowed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disallowed_seed_is_not_scheduled() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_robots(&server, "User-agent: *\nDisallow: /").await;

    let controller = CrawlController::new(
        Arc::new(create_test_config()),
        Arc::new(RecordingPolicy::default()),
    )
    .unwrap();

    assert_eq!(controller.add_seed(&base).await.unwrap(), None);
    let summary = run(&controller, 2).await;
    assert_eq!(summary.frontier.scheduled, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_zero_seeds_finish_promptly() {
    let controller = CrawlController::new(
        Arc::new(create_test_config()),
        Arc::new(RecordingPolicy::default()),
    )
    .unwrap();

    let summary = run(&controller, 4).await;

    assert_eq!(summary.pages_fetched, 0);
    assert_eq!(summary.frontier.scheduled, 0);
    assert!(controller.is_finished());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_max_depth_limits_scheduling() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", r#"<a href="/a">a</a>"#.to_string()).await;
    mount_page(&server, "/a", r#"<a href="/b">b</a>"#.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config();
    config.crawler.max_depth = 1;

    let policy = Arc::new(RecordingPolicy::default());
    let controller = CrawlController::new(Arc::new(config), policy.clone()).unwrap();
    controller.add_seed(&base).await.unwrap();

    let summary = run(&controller, 2).await;

    assert_eq!(policy.visited(), vec![format!("{base}/"), format!("{base}/a")]);
    assert_eq!(summary.frontier.scheduled, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redirect_target_is_crawled() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", r#"<a href="/old">old</a>"#.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&server)
        .await;
    mount_page(&server, "/new", "<p>Moved here</p>".to_string()).await;

    let policy = Arc::new(RecordingPolicy::default());
    let controller = CrawlController::new(Arc::new(create_test_config()), policy.clone()).unwrap();
    controller.add_seed(&base).await.unwrap();

    let summary = run(&controller, 2).await;

    assert_eq!(
        policy.visited(),
        vec![format!("{base}/"), format!("{base}/new")]
    );
    assert_eq!(summary.redirects, 1);
    assert_eq!(summary.frontier.scheduled, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unexpected_status_does_not_stop_crawl() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(
        &server,
        "/",
        r#"<a href="/gone">gone</a> <a href="/ok">ok</a>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_page(&server, "/ok", "<p>fine</p>".to_string()).await;

    let policy = Arc::new(RecordingPolicy::default());
    let controller = CrawlController::new(Arc::new(create_test_config()), policy.clone()).unwrap();
    controller.add_seed(&base).await.unwrap();

    let summary = run(&controller, 2).await;

    assert_eq!(policy.visited(), vec![format!("{base}/"), format!("{base}/ok")]);
    assert_eq!(summary.unexpected_status, 1);
    assert!(!summary.halted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_halt_on_error_stops_crawl() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", r#"<a href="/a">a</a>"#.to_string()).await;
    mount_page(&server, "/a", r#"<a href="/b">b</a>"#.to_string()).await;
    mount_page(&server, "/b", "<p>end</p>".to_string()).await;

    let mut config = create_test_config();
    config.crawler.halt_on_error = true;

    let policy = Arc::new(RecordingPolicy::failing_on(format!("{base}/a")));
    let controller = CrawlController::new(Arc::new(config), policy.clone()).unwrap();
    controller.add_seed(&base).await.unwrap();

    let summary = run(&controller, 1).await;

    assert!(summary.halted);
    assert_eq!(policy.visited(), vec![format!("{base}/")]);
    assert_eq!(summary.unhandled_errors, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resumable_crawl_recovers_in_flight_urls() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", r#"<a href="/next">next</a>"#.to_string()).await;
    mount_page(&server, "/next", "<p>done</p>".to_string()).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("frontier.db");

    let mut config = create_test_config();
    config.crawler.resumable = true;
    let config = Arc::new(config);

    // A run that claimed the seed and died before completing it
    {
        let store: Arc<dyn KvStore> = Arc::new(open_storage(&db_path).unwrap());
        let frontier = Frontier::open(&config.crawler, store.clone()).unwrap();
        let seed = WebUrl::new(&format!("{base}/")).unwrap();
        frontier.schedule(seed).unwrap();
        assert_eq!(frontier.claim(1).await.unwrap().len(), 1);
        assert_eq!(store.count(Table::InFlight).unwrap(), 1);
    }

    let store: Arc<dyn KvStore> = Arc::new(open_storage(&db_path).unwrap());
    let policy = Arc::new(RecordingPolicy::default());
    let controller = CrawlController::new(config.clone(), policy.clone())
        .unwrap()
        .with_store(store.clone())
        .unwrap();

    // Already known from the interrupted run
    assert_eq!(controller.add_seed(&base).await.unwrap(), None);

    let summary = run(&controller, 2).await;

    assert_eq!(
        policy.visited(),
        vec![format!("{base}/"), format!("{base}/next")]
    );
    assert_eq!(summary.frontier.scheduled, 2);
    assert_eq!(store.count(Table::Pending).unwrap(), 0);
    assert_eq!(store.count(Table::InFlight).unwrap(), 0);
    assert_eq!(store.count(Table::DocIds).unwrap(), 2);
}
