//! Integration tests for the orchestrator
//!
//! These tests use wiremock to serve pages and drive whole jobs through
//! the HTTP renderer, from submit to export.

use harvester::config::{ContentFormat, ScrapeOptions};
use harvester::renderer::HttpRenderer;
use harvester::storage::{JobSink, SqliteJobSink};
use harvester::{ExportFormat, JobMode, JobStatus, Orchestrator, PageResult, PageStatus, Target};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

fn orchestrator() -> Orchestrator {
    let renderer = HttpRenderer::new("HarvesterTest/1.0").expect("Failed to build renderer");
    Orchestrator::new(Arc::new(renderer))
}

/// Options with no inter-batch delay
fn fast_options() -> ScrapeOptions {
    ScrapeOptions {
        request_delay_ms: 0,
        max_concurrent: 2,
        page_timeout_ms: 5_000,
        ..ScrapeOptions::default()
    }
}

fn target(mode: JobMode, urls: &[String]) -> Target {
    Target::from_inputs(mode, urls).expect("Failed to build target")
}

#[tokio::test]
async fn test_single_page_html_and_text() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<html><head><title>Widgets</title></head>
        <body><h1>All widgets</h1><p>Blue and green.</p></body></html>"#,
    )
    .await;

    let orchestrator = orchestrator();
    let options = ScrapeOptions {
        output_formats: BTreeSet::from([ContentFormat::Html, ContentFormat::Text]),
        ..fast_options()
    };
    let id = orchestrator.submit(target(JobMode::Single, &[server.uri()]), options);
    let job = orchestrator.wait(id).await.unwrap();

    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.results().len(), 1);

    let page = &job.results()[0];
    assert_eq!(page.status, PageStatus::Completed);
    assert_eq!(page.title.as_deref(), Some("Widgets"));
    assert_eq!(page.content.len(), 2);
    assert!(page.content[&ContentFormat::Html].contains("<h1>All widgets</h1>"));
    assert_eq!(page.content[&ContentFormat::Text], "All widgets\nBlue and green.");
    assert!(job.errors().is_empty());
    assert!(job.total_time_ms().is_some());
}

#[tokio::test]
async fn test_site_crawl_bounded_by_depth_and_pages() {
    let server = MockServer::start().await;
    let base = server.uri();

    let links: String = (0..10)
        .map(|i| format!(r#"<a href="/p{}">Page {}</a>"#, i, i))
        .collect();
    mount_page(&server, "/", &format!("<html><body>{}</body></html>", links)).await;
    for i in 0..10 {
        mount_page(
            &server,
            &format!("/p{}", i),
            &format!(r#"<html><body><a href="/p{}/deeper">deeper</a></body></html>"#, i),
        )
        .await;
    }

    let orchestrator = orchestrator();
    let options = ScrapeOptions {
        max_depth: 1,
        max_pages: 5,
        ..fast_options()
    };
    let id = orchestrator.submit(target(JobMode::Site, &[base]), options);
    let job = orchestrator.wait(id).await.unwrap();

    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.results().len(), 5);
    assert_eq!(job.results()[0].depth, 0);
    assert!(job.results()[1..].iter().all(|r| r.depth == 1));
    assert!(job.results().iter().all(|r| !r.url.path().contains("deeper")));

    let unique: HashSet<&str> = job.results().iter().map(|r| r.url.as_str()).collect();
    assert_eq!(unique.len(), 5);
}

#[tokio::test]
async fn test_site_root_redirect_to_other_host_keeps_links() {
    let server = MockServer::start().await;
    let port = server.address().port();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("http://localhost:{}/home", port).as_str()),
        )
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/home",
        r#"<html><body><a href="/a">A</a><a href="/b">B</a></body></html>"#,
    )
    .await;
    mount_page(&server, "/a", "<html><body>a</body></html>").await;
    mount_page(&server, "/b", "<html><body>b</body></html>").await;

    let orchestrator = orchestrator();
    let options = ScrapeOptions {
        max_depth: 1,
        ..fast_options()
    };
    let root = format!("http://127.0.0.1:{}/", port);
    let id = orchestrator.submit(target(JobMode::Site, &[root]), options);
    let job = orchestrator.wait(id).await.unwrap();

    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.results().len(), 3);
    assert!(job.results().iter().all(|r| r.status == PageStatus::Completed));

    let paths: BTreeSet<&str> = job.results()[1..].iter().map(|r| r.url.path()).collect();
    assert_eq!(paths, BTreeSet::from(["/a", "/b"]));
}

#[tokio::test]
async fn test_multiple_mode_records_timeout_as_failed_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/a", "<html><body>a</body></html>").await;
    mount_page(&server, "/c", "<html><body>c</body></html>").await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("<html><body>b</body></html>").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let urls: Vec<String> = ["/a", "/b", "/c"]
        .iter()
        .map(|p| format!("{}{}", server.uri(), p))
        .collect();
    let options = ScrapeOptions {
        page_timeout_ms: 500,
        max_concurrent: 3,
        ..fast_options()
    };

    let orchestrator = orchestrator();
    let id = orchestrator.submit(target(JobMode::Multiple, &urls), options);
    let job = orchestrator.wait(id).await.unwrap();

    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.results().len(), 3);

    let failed: Vec<&PageResult> = job.results().iter().filter(|r| !r.is_success()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].url.path(), "/b");
    assert!(failed[0].error.as_deref().unwrap().contains("timed out"));
    assert!(failed[0].content.is_empty());

    assert_eq!(job.errors().len(), 1);
    assert!(job.errors()[0].contains("/b"));
}

#[tokio::test]
async fn test_unreachable_site_root_fails_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let orchestrator = orchestrator();
    let id = orchestrator.submit(target(JobMode::Site, &[server.uri()]), fast_options());
    let job = orchestrator.wait(id).await.unwrap();

    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.failure().unwrap().contains("unreachable"));
}

#[tokio::test]
async fn test_invalid_options_fail_job() {
    let orchestrator = orchestrator();
    let options = ScrapeOptions {
        max_concurrent: 0,
        ..fast_options()
    };
    let id = orchestrator.submit(
        target(JobMode::Single, &["https://example.test/".to_string()]),
        options,
    );
    let job = orchestrator.wait(id).await.unwrap();

    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.failure().unwrap().contains("Invalid options"));
    assert!(job.results().is_empty());
}

#[tokio::test]
async fn test_cancel_before_first_batch_exports_empty_csv() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "<html><body>home</body></html>").await;

    let orchestrator = orchestrator();
    let id = orchestrator.submit(target(JobMode::Multiple, &[server.uri()]), fast_options());
    orchestrator.cancel(id).unwrap();
    let job = orchestrator.wait(id).await.unwrap();

    assert_eq!(job.status(), JobStatus::Completed);
    assert!(job.is_cancelled());
    assert!(job.results().is_empty());

    let csv = orchestrator.export(id, ExportFormat::Csv).unwrap();
    assert!(csv.is_empty());
}

#[tokio::test]
async fn test_cancel_mid_job_keeps_partial_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<html><body>page</body></html>"))
        .mount(&server)
        .await;

    let urls: Vec<String> = (0..6).map(|i| format!("{}/p{}", server.uri(), i)).collect();
    let options = ScrapeOptions {
        request_delay_ms: 1_000,
        max_concurrent: 2,
        ..fast_options()
    };

    let orchestrator = orchestrator();
    let id = orchestrator.submit(target(JobMode::Multiple, &urls), options);
    tokio::time::sleep(Duration::from_millis(300)).await;
    orchestrator.cancel(id).unwrap();
    let job = orchestrator.wait(id).await.unwrap();

    assert_eq!(job.status(), JobStatus::Completed);
    assert!(job.is_cancelled());
    assert_eq!(job.results().len(), 2);
    assert!(job.results().iter().all(|r| r.is_success()));
}

#[tokio::test]
async fn test_json_export_round_trips() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<html lang="en"><head><title>Round trip</title>
        <meta name="description" content="Exported and read back"></head>
        <body><p>Body</p></body></html>"#,
    )
    .await;

    let orchestrator = orchestrator();
    let options = ScrapeOptions {
        output_formats: BTreeSet::from([ContentFormat::Markdown, ContentFormat::Json]),
        ..fast_options()
    };
    let id = orchestrator.submit(target(JobMode::Single, &[server.uri()]), options);
    let job = orchestrator.wait(id).await.unwrap();

    let body = orchestrator.export(id, ExportFormat::Json).unwrap();
    let back: Vec<PageResult> = serde_json::from_slice(&body).unwrap();
    assert_eq!(back, job.results());

    let metadata = back[0].metadata.as_ref().unwrap();
    assert_eq!(metadata.description.as_deref(), Some("Exported and read back"));
    assert_eq!(metadata.language.as_deref(), Some("en"));
}

#[tokio::test]
async fn test_finished_job_is_persisted() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "<html><body>stored</body></html>").await;

    let dir = TempDir::new().unwrap();
    let sink = Arc::new(SqliteJobSink::open(&dir.path().join("jobs.db")).unwrap());
    let orchestrator = orchestrator().with_sink(sink.clone() as Arc<dyn JobSink>);

    let id = orchestrator.submit(target(JobMode::Single, &[server.uri()]), fast_options());
    let job = orchestrator.wait(id).await.unwrap();

    assert_eq!(sink.count_pages(id).unwrap(), 1);
    let summary = sink.load_job_summary(id).unwrap().unwrap();
    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary, job.summary());
}
