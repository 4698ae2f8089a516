//! Integration tests for the mirror API
//!
//! These tests drive the full router with `sh` standing in for wget, so the whole
//! request -> crawl -> archive -> response path runs without network access.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use site_mirror::config::Config;
use site_mirror::server::{build_router, AppState, HEADER_API_KEY};
use site_mirror::MirrorPipeline;
use std::io::{Cursor, Read};
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::ZipArchive;

const API_KEY: &str = "integration-key";

/// Writes a two-page site with one stylesheet into the directory wget was pointed at
const FAKE_WGET: &str = r#"
for arg in "$@"; do
  case "$arg" in
    --directory-prefix=*) dir="${arg#--directory-prefix=}" ;;
  esac
done
mkdir -p "$dir/assets"
printf '<html><a href="about.html">About</a></html>' > "$dir/index.html"
printf '<html>About</html>' > "$dir/about.html"
printf 'body{}' > "$dir/assets/site.css"
echo "FINISHED" >&2
"#;

/// Creates a test configuration running `script` through `sh -c`
fn create_test_config(storage: &Path, script: &str) -> Config {
    let mut config = Config::default();
    config.server.api_key = API_KEY.to_string();
    config.mirror.storage_dir = storage.to_string_lossy().into_owned();
    config.crawler.program = "sh".to_string();
    config.crawler.program_args = vec!["-c".to_string(), script.to_string(), "fake-wget".to_string()];
    config.crawler.timeout_secs = 10;
    config
}

fn create_app(config: &Config) -> Router {
    let pipeline = MirrorPipeline::from_config(config);
    build_router(
        AppState::new(pipeline, &config.server.api_key),
        &config.server.allowed_origins,
    )
}

fn mirror_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/mirror")
        .header(header::CONTENT_TYPE, "application/json")
        .header(HEADER_API_KEY, API_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn archive_names(bytes: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_end_to_end_mirror() {
    let temp = TempDir::new().unwrap();
    let storage = temp.path().join("mirrors");
    let config = create_test_config(&storage, FAKE_WGET);

    let response = create_app(&config)
        .oneshot(mirror_request(
            r#"{"url": "https://www.example.framer.website", "max_depth": 1}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(
        disposition.starts_with("attachment; filename=\"example.framer.website-"),
        "unexpected disposition: {}",
        disposition
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let names = archive_names(&bytes);
    assert!(names.contains(&"index.html".to_string()));
    assert!(names.contains(&"about.html".to_string()));
    assert!(names.contains(&"assets/site.css".to_string()));
    assert!(names.iter().all(|n| !n.starts_with("example.framer.website")));

    let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut css = String::new();
    archive
        .by_name("assets/site.css")
        .unwrap()
        .read_to_string(&mut css)
        .unwrap();
    assert_eq!(css, "body{}");

    // The workspace stays; the delivered archive does not.
    assert!(storage.join("example.framer.website/index.html").is_file());
    let leftover_archives = std::fs::read_dir(&storage)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "zip"))
        .count();
    assert_eq!(leftover_archives, 0);
}

#[tokio::test]
async fn test_rerun_replaces_workspace() {
    let temp = TempDir::new().unwrap();
    let storage = temp.path().join("mirrors");
    let config = create_test_config(&storage, FAKE_WGET);
    let app = create_app(&config);

    std::fs::create_dir_all(storage.join("example.com")).unwrap();
    std::fs::write(storage.join("example.com/stale.html"), "old run").unwrap();

    let response = app
        .oneshot(mirror_request(r#"{"url": "https://example.com"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(!archive_names(&bytes).contains(&"stale.html".to_string()));
    assert!(!storage.join("example.com/stale.html").exists());
}

#[tokio::test]
async fn test_no_remote_credentials_still_succeeds() {
    let temp = TempDir::new().unwrap();
    let config = create_test_config(&temp.path().join("mirrors"), FAKE_WGET);
    assert!(!config.remote_store.is_configured());

    let response = create_app(&config)
        .oneshot(mirror_request(r#"{"url": "https://example.com"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_tool_is_configuration_error() {
    let temp = TempDir::new().unwrap();
    let mut config = create_test_config(&temp.path().join("mirrors"), FAKE_WGET);
    config.crawler.program = "definitely-not-installed-wget".to_string();
    config.crawler.program_args.clear();

    let response = create_app(&config)
        .oneshot(mirror_request(r#"{"url": "https://example.com"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("Server configuration error"), "detail: {}", detail);
}

#[tokio::test]
async fn test_crawl_failure_is_server_error() {
    let temp = TempDir::new().unwrap();
    let config = create_test_config(
        &temp.path().join("mirrors"),
        "echo 'ERROR 404: Not Found.' >&2; exit 8",
    );

    let response = create_app(&config)
        .oneshot(mirror_request(r#"{"url": "https://example.com"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Mirror operation failed:"), "detail: {}", detail);
    assert!(detail.contains("ERROR 404"));
}

#[tokio::test]
async fn test_timeout_is_server_error() {
    let temp = TempDir::new().unwrap();
    let storage = temp.path().join("mirrors");
    let mut config = create_test_config(&storage, "sleep 30");
    config.crawler.timeout_secs = 1;

    let response = create_app(&config)
        .oneshot(mirror_request(r#"{"url": "https://example.com"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["detail"], "sh command timed out");

    let archives = std::fs::read_dir(&storage)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "zip"))
        .count();
    assert_eq!(archives, 0);
}

#[tokio::test]
async fn test_rejected_requests_have_no_side_effects() {
    let temp = TempDir::new().unwrap();
    let storage = temp.path().join("mirrors");
    let config = create_test_config(&storage, FAKE_WGET);

    let response = create_app(&config)
        .oneshot(mirror_request(r#"{"url": "ftp://example.com"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = create_app(&config)
        .oneshot(mirror_request(r#"{}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let unauthorized = Request::builder()
        .method("POST")
        .uri("/mirror")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"url": "https://example.com"}"#))
        .unwrap();
    let response = create_app(&config).oneshot(unauthorized).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert!(!storage.exists());
}

/// Runs the real wget against a local site; needs wget on PATH
#[tokio::test]
#[ignore]
async fn test_real_wget_mirror() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(
                    r#"<html><head><link rel="stylesheet" href="/style.css"></head>
                    <body><a href="/about.html">About</a></body></html>"#,
                ),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/about.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body>About us</body></html>"),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/style.css"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/css")
                .set_body_string("body { color: black; }"),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.server.api_key = API_KEY.to_string();
    config.mirror.storage_dir = temp.path().join("mirrors").to_string_lossy().into_owned();

    let body = format!(r#"{{"url": "{}/", "max_depth": 1, "wait_time": 0}}"#, server.uri());
    let response = create_app(&config)
        .oneshot(mirror_request(&body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let names = archive_names(&bytes);
    assert!(names.contains(&"index.html".to_string()), "names: {:?}", names);
    assert!(names.contains(&"about.html".to_string()), "names: {:?}", names);
    assert!(names.contains(&"style.css".to_string()), "names: {:?}", names);
}
