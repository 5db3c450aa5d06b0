//! End-to-end exercise of the full HTTP surface (spec.md §8's concrete
//! scenarios 1, 3, 4, 6): a fake upstream simple-repository server plays
//! the role of PyPI, and every request goes through the real `axum`
//! router wired to a real `AppState` exactly as `main.rs` builds it --
//! only the listener is swapped for `tower::ServiceExt::oneshot` instead
//! of a bound TCP socket, the same in-process-server technique
//! `rattler_repodata_gateway/tests/gateway.rs` uses for its own
//! `Gateway` integration test.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path as AxPath, State};
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use proxpi::config::{CliArgs, Config};
use proxpi::state::AppState;
use tower::ServiceExt;
use url::Url;

struct FakeUpstream {
    root_hits: Arc<AtomicUsize>,
    project_hits: Arc<AtomicUsize>,
}

async fn spawn_fake_upstream() -> (Url, FakeUpstream) {
    let root_hits = Arc::new(AtomicUsize::new(0));
    let project_hits = Arc::new(AtomicUsize::new(0));

    #[derive(Clone)]
    struct Shared {
        root_hits: Arc<AtomicUsize>,
        project_hits: Arc<AtomicUsize>,
    }

    async fn root(State(shared): State<Shared>) -> Json<serde_json::Value> {
        shared.root_hits.fetch_add(1, Ordering::SeqCst);
        Json(serde_json::json!({
            "meta": {"api-version": "1.0"},
            "projects": [{"name": "Jinja2"}],
        }))
    }

    async fn project(
        State(shared): State<Shared>,
        AxPath(name): AxPath<String>,
    ) -> axum::response::Response {
        use axum::response::IntoResponse;
        shared.project_hits.fetch_add(1, Ordering::SeqCst);
        if name != "jinja2" {
            return StatusCode::NOT_FOUND.into_response();
        }
        Json(serde_json::json!({
            "meta": {"api-version": "1.0"},
            "name": "jinja2",
            "files": [{
                "filename": "jinja2-3.1.0-py3-none-any.whl",
                "url": "jinja2-3.1.0-py3-none-any.whl",
                "hashes": {"sha256": "deadbeef"},
            }],
        }))
        .into_response()
    }

    async fn artifact() -> &'static [u8] {
        b"pretend this is a wheel"
    }

    let shared = Shared {
        root_hits: root_hits.clone(),
        project_hits: project_hits.clone(),
    };
    let app = Router::new()
        .route("/", get(root))
        .route("/{project}/", get(project))
        .route("/jinja2/jinja2-3.1.0-py3-none-any.whl", get(artifact))
        .with_state(shared);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (
        Url::parse(&format!("http://{addr}/")).unwrap(),
        FakeUpstream {
            root_hits,
            project_hits,
        },
    )
}

fn test_config(index_url: Url, cache_dir: PathBuf) -> Config {
    let args = CliArgs {
        index_url,
        index_ttl: 3600,
        extra_index_urls: Vec::new(),
        extra_index_ttls: Vec::new(),
        extra_index_ttl: None,
        cache_size: 1_000_000_000,
        cache_dir: Some(cache_dir),
        binary_file_mime_type: false,
        disable_index_ssl_verification: false,
        download_timeout: 5.0,
        connect_timeout: None,
        read_timeout: None,
        logging_level: "error".to_string(),
        bind: "127.0.0.1:0".parse().unwrap(),
    };
    Config::try_from(args).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn lists_files_downloads_and_caches_on_disk() {
    let (index_url, upstream) = spawn_fake_upstream().await;
    let cache_dir = tempfile::tempdir().unwrap();
    let config = test_config(index_url, cache_dir.path().to_path_buf());
    let app = proxpi::routes::build(Arc::new(AppState::new(&config)));

    // Scenario 1: project listing has exactly the one file.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/index/jinja2/")
                .header("accept", "application/vnd.pypi.simple.v1+json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
    let files = doc["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["filename"], "jinja2-3.1.0-py3-none-any.whl");

    // Scenario 1 continued: downloading the file succeeds and lands on
    // disk at `<cache>/0/jinja2/<filename>`.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/index/jinja2/jinja2-3.1.0-py3-none-any.whl")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert_eq!(body, "pretend this is a wheel");

    let expected_path = cache_dir
        .path()
        .join("0")
        .join("jinja2")
        .join("jinja2-3.1.0-py3-none-any.whl");
    assert!(expected_path.exists());
    assert_eq!(std::fs::read_to_string(&expected_path).unwrap(), "pretend this is a wheel");

    // Scenario 6 (half): the project listing stays cached within TTL, so a
    // second request for it does not hit the fake upstream again.
    let hits_before = upstream.project_hits.load(Ordering::SeqCst);
    let _ = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/index/jinja2/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(upstream.project_hits.load(Ordering::SeqCst), hits_before);
}

#[tokio::test]
async fn non_normalized_project_name_redirects() {
    let (index_url, _upstream) = spawn_fake_upstream().await;
    let cache_dir = tempfile::tempdir().unwrap();
    let config = test_config(index_url, cache_dir.path().to_path_buf());
    let app = proxpi::routes::build(Arc::new(AppState::new(&config)));

    // Scenario 3: `Jinja2` (not yet normalized) 308s to `/index/jinja2/`.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/index/Jinja2/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert_eq!(location, "/index/jinja2/");
}

#[tokio::test]
async fn invalidate_all_forces_a_refetch() {
    let (index_url, upstream) = spawn_fake_upstream().await;
    let cache_dir = tempfile::tempdir().unwrap();
    let config = test_config(index_url, cache_dir.path().to_path_buf());
    let app = proxpi::routes::build(Arc::new(AppState::new(&config)));

    let _ = app
        .clone()
        .oneshot(Request::builder().uri("/index/jinja2/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let hits_after_first = upstream.project_hits.load(Ordering::SeqCst);
    assert_eq!(hits_after_first, 1);

    // Scenario 6: `DELETE /cache/list` drops every index cache; the next
    // listing request refetches even though the TTL hasn't expired.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/cache/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let _ = app
        .oneshot(Request::builder().uri("/index/jinja2/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(upstream.project_hits.load(Ordering::SeqCst), hits_after_first + 1);
}

#[tokio::test]
async fn unknown_project_is_404() {
    let (index_url, _upstream) = spawn_fake_upstream().await;
    let cache_dir = tempfile::tempdir().unwrap();
    let config = test_config(index_url, cache_dir.path().to_path_buf());
    let app = proxpi::routes::build(Arc::new(AppState::new(&config)));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/index/does-not-exist/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_check_is_ok() {
    let (index_url, _upstream) = spawn_fake_upstream().await;
    let cache_dir = tempfile::tempdir().unwrap();
    let config = test_config(index_url, cache_dir.path().to_path_buf());
    let app = proxpi::routes::build(Arc::new(AppState::new(&config)));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

