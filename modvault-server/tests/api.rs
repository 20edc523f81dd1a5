//! Router-level integration tests against a scripted fetcher.

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use modvault_core::logbus::LogBus;
use modvault_core::orchestrator::{Orchestrator, OrchestratorConfig};
use modvault_core::registry::ArtifactRegistry;
use modvault_core::scraper::{ItemMetadataProvider, ScrapeError};
use modvault_core::testing::{ScriptedFetcher, ScriptedStep};
use modvault_core::workspace::WorkspaceManager;
use modvault_server::app_state::AppState;
use modvault_server::config::Config;
use modvault_server::routes::create_app;
use modvault_model::{AppId, ItemMetadata, WorkshopItemId};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

const APP: AppId = AppId(221100);
const ITEM_URL: &str = "https://steamcommunity.com/sharedfiles/filedetails/?id=1559212036";

struct FixedMetadata {
    app_id: AppId,
    valid: bool,
}

#[async_trait]
impl ItemMetadataProvider for FixedMetadata {
    async fn fetch_metadata(&self, item_id: WorkshopItemId) -> Result<ItemMetadata, ScrapeError> {
        Ok(ItemMetadata {
            item_id,
            app_id: self.app_id,
            title: "Test Item".into(),
            author: Some("author".into()),
            preview_url: None,
            declared_size: None,
            valid: self.valid,
        })
    }
}

struct TestApp {
    _dir: tempfile::TempDir,
    app: Router,
    registry: Arc<ArtifactRegistry>,
}

fn test_config(root: PathBuf) -> Config {
    Config {
        server_host: "127.0.0.1".into(),
        server_port: 0,
        download_root: root,
        steamcmd_path: "steamcmd".into(),
        app_id: APP,
        max_concurrent_downloads: 3,
        max_archive_bytes: None,
        job_timeout: Duration::from_secs(2 * 60 * 60),
        steam_username: None,
        steam_password: None,
        steam_guard_code: None,
        steam_home: None,
        log_ring_capacity: 1000,
        observer_token: Some("observer-secret".into()),
        cors_allowed_origins: vec!["*".into()],
    }
}

fn build_app(fetcher: ScriptedFetcher, provider: FixedMetadata, cap: usize) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().join("downloads"));

    let registry = Arc::new(ArtifactRegistry::new());
    let workspaces = Arc::new(WorkspaceManager::new(config.download_root.clone()));
    let bus = Arc::new(LogBus::new(config.logbus_config()));
    let orchestrator = Orchestrator::new(
        OrchestratorConfig {
            app_id: APP,
            max_concurrent: cap,
            retry_base: Duration::from_millis(10),
            ..OrchestratorConfig::default()
        },
        Arc::clone(&registry),
        workspaces,
        Arc::new(fetcher),
        Arc::clone(&bus),
    );

    let state = AppState {
        config: Arc::new(config),
        orchestrator,
        metadata: Arc::new(provider),
        bus,
        shutdown: CancellationToken::new(),
    };
    TestApp {
        _dir: dir,
        app: create_app(state),
        registry,
    }
}

fn valid_provider() -> FixedMetadata {
    FixedMetadata {
        app_id: APP,
        valid: true,
    }
}

async fn request_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn post_submit(url: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/download")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(format!("{{\"url\":\"{url}\"}}")))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn submit_ok(app: &Router) -> String {
    let (status, body) = request_json(app, post_submit(ITEM_URL)).await;
    assert_eq!(status, StatusCode::OK, "submit failed: {body}");
    body["jobId"].as_str().unwrap().to_string()
}

async fn wait_for_state(app: &Router, job_id: &str, state: &str) -> Value {
    for _ in 0..500 {
        let (status, body) =
            request_json(app, get(&format!("/api/download/{job_id}/status"))).await;
        if status == StatusCode::OK && body["state"] == state {
            return body;
        }
        if body["state"] == "error" && state != "error" {
            panic!("job failed instead of reaching {state}: {body}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached state {state}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_rejects_invalid_urls() {
    let t = build_app(ScriptedFetcher::always_succeeding(), valid_provider(), 3);

    for url in [
        "https://example.com/?id=123",
        "https://steamcommunity.com/sharedfiles/filedetails/?id=abc",
        "junk",
    ] {
        let (status, body) = request_json(&t.app, post_submit(url)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{url}");
        assert_eq!(body["error"]["kind"], "InvalidUrl");
    }
    assert!(t.registry.snapshots().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_rejects_foreign_applications() {
    let t = build_app(
        ScriptedFetcher::always_succeeding(),
        FixedMetadata {
            app_id: AppId(570),
            valid: true,
        },
        3,
    );

    let (status, body) = request_json(&t.app, post_submit(ITEM_URL)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "WrongApplication");
    // No job record is created for a rejected submission.
    assert!(t.registry.snapshots().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_rejects_invalid_items() {
    let t = build_app(
        ScriptedFetcher::always_succeeding(),
        FixedMetadata {
            app_id: APP,
            valid: false,
        },
        3,
    );

    let (status, body) = request_json(&t.app, post_submit(ITEM_URL)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "InvalidItem");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn capacity_exhaustion_reports_occupancy() {
    let t = build_app(
        ScriptedFetcher::new([ScriptedStep::Hang]),
        valid_provider(),
        1,
    );

    let first = submit_ok(&t.app).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, body) = request_json(&t.app, post_submit(ITEM_URL)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["kind"], "CapacityExhausted");
    assert_eq!(body["current"], 1);
    assert_eq!(body["max"], 1);
    assert_eq!(t.registry.snapshots().await.len(), 1);

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/download/{first}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = request_json(&t.app, delete).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_of_unknown_job_is_not_found() {
    let t = build_app(ScriptedFetcher::always_succeeding(), valid_provider(), 3);
    let (status, body) = request_json(
        &t.app,
        get("/api/download/00000000-0000-4000-8000-000000000000/status"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "NotFound");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn happy_path_delivers_an_archive_and_cleans_up() {
    let t = build_app(ScriptedFetcher::always_succeeding(), valid_provider(), 3);

    let job_id = submit_ok(&t.app).await;
    let completed = wait_for_state(&t.app, &job_id, "completed").await;
    assert_eq!(completed["progress"], 100);
    assert_eq!(
        completed["downloadUrl"],
        format!("/api/download/{job_id}/file")
    );
    let archive_size = completed["archiveSize"].as_u64().unwrap();
    assert!(archive_size >= 512);

    // Range request first: 206, correct slice, no cleanup.
    let range = Request::builder()
        .uri(format!("/api/download/{job_id}/file"))
        .header(header::RANGE, "bytes=0-9")
        .body(Body::empty())
        .unwrap();
    let response = t.app.clone().oneshot(range).await.unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE],
        format!("bytes 0-9/{archive_size}")
    );
    let slice = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(slice.len(), 10);
    // Zip local file header magic.
    assert_eq!(&slice[..2], b"PK");

    // The record is still live after the partial read.
    let (status, _) = request_json(&t.app, get(&format!("/api/download/{job_id}/status"))).await;
    assert_eq!(status, StatusCode::OK);

    // Whole-file delivery: 200 with the advertised headers.
    let response = t
        .app
        .clone()
        .oneshot(get(&format!("/api/download/{job_id}/file")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    let etag = response.headers()[header::ETAG].to_str().unwrap().to_string();
    assert!(etag.starts_with(&format!("\"{archive_size}-")));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.len() as u64, archive_size);

    // Full delivery disposes the workspace and marks the job cleaned.
    wait_for_state(&t.app, &job_id, "cleaned").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsatisfiable_range_is_rejected_without_state_change() {
    let t = build_app(ScriptedFetcher::always_succeeding(), valid_provider(), 3);
    let job_id = submit_ok(&t.app).await;
    wait_for_state(&t.app, &job_id, "completed").await;

    let range = Request::builder()
        .uri(format!("/api/download/{job_id}/file"))
        .header(header::RANGE, "bytes=999999999-")
        .body(Body::empty())
        .unwrap();
    let response = t.app.clone().oneshot(range).await.unwrap();
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert!(
        response.headers()[header::CONTENT_RANGE]
            .to_str()
            .unwrap()
            .starts_with("bytes */")
    );

    let (status, body) = request_json(&t.app, get(&format!("/api/download/{job_id}/status"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "completed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cleanup_is_idempotent_and_unknown_ids_404() {
    let t = build_app(
        ScriptedFetcher::new([ScriptedStep::Hang]),
        valid_provider(),
        3,
    );
    let job_id = submit_ok(&t.app).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let delete = |id: String| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/download/{id}"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = request_json(&t.app, delete(job_id.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cleaned");

    // Repeat cleanup of the same job succeeds without side effects.
    let (status, _) = request_json(&t.app, delete(job_id.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request_json(
        &t.app,
        delete("00000000-0000-4000-8000-000000000000".into()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn log_stream_rejects_before_upgrade_without_a_token() {
    let t = build_app(ScriptedFetcher::always_succeeding(), valid_provider(), 3);

    let upgrade = |uri: &str| {
        Request::builder()
            .uri(uri)
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap()
    };

    let response = t.app.clone().oneshot(upgrade("/api/logs/stream")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = t
        .app
        .clone()
        .oneshot(upgrade("/api/logs/stream?token=wrong"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = t
        .app
        .clone()
        .oneshot(upgrade("/api/logs/stream?token=observer-secret"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recent_logs_require_the_observer_token() {
    let t = build_app(ScriptedFetcher::always_succeeding(), valid_provider(), 3);
    let job_id = submit_ok(&t.app).await;
    wait_for_state(&t.app, &job_id, "completed").await;

    let (status, _) = request_json(&t.app, get("/api/logs/recent")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) =
        request_json(&t.app, get("/api/logs/recent?token=observer-secret&limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert!(!records.is_empty() && records.len() <= 5);
    // Publish order is preserved in the history view.
    let seqs: Vec<u64> = records.iter().map(|r| r["seq"].as_u64().unwrap()).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_reports_occupancy() {
    let t = build_app(ScriptedFetcher::always_succeeding(), valid_provider(), 3);
    let (status, body) = request_json(&t.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["downloads"]["max"], 3);
}
