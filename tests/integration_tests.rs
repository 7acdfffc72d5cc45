//! Integration tests for the job lifecycle engine.
//!
//! These tests drive the real pipeline end to end: uploads go through the
//! HTTP router, the worker pool executes jobs with the copy encoder and the
//! direct-serve writer, and outcomes land in real (in-memory) stores.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use imagemill::api::{routes::create_router, AppState};
use imagemill::auth::{FormatSettings, FormatSpec, JobSpec, TokenVerifier};
use imagemill::encoder::EncoderRegistry;
use imagemill::job::{
    spawn_worker_pool, JobManager, JobQueue, JobState, WorkerPoolConfig,
};
use imagemill::store::{CredentialsStore, FailureStore, SuccessStore};

const TEST_SECRET: &str = "integration-test-secret-32-chars!";

struct TestHarness {
    scratch: tempfile::TempDir,
    serve: tempfile::TempDir,
    manager: Arc<JobManager>,
    verifier: TokenVerifier,
    success: Arc<SuccessStore>,
    failures: Arc<FailureStore>,
    credentials: Arc<CredentialsStore>,
}

impl TestHarness {
    async fn new() -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let serve = tempfile::tempdir().unwrap();

        let success = Arc::new(SuccessStore::open_in_memory().await.unwrap());
        let failures = Arc::new(FailureStore::open_in_memory().await.unwrap());
        let credentials = Arc::new(CredentialsStore::open_in_memory().await.unwrap());

        let manager = Arc::new(
            JobManager::new(
                scratch.path().to_path_buf(),
                serve.path().to_path_buf(),
                Arc::new(JobQueue::new()),
                Arc::new(EncoderRegistry::with_defaults()),
                success.clone(),
                failures.clone(),
            )
            .with_credentials(credentials.clone()),
        );

        Self {
            scratch,
            serve,
            manager,
            verifier: TokenVerifier::new(TEST_SECRET),
            success,
            failures,
            credentials,
        }
    }

    fn router(&self) -> axum::Router {
        create_router(AppState::new(
            self.manager.clone(),
            self.verifier.clone(),
            self.success.clone(),
            self.failures.clone(),
            self.credentials.clone(),
            self.serve.path().to_path_buf(),
        ))
    }

    async fn wait_for_terminal(&self, hash: &str) -> JobState {
        for _ in 0..200 {
            if let Some(state) = self.manager.state_of(hash) {
                if state.is_terminal() {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {} never reached a terminal state", hash);
    }
}

/// A job spec that only needs the always-available copy encoder.
fn copy_and_serve_spec(sub_dir: &str) -> JobSpec {
    JobSpec {
        keep_original: true,
        direct_host: true,
        sub_dir: sub_dir.to_string(),
        ..Default::default()
    }
}

fn multipart_body(filename: &str, payload: &[u8]) -> (String, Vec<u8>) {
    let boundary = "X-IMAGEMILL-TEST-BOUNDARY";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

mod upload_endpoint {
    use super::*;

    #[tokio::test]
    async fn test_upload_without_token_is_401() {
        let harness = TestHarness::new().await;
        let (content_type, body) = multipart_body("a.png", b"bytes");

        let response = harness
            .router()
            .oneshot(
                Request::post("/upload")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upload_with_bad_token_is_401() {
        let harness = TestHarness::new().await;
        let (content_type, body) = multipart_body("a.png", b"bytes");

        let response = harness
            .router()
            .oneshot(
                Request::post("/upload")
                    .header(header::AUTHORIZATION, "Bearer not.a.token")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upload_without_file_part_is_400() {
        let harness = TestHarness::new().await;
        let token = harness.verifier.sign(copy_and_serve_spec(""), 600).unwrap();

        let boundary = "X-IMAGEMILL-TEST-BOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--{b}--\r\n",
            b = boundary
        );

        let response = harness
            .router()
            .oneshot(
                Request::post("/upload")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={}", boundary),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_returns_hash_and_expected_files() {
        let harness = TestHarness::new().await;

        let mut spec = copy_and_serve_spec("u/1");
        spec.keep_original = false;
        spec.formats.insert(
            "jpg".to_string(),
            FormatSpec {
                settings: FormatSettings {
                    quality: 80,
                    speed: 1,
                },
                sizes: vec![vec![400, 300]],
            },
        );
        let token = harness.verifier.sign(spec, 600).unwrap();

        let payload = vec![0x55u8; 10 * 1024];
        let (content_type, body) = multipart_body("photo.jpg", &payload);

        let response = harness
            .router()
            .oneshot(
                Request::post("/upload")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value = json_body(response).await;
        let hash = value["hash"].as_str().unwrap();
        assert_eq!(hash.len(), 64);
        // Length (300) precedes width (400) in the derived filename.
        assert_eq!(
            value["expected_files"],
            serde_json::json!([format!("{}_photo_300_400_.jpg", hash)])
        );

        // The scratch directory is materialized and pending.
        assert!(harness.scratch.path().join(hash).join("photo.jpg").exists());
        assert_eq!(harness.manager.state_of(hash), Some(JobState::Pending));
    }
}

mod pipeline_execution {
    use super::*;

    #[tokio::test]
    async fn test_copy_and_convert_end_to_end() {
        let harness = TestHarness::new().await;

        let shutdown = CancellationToken::new();
        let pool = spawn_worker_pool(
            harness.manager.clone(),
            WorkerPoolConfig { max_workers: 2 },
            shutdown.clone(),
        );

        let receipt = harness
            .manager
            .ingest("a.png", b"png payload", &copy_and_serve_spec(""))
            .await
            .unwrap();

        let state = harness.wait_for_terminal(&receipt.hash).await;
        assert_eq!(state, JobState::Completed);

        // One output, named per the copy rule, published at the serve root.
        let published = harness
            .serve
            .path()
            .join(format!("{}_a.png", receipt.hash));
        assert_eq!(
            tokio::fs::read(&published).await.unwrap(),
            b"png payload"
        );

        let record = harness.success.get(&receipt.hash).await.unwrap().unwrap();
        assert_eq!(record.file_count, 1);
        assert!(harness.failures.get(&receipt.hash).await.unwrap().is_none());

        // Scratch cleanup happened.
        assert!(!harness.scratch.path().join(&receipt.hash).exists());

        shutdown.cancel();
        pool.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_encoder_yields_failure_record() {
        let harness = TestHarness::new().await;

        let shutdown = CancellationToken::new();
        let pool = spawn_worker_pool(
            harness.manager.clone(),
            WorkerPoolConfig { max_workers: 1 },
            shutdown.clone(),
        );

        // "heif" has no registered encoder anywhere.
        let mut spec = copy_and_serve_spec("");
        spec.keep_original = false;
        spec.formats.insert(
            "heif".to_string(),
            FormatSpec {
                settings: FormatSettings {
                    quality: 50,
                    speed: 4,
                },
                sizes: vec![vec![128]],
            },
        );

        let receipt = harness
            .manager
            .ingest("a.png", b"payload", &spec)
            .await
            .unwrap();

        let state = harness.wait_for_terminal(&receipt.hash).await;
        assert_eq!(state, JobState::Failed);

        let failure = harness.failures.get(&receipt.hash).await.unwrap().unwrap();
        assert!(failure.error.contains("heif not found"));
        assert!(harness.success.get(&receipt.hash).await.unwrap().is_none());

        shutdown.cancel();
        pool.await.unwrap();
    }

    #[tokio::test]
    async fn test_status_transitions_visible_over_http() {
        let harness = TestHarness::new().await;
        let router = harness.router();

        let receipt = harness
            .manager
            .ingest("a.png", b"status probe", &copy_and_serve_spec(""))
            .await
            .unwrap();

        let response = router
            .clone()
            .oneshot(
                Request::get(format!("/status?hash={}", receipt.hash))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = json_body(response).await;
        assert_eq!(value["state"], "pending");

        // Unknown hash is a 404.
        let response = router
            .oneshot(
                Request::get("/status?hash=0000000000000000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn test_cancel_pending_job_over_http() {
        let harness = TestHarness::new().await;
        let router = harness.router();

        // No worker pool running, so the job stays pending.
        let receipt = harness
            .manager
            .ingest("a.png", b"cancel target", &copy_and_serve_spec(""))
            .await
            .unwrap();

        let response = router
            .clone()
            .oneshot(
                Request::delete(format!("/cancel?hash={}", receipt.hash))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // Status now reports cancelled.
        let response = router
            .clone()
            .oneshot(
                Request::get(format!("/status?hash={}", receipt.hash))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let value = json_body(response).await;
        assert_eq!(value["state"], "cancelled");

        // Failure record present, scratch directory removed.
        assert!(harness
            .failures
            .get(&receipt.hash)
            .await
            .unwrap()
            .is_some());
        assert!(!harness.scratch.path().join(&receipt.hash).exists());

        // Cancelling again conflicts.
        let response = router
            .oneshot(
                Request::delete(format!("/cancel?hash={}", receipt.hash))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_cancel_unknown_hash_is_404() {
        let harness = TestHarness::new().await;

        let response = harness
            .router()
            .oneshot(
                Request::delete("/cancel?hash=does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cancel_processing_job_is_409() {
        let harness = TestHarness::new().await;

        let receipt = harness
            .manager
            .ingest("a.png", b"busy", &copy_and_serve_spec(""))
            .await
            .unwrap();

        // Claim the job like an executor would.
        let _token = harness
            .manager
            .queue()
            .mark_processing(&receipt.hash)
            .unwrap();

        let response = harness
            .router()
            .oneshot(
                Request::delete(format!("/cancel?hash={}", receipt.hash))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            harness.manager.state_of(&receipt.hash),
            Some(JobState::Processing)
        );
    }
}

mod crash_recovery {
    use super::*;

    #[tokio::test]
    async fn test_boot_scan_requeues_unfinished_work() {
        let harness = TestHarness::new().await;

        // Ingest without running a worker pool, then simulate a restart by
        // building a fresh queue over the same scratch root.
        let receipt = harness
            .manager
            .ingest("a.png", b"survive restart", &copy_and_serve_spec(""))
            .await
            .unwrap();

        let rebooted = JobQueue::new();
        let recovered = rebooted
            .scan_on_boot(harness.scratch.path())
            .await
            .unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(rebooted.state_of(&receipt.hash), Some(JobState::Pending));

        // A second scan (double boot) must not duplicate the entry.
        assert_eq!(
            rebooted.scan_on_boot(harness.scratch.path()).await.unwrap(),
            0
        );
        assert_eq!(rebooted.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_recovered_job_runs_to_completion() {
        let first_boot = TestHarness::new().await;
        let receipt = first_boot
            .manager
            .ingest("a.png", b"recovered payload", &copy_and_serve_spec("r"))
            .await
            .unwrap();

        // "Restart": new manager over the same scratch and serve roots.
        let success = Arc::new(SuccessStore::open_in_memory().await.unwrap());
        let failures = Arc::new(FailureStore::open_in_memory().await.unwrap());
        let queue = Arc::new(JobQueue::new());
        let manager = Arc::new(JobManager::new(
            first_boot.scratch.path().to_path_buf(),
            first_boot.serve.path().to_path_buf(),
            queue.clone(),
            Arc::new(EncoderRegistry::with_defaults()),
            success.clone(),
            failures.clone(),
        ));
        queue.scan_on_boot(first_boot.scratch.path()).await.unwrap();

        let shutdown = CancellationToken::new();
        let pool = spawn_worker_pool(
            manager.clone(),
            WorkerPoolConfig { max_workers: 1 },
            shutdown.clone(),
        );

        for _ in 0..200 {
            if manager
                .state_of(&receipt.hash)
                .map(|s| s.is_terminal())
                .unwrap_or(false)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        assert_eq!(manager.state_of(&receipt.hash), Some(JobState::Completed));
        let published = first_boot
            .serve
            .path()
            .join("r")
            .join(format!("{}_a.png", receipt.hash));
        assert!(published.exists());

        shutdown.cancel();
        pool.await.unwrap();
    }
}

mod outcome_endpoints {
    use super::*;

    #[tokio::test]
    async fn test_success_query_states() {
        let harness = TestHarness::new().await;
        let router = harness.router();

        let response = router
            .clone()
            .oneshot(
                Request::get("/success?hash=unseen")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = json_body(response).await;
        assert_eq!(value["status"], "not_found");

        harness
            .success
            .put(
                "seen",
                &imagemill::store::SuccessRecord::new("seen", "{}", 2),
            )
            .await
            .unwrap();

        let response = router
            .oneshot(
                Request::get("/success?hash=seen")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let value = json_body(response).await;
        assert_eq!(value["status"], "success");
        assert_eq!(value["file_count"], 2);
    }

    #[tokio::test]
    async fn test_failure_query_absent_reads_as_success() {
        let harness = TestHarness::new().await;

        let response = harness
            .router()
            .oneshot(
                Request::get("/failures?hash=unseen")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let value = json_body(response).await;
        assert_eq!(value["status"], "success");
    }

    #[tokio::test]
    async fn test_list_endpoints_return_counts() {
        let harness = TestHarness::new().await;

        for hash in ["a1", "b2"] {
            harness
                .failures
                .put(
                    hash,
                    &imagemill::store::FailureRecord::new(hash, "boom", ""),
                )
                .await
                .unwrap();
        }

        let response = harness
            .router()
            .oneshot(
                Request::get("/failures/list")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let value = json_body(response).await;
        assert_eq!(value["count"], 2);
        assert_eq!(value["records"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_hash_param_is_400() {
        let harness = TestHarness::new().await;

        let response = harness
            .router()
            .oneshot(Request::get("/success").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

mod credentials_endpoints {
    use super::*;

    #[tokio::test]
    async fn test_register_and_deregister() {
        let harness = TestHarness::new().await;
        let router = harness.router();

        let response = router
            .clone()
            .oneshot(
                Request::post("/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"accessKey":"AK","secretKey":"SK"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = json_body(response).await;
        let access_key = value["access_key"].as_str().unwrap().to_string();
        assert_eq!(access_key.len(), 32);

        let stored = harness.credentials.get(&access_key).await.unwrap().unwrap();
        assert_eq!(stored["accessKey"], "AK");

        let response = router
            .oneshot(
                Request::delete(format!("/register?access_key={}", access_key))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(harness.credentials.get(&access_key).await.unwrap().is_none());
    }
}

mod health_endpoints {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_healthy_stores() {
        let harness = TestHarness::new().await;

        let response = harness
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = json_body(response).await;
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["stores"]["success"], true);
        // Boot instant is always reported, formatted as a wall-clock time.
        let start_time = value["start_time"].as_str().unwrap();
        assert!(start_time.ends_with("UTC"), "got start_time {start_time}");
    }

    #[tokio::test]
    async fn test_version_reports_build_info() {
        let harness = TestHarness::new().await;

        let response = harness
            .router()
            .oneshot(Request::get("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = json_body(response).await;
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
        // The toolchain version is baked in at build time and always present.
        let rustc_version = value["rustc_version"].as_str().unwrap();
        assert!(!rustc_version.is_empty());
    }
}

mod served_files {
    use super::*;

    #[tokio::test]
    async fn test_published_file_is_served() {
        let harness = TestHarness::new().await;

        let sub_dir = harness.serve.path().join("u/1");
        tokio::fs::create_dir_all(&sub_dir).await.unwrap();
        tokio::fs::write(sub_dir.join("pic.jpg"), b"served bytes")
            .await
            .unwrap();

        let response = harness
            .router()
            .oneshot(
                Request::get("/files/u/1/pic.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"served bytes");
    }

    #[tokio::test]
    async fn test_unknown_file_is_404() {
        let harness = TestHarness::new().await;

        let response = harness
            .router()
            .oneshot(
                Request::get("/files/nope.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

mod store_invariants {
    use super::*;

    #[tokio::test]
    async fn test_terminal_outcomes_are_disjoint_across_reruns(
    ) {
        let harness = TestHarness::new().await;

        // Fail a job, then re-upload identical bytes and let it succeed:
        // the hash must move from the failure store to the success store.
        let mut spec = copy_and_serve_spec("");
        spec.keep_original = false;
        spec.formats.insert(
            "heif".to_string(),
            FormatSpec {
                settings: FormatSettings::default(),
                sizes: vec![vec![64]],
            },
        );

        let shutdown = CancellationToken::new();
        let pool = spawn_worker_pool(
            harness.manager.clone(),
            WorkerPoolConfig { max_workers: 1 },
            shutdown.clone(),
        );

        let receipt = harness
            .manager
            .ingest("a.png", b"retry me", &spec)
            .await
            .unwrap();
        assert_eq!(
            harness.wait_for_terminal(&receipt.hash).await,
            JobState::Failed
        );
        assert!(harness.failures.get(&receipt.hash).await.unwrap().is_some());

        // Same bytes, now with a job the host can execute. The state table
        // holds a terminal state for this hash within this process
        // lifetime, so route the retry through a fresh queue the way a
        // restart would.
        shutdown.cancel();
        pool.await.unwrap();

        let queue = Arc::new(JobQueue::new());
        let manager = Arc::new(JobManager::new(
            harness.scratch.path().to_path_buf(),
            harness.serve.path().to_path_buf(),
            queue.clone(),
            Arc::new(EncoderRegistry::with_defaults()),
            harness.success.clone(),
            harness.failures.clone(),
        ));
        let receipt = manager
            .ingest("a.png", b"retry me", &copy_and_serve_spec(""))
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let pool = spawn_worker_pool(
            manager.clone(),
            WorkerPoolConfig { max_workers: 1 },
            shutdown.clone(),
        );
        for _ in 0..200 {
            if manager
                .state_of(&receipt.hash)
                .map(|s| s.is_terminal())
                .unwrap_or(false)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        shutdown.cancel();
        pool.await.unwrap();

        assert_eq!(manager.state_of(&receipt.hash), Some(JobState::Completed));
        assert!(harness.success.get(&receipt.hash).await.unwrap().is_some());
        assert!(harness.failures.get(&receipt.hash).await.unwrap().is_none());
    }
}
