use std::collections::HashMap;
use std::{fs, path::PathBuf};

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use kaon::{
    library, Executor, ExecutorCatalog, RunContext, RunState,
    SuiteRunner, TestSuite,
};
use serde_json::json;
use tokio::task::JoinHandle;

const TOKEN: &str = "tok-integration";

struct TestServer {
    base_url: String,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let app = Router::new()
            .route(
                "/auth/token",
                post(|| async move { TOKEN.to_string() }),
            )
            .route(
                "/v1/accounts",
                get(|headers: HeaderMap| async move {
                    let authorized = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v == format!("Bearer {TOKEN}"))
                        .unwrap_or(false);
                    if authorized {
                        (
                            StatusCode::OK,
                            Json(json!({
                                "accounts": [
                                    {"id": "acc-1"},
                                    {"id": "acc-2"}
                                ]
                            })),
                        )
                    } else {
                        (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"error": "missing token"})),
                        )
                    }
                }),
            )
            .route(
                "/v1/accounts/:id",
                get(|Path(id): Path<String>| async move {
                    Json(json!({
                        "id": id,
                        "balance": 1250
                    }))
                }),
            );

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

        let handle = tokio::spawn(async move {
            if let Err(err) = server.await {
                eprintln!("test server error: {err}");
            }
        });
        let base_url = format!("http://{addr}");

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                let _ = handle.await;
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_fixture(name: &str, base_url: &str) -> String {
    let path = fixtures_dir().join(name);
    let content = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read {path:?}: {e}"));
    content.replace("__BASE_URL__", base_url)
}

fn load_suite_fixture(name: &str, base_url: &str) -> TestSuite {
    TestSuite::from_yaml(&load_fixture(name, base_url))
        .unwrap_or_else(|e| panic!("failed to parse suite {name}: {e}"))
}

fn load_fixture_library() -> Vec<Executor> {
    let files =
        library::collect_library_files(fixtures_dir().join("lib"))
            .expect("library fixtures should be discoverable");
    library::load_library(&files)
        .expect("library fixtures should parse")
}

#[tokio::test]
async fn chained_suite_resolves_setup_executor_and_result_scopes() {
    let server = TestServer::spawn().await;
    let suite =
        load_suite_fixture("suite_accounts.yaml", &server.base_url);
    let runner = SuiteRunner::new(ExecutorCatalog::new(
        load_fixture_library(),
    ));

    let ctx = RunContext::new();
    let report = runner.run(&suite, &ctx).await;

    assert!(report.success(), "suite should pass: {report:?}");
    assert_eq!(report.cases.len(), 2);

    // executor output landed in the case's cumulative result
    assert_eq!(
        ctx.history
            .lookup("authenticate and fetch accounts", "accessToken")
            .as_deref(),
        Some(TOKEN)
    );
    // the authorized fetch actually carried the templated header
    assert_eq!(
        ctx.history
            .lookup("authenticate and fetch accounts", "fetchStatus")
            .as_deref(),
        Some("200")
    );
    // setup executor output was visible as a global in every case
    assert!(ctx
        .history
        .lookup("account detail", "detailBody")
        .is_some_and(|body| body.contains("acc-1")));
    // the named executor step is addressable after the run
    assert_eq!(
        ctx.history.lookup("login", "statusCode").as_deref(),
        Some("200")
    );

    server.shutdown().await;
}

#[tokio::test]
async fn batch_run_loads_files_from_disk() {
    let server = TestServer::spawn().await;

    let dir = tempfile::tempdir().unwrap();
    for name in ["suite_accounts.yaml", "suite_unauthorized.yaml"] {
        fs::write(
            dir.path().join(name),
            load_fixture(name, &server.base_url),
        )
        .unwrap();
    }

    let runner = SuiteRunner::new(ExecutorCatalog::new(
        load_fixture_library(),
    ));
    let files = library::collect_test_files(dir.path()).unwrap();
    assert_eq!(files.len(), 2);

    let reports = runner
        .run_files(&files, &HashMap::new())
        .await
        .expect("batch run should not hit a configuration error");

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.success()), "{reports:?}");

    // the authorized fetch recorded its status in the report
    let accounts = reports
        .iter()
        .find(|r| r.name == "accounts end to end")
        .unwrap();
    let fetch_case = &accounts.cases[0];
    assert_eq!(fetch_case.steps[1].status_code, Some(200));

    server.shutdown().await;
}

#[tokio::test]
async fn non_2xx_response_is_recorded_not_fatal() {
    let server = TestServer::spawn().await;
    let suite =
        load_suite_fixture("suite_unauthorized.yaml", &server.base_url);
    let runner = SuiteRunner::new(ExecutorCatalog::new(
        load_fixture_library(),
    ));

    let ctx = RunContext::new();
    let report = runner.run(&suite, &ctx).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(
        ctx.history
            .lookup("accounts without a token", "fetchStatus")
            .as_deref(),
        Some("401")
    );

    server.shutdown().await;
}

#[tokio::test]
async fn executor_invoking_executor_against_live_server() {
    let server = TestServer::spawn().await;

    let session = Executor::from_yaml(
        "executor: open-session\nsteps:\n  - type: authenticate\n    name: session-auth\noutput:\n  sessionToken: \"{{result.accessToken}}\"\n",
    )
    .unwrap();
    let mut executors = load_fixture_library();
    executors.push(session);

    let suite = TestSuite::from_yaml(&format!(
        "name: nested\nvars:\n  gatewayUrl: {}\ntestcases:\n  - name: open a session\n    steps:\n      - type: open-session\n        input:\n          user: nested-user\n",
        server.base_url
    ))
    .unwrap();

    let runner = SuiteRunner::new(ExecutorCatalog::new(executors));
    let ctx = RunContext::new();
    let report = runner.run(&suite, &ctx).await;

    assert!(report.success(), "{report:?}");
    assert_eq!(
        ctx.history
            .lookup("open a session", "sessionToken")
            .as_deref(),
        Some(TOKEN)
    );

    server.shutdown().await;
}

#[tokio::test]
async fn missing_library_directory_fails_before_any_dispatch() {
    let err = library::collect_library_files(
        fixtures_dir().join("no-such-lib"),
    )
    .unwrap_err();
    assert!(err.to_string().contains("library path not found"));
}
