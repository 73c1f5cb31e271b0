//! HTTP transport for the sync API.
//!
//! Routes live under `/api/v1/sync`. Every response uses the envelope
//! `{code, data?, message, kind?, suggestion?}`: `code` is 0 on success and 1
//! on failure. Malformed bodies are answered with HTTP 400; failures of the
//! operation itself are HTTP 200 with `code: 1`.

use crate::config::DefaultEndpoint;
use crate::error::{ErrorKind, SyncError, SyncOutcome};
use crate::models::ConnectionConfig;
use crate::sync::Orchestrator;
use crate::transport::Transport;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Path prefix of every sync route.
pub const API_PREFIX: &str = "/api/v1/sync";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    default_endpoint: Arc<DefaultEndpoint>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, default_endpoint: DefaultEndpoint) -> Self {
        Self {
            orchestrator,
            default_endpoint: Arc::new(default_endpoint),
        }
    }

    fn request_timeout(&self) -> Duration {
        self.orchestrator.settings().request_timeout
    }
}

/// Response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: Option<T>, message: impl Into<String>) -> Response {
        let body = Self {
            code: 0,
            data,
            message: message.into(),
            kind: None,
            suggestion: None,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

fn failure(err: &SyncError) -> Response {
    let body = ApiResponse::<()> {
        code: 1,
        data: None,
        message: err.to_string(),
        kind: Some(err.kind()),
        suggestion: err.suggestion().map(str::to_string),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Describe a rejected body without echoing any of its values.
///
/// serde's messages quote the offending value, which may be a credential.
fn rejection_reason(rejection: &JsonRejection) -> &'static str {
    match rejection {
        JsonRejection::JsonSyntaxError(_) => "malformed JSON body",
        JsonRejection::JsonDataError(_) => "body does not match the expected fields",
        JsonRejection::MissingJsonContentType(_) => "expected Content-Type: application/json",
        _ => "unreadable request body",
    }
}

fn bad_request(rejection: JsonRejection) -> Response {
    let reason = rejection_reason(&rejection);
    warn!(status = rejection.status().as_u16(), reason, "Rejected request body");
    let body = ApiResponse::<()> {
        code: 1,
        data: None,
        message: format!("invalid request: {}", reason),
        kind: Some(ErrorKind::InvalidInput),
        suggestion: None,
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    #[serde(flatten)]
    pub remote: ConnectionConfig,
    /// Defaults to the tables present on both sides
    #[serde(default)]
    pub tables: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(flatten)]
    pub remote: ConnectionConfig,
    /// Required; an empty list is rejected by the orchestrator
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ConfigView<'a> {
    remote: &'a DefaultEndpoint,
    local: String,
    supported_engines: Vec<&'static str>,
    batch_size: usize,
    max_concurrent_tables: usize,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/config", get(get_config))
        .route("/test-connection", post(test_connection))
        .route("/compare", post(compare))
        .route("/execute", post(execute));

    Router::new()
        .nest(API_PREFIX, api)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request handled"
    );
    response
}

/// Run an operation in its own task, bounded by the request timeout.
///
/// The operation is cancelled when the timeout fires or when the client goes
/// away (the handler future is dropped). On timeout the partial outcome is
/// still returned.
async fn run_cancellable<T, F, Fut>(state: &AppState, operation: F) -> SyncOutcome<T>
where
    F: FnOnce(Arc<Orchestrator>, CancellationToken) -> Fut,
    Fut: Future<Output = SyncOutcome<T>> + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancellationToken::new();
    let _on_disconnect = cancel.clone().drop_guard();
    let mut task = tokio::spawn(operation(state.orchestrator.clone(), cancel.clone()));

    let joined = match tokio::time::timeout(state.request_timeout(), &mut task).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!(
                timeout_secs = state.request_timeout().as_secs(),
                "Request timed out, cancelling operation"
            );
            cancel.cancel();
            task.await
        }
    };
    joined.map_err(|e| SyncError::internal(format!("Operation task failed: {}", e)))?
}

async fn get_config(State(state): State<AppState>) -> Response {
    let view = ConfigView {
        remote: &state.default_endpoint,
        local: state.orchestrator.local_endpoint().endpoint_label(),
        supported_engines: state.orchestrator.registry().supported_engines(),
        batch_size: state.orchestrator.settings().batch_size,
        max_concurrent_tables: state.orchestrator.settings().max_concurrent_tables,
    };
    ApiResponse::ok(Some(view), "")
}

async fn test_connection(
    State(state): State<AppState>,
    payload: Result<Json<ConnectionConfig>, JsonRejection>,
) -> Response {
    let Json(config) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection),
    };

    let outcome = run_cancellable(&state, move |orchestrator, cancel| async move {
        orchestrator.test_connection(&config, &cancel).await
    })
    .await;

    match outcome {
        Ok(check) => ApiResponse::ok(Some(check), "connection ok"),
        Err(e) => {
            warn!(error = %e, "Connection test failed");
            failure(&e)
        }
    }
}

async fn compare(
    State(state): State<AppState>,
    payload: Result<Json<CompareRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection),
    };

    let outcome = run_cancellable(&state, move |orchestrator, cancel| async move {
        orchestrator
            .compare(&request.remote, request.tables, &cancel)
            .await
    })
    .await;

    match outcome {
        Ok(results) => ApiResponse::ok(Some(results), ""),
        Err(e) => {
            warn!(error = %e, "Compare failed");
            failure(&e)
        }
    }
}

async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection),
    };

    let outcome = run_cancellable(&state, move |orchestrator, cancel| async move {
        orchestrator
            .execute(&request.remote, request.tables, &cancel)
            .await
    })
    .await;

    match outcome {
        Ok(results) => ApiResponse::ok(Some(results), "sync finished"),
        Err(e) => {
            warn!(error = %e, "Sync failed");
            failure(&e)
        }
    }
}

/// HTTP transport implementation.
pub struct HttpTransport {
    state: AppState,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
}

impl HttpTransport {
    pub fn new(state: AppState, host: impl Into<String>, port: u16) -> Self {
        Self {
            state,
            host: host.into(),
            port,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> SyncOutcome<()> {
        let bind_addr = self.bind_addr();
        info!("Starting sync server on {}", bind_addr);

        let app = router(self.state.clone());

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            SyncError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        info!(prefix = API_PREFIX, "Sync API ready");

        // Long-running syncs may keep the server alive; force exit after a
        // timeout once a shutdown signal is received
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(SyncError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for in-flight requests (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SyncSettings};
    use crate::db::DriverRegistry;
    use axum::body::Body;
    use axum::http::{Request, header};
    use serde_json::{Value, json};
    use tower::util::ServiceExt;

    fn app() -> Router {
        let config = Config {
            remote_db_type: "postgres".to_string(),
            remote_db_host: "db.internal".to_string(),
            remote_db_password: Some("hunter2".to_string()),
            ..Config::default()
        };
        let orchestrator = Orchestrator::new(
            Arc::new(DriverRegistry::with_defaults()),
            SyncSettings::default(),
            ConnectionConfig::sqlite("local.db"),
        );
        router(AppState::new(
            Arc::new(orchestrator),
            config.default_endpoint(),
        ))
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post(path: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("{}{}", API_PREFIX, path))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_config() {
        let request = Request::builder()
            .uri(format!("{}/config", API_PREFIX))
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 0);
        assert_eq!(body["data"]["remote"]["port"], 5432);
        assert_eq!(body["data"]["remote"]["has_password"], true);
        assert_eq!(
            body["data"]["supported_engines"],
            json!(["mysql", "postgres", "sqlite"])
        );
        assert!(!body.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_unsupported_engine() {
        let body = json!({"db_type": "mongo", "host": "h", "port": 27017, "user": "u", "db_name": "d"});
        let (status, body) = call(app(), post("/test-connection", body.to_string())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 1);
        assert_eq!(body["kind"], "unsupported_engine");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (status, body) = call(app(), post("/compare", "{not json".to_string())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 1);
        assert_eq!(body["message"], "invalid request: malformed JSON body");
    }

    #[tokio::test]
    async fn test_rejected_body_does_not_echo_values() {
        let body = json!({
            "db_type": "postgres",
            "host": "db.internal",
            "user": "app",
            "password": 987654321,
            "db_name": "app"
        });
        let (status, body) = call(app(), post("/test-connection", body.to_string())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_input");
        assert_eq!(
            body["message"],
            "invalid request: body does not match the expected fields"
        );
        assert!(!body.to_string().contains("987654321"));
    }

    #[tokio::test]
    async fn test_execute_requires_tables_field() {
        let body = json!({"db_type": "sqlite", "db_name": "remote.db"});
        let (status, body) = call(app(), post("/execute", body.to_string())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 1);
    }

    #[tokio::test]
    async fn test_execute_with_empty_tables() {
        let body = json!({"db_type": "sqlite", "db_name": "remote.db", "tables": []});
        let (status, body) = call(app(), post("/execute", body.to_string())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 1);
        assert_eq!(body["kind"], "invalid_input");
    }

    #[tokio::test]
    async fn test_connection_ok() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let body = json!({"db_type": "sqlite", "db_name": file.path().to_string_lossy()});
        let (status, body) = call(app(), post("/test-connection", body.to_string())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 0);
        assert_eq!(body["message"], "connection ok");
        assert_eq!(body["data"]["db_type"], "sqlite");
    }

    #[tokio::test]
    async fn test_password_not_echoed_on_failure() {
        let body = json!({
            "db_type": "postgres",
            "host": "127.0.0.1",
            "port": 1,
            "user": "app",
            "password": "s3cr3t-pw",
            "db_name": "app",
            "ssl_mode": "bogus"
        });
        let (_, body) = call(app(), post("/test-connection", body.to_string())).await;

        assert_eq!(body["code"], 1);
        assert_eq!(body["kind"], "invalid_input");
        assert!(!body.to_string().contains("s3cr3t-pw"));
    }
}
