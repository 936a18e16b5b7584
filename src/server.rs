//! HTTP front end for the repository management API.
//!
//! Every command is a `GET` carrying its parameters in the query string, so
//! the signed values travel exactly as the client encoded them.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/repo/reindex` | Force a full reindex (`pub`, `sig`, `hmac`) |
//! | `GET` | `/api/repo/index` | Force an index job for `repoUrl` |
//! | `GET` | `/api/repo/list` | List every repository descriptor |
//! | `GET` | `/api/repo/delete` | Queue `reponame` for deletion |
//! | `GET` | `/api/repo/add` | Register a repository |
//! | `GET` | `/api/repo/repo` | Display lookup for `reponame`, credentials stripped |
//! | `GET` | `/api/repo/filecount` | Indexed file count for `reponame` (plain text) |
//! | `GET` | `/api/repo/repotree` | Indexed file paths for `reponame` |
//! | `GET` | `/api/repo/indextime` | When `reponame` was last indexed, e.g. `3 hours ago` (plain text) |
//! | `GET` | `/api/repo/averageindextime` | Average index duration of `reponame` in seconds, plus one (plain text) |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! Command endpoints always answer `200` with a `CommandResult` body:
//!
//! ```json
//! { "success": false, "message": "invalid signed url" }
//! ```
//!
//! Display endpoints answer `500` with
//! `{ "error": { "code": "internal", "message": "..." } }` if a collaborator fails.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use repo_gate_core::models::{CommandParams, CommandResult, FileTree, RepoDescriptor};
use repo_gate_core::store::AuditSink;
use repo_gate_core::validate::DefaultDescriptorValidator;
use repo_gate_core::{Collaborators, CommandDispatcher};

use crate::audit::{FileAuditSink, TracingAuditSink};
use crate::config::Config;
use crate::index::SqliteIndexService;
use crate::queue::{self, JobReceiver};
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<CommandDispatcher>,
}

/// A dispatcher wired to the SQLite store, plus the pieces the server
/// drives in the background.
pub struct Services {
    pub dispatcher: Arc<CommandDispatcher>,
    pub store: Arc<SqliteStore>,
    pub index: Arc<SqliteIndexService>,
    pub jobs: JobReceiver,
}

/// Connects to the database, applies migrations, and builds the dispatcher.
pub async fn build_services(config: &Config) -> anyhow::Result<Services> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let store = Arc::new(SqliteStore::new(pool.clone()));
    let index = Arc::new(SqliteIndexService::new(pool));
    let (job_queue, jobs) = queue::channel(config.queue.capacity);

    let audit: Arc<dyn AuditSink> = match &config.audit.path {
        Some(path) => Arc::new(FileAuditSink::open(path)?),
        None => Arc::new(TracingAuditSink),
    };

    let dispatcher = CommandDispatcher::new(
        config.api.settings(),
        Collaborators {
            credentials: store.clone(),
            repos: store.clone(),
            jobs: Arc::new(job_queue),
            index: index.clone(),
            validator: Arc::new(DefaultDescriptorValidator),
            audit,
        },
    );

    Ok(Services {
        dispatcher: Arc::new(dispatcher),
        store,
        index,
        jobs,
    })
}

/// Builds the Axum router for a dispatcher.
pub fn router(dispatcher: Arc<CommandDispatcher>) -> Router {
    let state = AppState { dispatcher };

    Router::new()
        .route("/api/repo/reindex", get(handle_reindex))
        .route("/api/repo/index", get(handle_enqueue))
        .route("/api/repo/list", get(handle_list))
        .route("/api/repo/delete", get(handle_delete))
        .route("/api/repo/add", get(handle_add))
        .route("/api/repo/repo", get(handle_repo_info))
        .route("/api/repo/filecount", get(handle_file_count))
        .route("/api/repo/repotree", get(handle_repo_tree))
        .route("/api/repo/indextime", get(handle_index_time))
        .route("/api/repo/averageindextime", get(handle_average_index_time))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the API server and its background workers.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = build_services(config).await?;
    let settings = services.dispatcher.settings();

    tokio::spawn(services.jobs.drain());
    tokio::spawn(run_delete_worker(
        services.store.clone(),
        Duration::from_secs(config.deletes.interval_secs),
    ));

    let app = router(services.dispatcher);

    tracing::info!(
        bind = %config.server.bind,
        api_enabled = settings.enabled,
        authentication = settings.authentication,
        "repository API listening"
    );
    if settings.enabled && !settings.authentication {
        tracing::warn!("API key authentication is disabled; any caller can mutate repositories");
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically applies queued repository deletes.
async fn run_delete_worker(store: Arc<SqliteStore>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match store.process_delete_queue().await {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "processed repository deletes"),
            Err(e) => tracing::error!(error = ?e, "failed to process delete queue"),
        }
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = ?err, "display lookup failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: "unable to process request".to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Commands ============

async fn handle_reindex(
    State(state): State<AppState>,
    Query(params): Query<CommandParams>,
) -> Json<CommandResult> {
    Json(state.dispatcher.reindex_all(&params).await)
}

async fn handle_enqueue(
    State(state): State<AppState>,
    Query(params): Query<CommandParams>,
) -> Json<CommandResult> {
    Json(state.dispatcher.enqueue(&params).await)
}

async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<CommandParams>,
) -> Json<CommandResult<Vec<RepoDescriptor>>> {
    Json(state.dispatcher.list_all(&params).await)
}

async fn handle_delete(
    State(state): State<AppState>,
    Query(params): Query<CommandParams>,
) -> Json<CommandResult> {
    Json(state.dispatcher.delete(&params).await)
}

async fn handle_add(
    State(state): State<AppState>,
    Query(params): Query<CommandParams>,
) -> Json<CommandResult> {
    Json(state.dispatcher.add(&params).await)
}

// ============ Display lookups ============

async fn handle_repo_info(
    State(state): State<AppState>,
    Query(params): Query<CommandParams>,
) -> Result<Json<Option<RepoDescriptor>>, AppError> {
    Ok(Json(state.dispatcher.repo_info(&params).await?))
}

async fn handle_file_count(
    State(state): State<AppState>,
    Query(params): Query<CommandParams>,
) -> Result<String, AppError> {
    Ok(state.dispatcher.file_count(&params).await?)
}

async fn handle_repo_tree(
    State(state): State<AppState>,
    Query(params): Query<CommandParams>,
) -> Result<Json<Option<FileTree>>, AppError> {
    Ok(Json(state.dispatcher.file_tree(&params).await?))
}

async fn handle_index_time(
    State(state): State<AppState>,
    Query(params): Query<CommandParams>,
) -> Result<String, AppError> {
    Ok(state.dispatcher.index_time(&params).await?)
}

async fn handle_average_index_time(
    State(state): State<AppState>,
    Query(params): Query<CommandParams>,
) -> Result<String, AppError> {
    Ok(state.dispatcher.average_index_time_seconds(&params).await?)
}
