use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::post, Json, Router};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::limit::ConcurrencyLimitLayer;

use crate::config::ServerConfig;
use crate::data::{CohortId, SolverInput, SolverOutput};
use crate::error::{RunError, SolverError, StoreError};
use crate::solver::{self, SolveOptions};
use crate::store::{self, CohortStore, JsonDirStore};

/// Inline solves running at the same time.
const MAX_INLINE_SOLVES: usize = 4;

type ApiError = (StatusCode, String);

#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<Box<dyn CohortStore + Send>>>,
    default_options: SolveOptions,
}

impl AppState {
    pub fn new(store: impl CohortStore + Send + 'static, default_options: SolveOptions) -> Self {
        Self {
            store: Arc::new(Mutex::new(Box::new(store))),
            default_options,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    pub input: SolverInput,
    #[serde(default)]
    pub options: Option<SolveOptions>,
}

async fn solve_handler(
    State(state): State<AppState>,
    Json(request): Json<SolveRequest>,
) -> Result<Json<SolverOutput>, ApiError> {
    let options = request.options.unwrap_or(state.default_options);
    let result = tokio::task::spawn_blocking(move || solver::solve(&request.input, &options))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    match result {
        Ok(output) => Ok(Json(output)),
        Err(e) => Err(solver_error(e)),
    }
}

async fn solve_cohort_handler(
    State(state): State<AppState>,
    Path(cohort): Path<CohortId>,
    options: Option<Json<SolveOptions>>,
) -> Result<Json<SolverOutput>, ApiError> {
    let options = options.map_or(state.default_options.clone(), |Json(o)| o);
    let store = state.store.clone();
    // One cohort run at a time per store.
    let result = tokio::task::spawn_blocking(move || {
        let mut store = store.blocking_lock();
        store::run_cohort(&mut **store, cohort, &options)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    match result {
        Ok(output) => Ok(Json(output)),
        Err(RunError::Solver(e)) => Err(solver_error(e)),
        Err(RunError::Store(StoreError::UnknownCohort(id))) => {
            Err((StatusCode::NOT_FOUND, format!("cohort {id} not found")))
        }
        Err(RunError::Store(e)) => {
            error!("Store failure for cohort {}: {}", cohort, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

fn solver_error(e: SolverError) -> ApiError {
    let status = match &e {
        SolverError::CohortPublished(_) => StatusCode::CONFLICT,
        e if e.is_configuration() => StatusCode::UNPROCESSABLE_ENTITY,
        SolverError::Cancelled | SolverError::TimeBudgetExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => {
            error!("Solve aborted: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/internships/solve",
            post(solve_handler).layer(ConcurrencyLimitLayer::new(MAX_INLINE_SOLVES)),
        )
        .route("/v1/cohorts/:cohort/solve", post(solve_cohort_handler))
        .with_state(state)
}

pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    let state = AppState::new(JsonDirStore::new(&config.data_dir), config.default_options.clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    info!(
        "Server running at http://{} (cohorts in {})",
        listener.local_addr()?,
        config.data_dir.display()
    );

    axum::serve(listener, app).await
}
