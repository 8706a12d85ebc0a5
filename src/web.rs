use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::brain_api::{BrainApi, BrainCategory};
use crate::errors::LocalError;
use crate::reconcile::ReconcileReport;
use crate::scheduler::{JobError, Jobs};
use crate::settings::BrainSettings;
use crate::store::RunRecord;

#[derive(Clone)]
pub struct AppState {
    pub jobs: Jobs,
    pub brain: Option<BrainSettings>,
}

#[derive(Debug, serde_derive::Serialize)]
pub struct JobView {
    pub name: String,
    pub statuses: Vec<i64>,
    pub target_status: i64,
    pub older_than_days: i64,
    pub every_secs: u64,
    pub last_run: Option<RunRecord>,
}

pub struct WebError(StatusCode, String);

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<JobError> for WebError {
    fn from(e: JobError) -> Self {
        let status = match &e {
            JobError::Unknown(_) => StatusCode::NOT_FOUND,
            JobError::Busy(_) => StatusCode::CONFLICT,
            JobError::Failed(_) => StatusCode::BAD_GATEWAY,
        };
        WebError(status, e.to_string())
    }
}

impl From<LocalError> for WebError {
    fn from(e: LocalError) -> Self {
        let status = match &e {
            LocalError::Store(_) | LocalError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        WebError(status, e.to_string())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:name/run", post(run_job))
        .route("/brain/categories", get(brain_categories))
        .route("/brain/products/:id", get(brain_product))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<JobView>>, WebError> {
    let mut views = Vec::new();
    for job in state.jobs.all() {
        let rule = &job.rule;
        views.push(JobView {
            name: rule.name.clone(),
            statuses: rule.statuses.iter().map(|s| s.code()).collect(),
            target_status: rule.target_status.code(),
            older_than_days: rule.older_than_days,
            every_secs: rule.every.as_secs(),
            last_run: state.jobs.store().last_run(&rule.name)?,
        });
    }
    Ok(Json(views))
}

async fn run_job(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ReconcileReport>, WebError> {
    log::info!("{name} - run requested over HTTP");
    Ok(Json(state.jobs.run_now(&name).await?))
}

fn brain_api(state: &AppState) -> Result<BrainApi, WebError> {
    let settings = state.brain.as_ref().ok_or_else(|| {
        WebError(
            StatusCode::SERVICE_UNAVAILABLE,
            "brain is not configured".to_string(),
        )
    })?;
    Ok(BrainApi::new(settings, state.jobs.store().clone())?)
}

async fn brain_categories(State(state): State<AppState>) -> Result<Json<Vec<BrainCategory>>, WebError> {
    let mut api = brain_api(&state)?;
    Ok(Json(api.categories().await?))
}

async fn brain_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, WebError> {
    let mut api = brain_api(&state)?;
    Ok(Json(api.product(id).await?))
}
