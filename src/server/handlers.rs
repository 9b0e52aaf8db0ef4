//! API request handlers

use super::error::{Result, ServerError};
use super::state::AppState;
use crate::error::WizardError;
use crate::preprocessing::{overview, PipelinePlan};
use crate::session::{PipelineState, SessionId};
use crate::table::preview;
use crate::training::{EstimatorKind, ProblemKind, TrainingRequest};
use crate::visualization::{ChartSource, VisualizationRequest};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Rows shown in previews unless the client asks otherwise
const DEFAULT_PREVIEW_ROWS: usize = 10;
const MAX_PREVIEW_ROWS: usize = 100;

fn session_not_found(id: &SessionId) -> ServerError {
    ServerError::NotFound(format!("Session not found: {}", id))
}

/// Lock one session and run `f` on the blocking pool.
///
/// Only this session waits on the lock; the async workers stay free.
async fn with_session<T, F>(state: &AppState, id: SessionId, f: F) -> Result<T>
where
    F: FnOnce(&mut PipelineState) -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let shared = state.sessions.get(&id).await.ok_or_else(|| session_not_found(&id))?;
    let mut guard = shared.lock_owned().await;
    let out = tokio::task::spawn_blocking(move || f(&mut guard))
        .await
        .map_err(|e| ServerError::Internal(format!("Worker task failed: {}", e)))??;
    Ok(out)
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.len().await,
        "uptime_secs": (chrono::Utc::now() - state.started_at).num_seconds(),
    }))
}

#[derive(Deserialize)]
pub struct EstimatorQuery {
    #[serde(default)]
    problem: ProblemKind,
}

pub async fn list_estimators(Query(query): Query<EstimatorQuery>) -> Json<serde_json::Value> {
    Json(json!({
        "problem": query.problem,
        "estimators": EstimatorKind::available(query.problem),
    }))
}

// ============================================================================
// Session Handlers
// ============================================================================

pub async fn create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let id = state.sessions.create().await;
    (StatusCode::CREATED, Json(json!({ "session_id": id })))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<Json<serde_json::Value>> {
    let shared = state.sessions.get(&id).await.ok_or_else(|| session_not_found(&id))?;
    let summary = shared.lock().await.summary();
    Ok(Json(json!({ "session_id": id, "session": summary })))
}

pub async fn delete_session(State(state): State<Arc<AppState>>, Path(id): Path<SessionId>) -> Result<StatusCode> {
    if state.sessions.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(session_not_found(&id))
    }
}

// ============================================================================
// Data Handlers
// ============================================================================

pub async fn upload_data(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") && field.file_name().is_none() {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ServerError::BadRequest("Uploaded file has no name".to_string()))?;
        let data = field.bytes().await.map_err(|e| ServerError::BadRequest(e.to_string()))?;
        info!(session = %id, file = %file_name, bytes = data.len(), "Received upload");

        let name = file_name.clone();
        let (profile, head) = with_session(&state, id, move |session| {
            let profile = session.ingest(&data, &name)?;
            let head = session
                .raw()
                .map(|d| preview(&d.table, DEFAULT_PREVIEW_ROWS))
                .unwrap_or_default();
            Ok((profile, head))
        })
        .await?;

        return Ok(Json(json!({
            "success": true,
            "file_name": file_name,
            "profile": profile,
            "preview": head,
        })));
    }

    Err(ServerError::BadRequest("No file uploaded".to_string()))
}

#[derive(Deserialize)]
pub struct PreviewQuery {
    rows: Option<usize>,
    #[serde(default)]
    source: ChartSource,
}

pub async fn get_data_preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<serde_json::Value>> {
    let shared = state.sessions.get(&id).await.ok_or_else(|| session_not_found(&id))?;
    let session = shared.lock().await;

    let n_rows = query.rows.unwrap_or(DEFAULT_PREVIEW_ROWS).min(MAX_PREVIEW_ROWS);
    let table = match query.source {
        ChartSource::Raw => session
            .raw()
            .map(|d| &d.table)
            .ok_or_else(|| WizardError::precondition("preview data", "upload a dataset"))?,
        ChartSource::Processed => session
            .processed()
            .map(|p| &p.table)
            .ok_or_else(|| WizardError::precondition("preview processed data", "apply preprocessing"))?,
    };

    Ok(Json(json!({
        "source": query.source,
        "total_rows": table.height(),
        "preview": preview(table, n_rows),
    })))
}

// ============================================================================
// Pipeline Handlers
// ============================================================================

pub async fn get_preprocessing_overview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<Json<serde_json::Value>> {
    let summary = with_session(&state, id, |session| {
        let raw = session
            .raw()
            .ok_or_else(|| WizardError::precondition("review preprocessing options", "upload a dataset"))?;
        overview(&raw.table)
    })
    .await?;
    Ok(Json(json!(summary)))
}

pub async fn run_preprocessing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    Json(plan): Json<PipelinePlan>,
) -> Result<Json<serde_json::Value>> {
    let body = with_session(&state, id, move |session| {
        let processed = session.apply_pipeline(&plan)?;
        Ok(json!({
            "success": true,
            "report": processed.report,
            "steps": processed.steps,
            "preview": preview(&processed.table, DEFAULT_PREVIEW_ROWS),
        }))
    })
    .await?;
    Ok(Json(body))
}

pub async fn train_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    Json(request): Json<TrainingRequest>,
) -> Result<Json<serde_json::Value>> {
    let report = with_session(&state, id, move |session| {
        let artifact = session.train(&request)?;
        Ok(serde_json::to_value(&artifact.report)?)
    })
    .await?;
    Ok(Json(report))
}

pub async fn download_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<impl IntoResponse> {
    let bytes = with_session(&state, id, |session| session.predictor()?.to_bytes()).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=\"model.json\""),
            ),
        ],
        bytes,
    ))
}

pub async fn visualize(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    Json(request): Json<VisualizationRequest>,
) -> Result<Json<serde_json::Value>> {
    let chart = with_session(&state, id, move |session| session.visualize(&request)).await?;
    Ok(Json(json!(chart)))
}
