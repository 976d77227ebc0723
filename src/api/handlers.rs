use super::AppState;
use crate::error::SplitError;
use crate::models::{ChapterDefinition, ChapterEdit, DocumentEvidence, SplitTask, TaskId, ValidationReport};
use crate::services::detector::Detection;
use crate::services::orchestrator::QueueStatus;
use crate::services::validator::{repair_after_edit, validate};
use axum::{
    Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use http::StatusCode;
use serde::{Deserialize, Serialize};

/// A [`SplitError`] rendered as `{ "error": ..., "issues": [...] }`.
#[derive(Debug)]
pub struct ApiError(pub SplitError);

impl From<SplitError> for ApiError {
    fn from(err: SplitError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    issues: &'a [String],
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SplitError::InvalidDocument { .. } | SplitError::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }
            SplitError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            SplitError::IrreparableBoundaryState { .. } => StatusCode::CONFLICT,
            SplitError::SplitFailure { .. }
            | SplitError::InternalRegistry(_)
            | SplitError::Config { .. }
            | SplitError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            issues: self.0.issues(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Page counts in the request layer arrive signed so a non-positive count is reported
/// as an invalid document rather than a parse failure.
fn positive_pages(total_pages: i64) -> Result<u32, SplitError> {
    u32::try_from(total_pages)
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| SplitError::invalid_document(format!("total_pages is {total_pages}")))
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[derive(Deserialize)]
pub struct DetectRequest {
    pub total_pages: i64,
    #[serde(default)]
    pub evidence: DocumentEvidence,
    pub min_pages_per_chapter: Option<u32>,
}

pub async fn detect_chapters(
    State(state): State<AppState>,
    Json(req): Json<DetectRequest>,
) -> ApiResult<Json<Detection>> {
    let total_pages = positive_pages(req.total_pages)?;
    let min_pages = req
        .min_pages_per_chapter
        .unwrap_or(state.min_pages_per_chapter);
    let detection = state
        .detector
        .detect_with_method(&req.evidence, total_pages, min_pages)?;
    Ok(Json(detection))
}

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub chapters: Vec<ChapterDefinition>,
    pub total_pages: i64,
}

pub async fn validate_chapters(Json(req): Json<ValidateRequest>) -> Json<ValidationReport> {
    // Negative counts clamp to zero, which validation reports as an issue.
    let total_pages = u32::try_from(req.total_pages.max(0)).unwrap_or(u32::MAX);
    Json(validate(&req.chapters, total_pages))
}

#[derive(Deserialize)]
pub struct RepairRequest {
    pub chapters: Vec<ChapterDefinition>,
    pub total_pages: i64,
    pub edit: ChapterEdit,
}

#[derive(Serialize)]
pub struct ChaptersResponse {
    pub chapters: Vec<ChapterDefinition>,
}

pub async fn repair_chapters(Json(req): Json<RepairRequest>) -> ApiResult<Json<ChaptersResponse>> {
    let total_pages = positive_pages(req.total_pages)?;
    let chapters = repair_after_edit(req.chapters, &req.edit, total_pages)?;
    Ok(Json(ChaptersResponse { chapters }))
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub file_id: String,
    pub chapters: Vec<ChapterDefinition>,
    pub total_pages: i64,
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<SplitTask>)> {
    let total_pages = positive_pages(req.total_pages)?;
    let task = state
        .orchestrator
        .create_split_task(&req.file_id, &req.chapters, total_pages)?;
    Ok((StatusCode::ACCEPTED, Json(task)))
}

#[derive(Deserialize)]
pub struct ListTasksQuery {
    pub file_id: Option<String>,
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Json<Vec<SplitTask>> {
    Json(state.orchestrator.list_tasks(query.file_id.as_deref()))
}

pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<SplitTask>> {
    let task = state.orchestrator.get_task_status(&TaskId(task_id))?;
    Ok(Json(task))
}

pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(state.orchestrator.queue_status())
}
