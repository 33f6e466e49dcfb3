use axum::{extract::Path, http::StatusCode, response::IntoResponse, Extension, Json};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use blog_generator_cli::{
    remote::{GenerateBlogRequest, GenerateBlogResponse},
    submission, BatchResult, Error, ErrorKind,
};

use crate::state::{AppState, BatchStatus};

#[derive(Serialize)]
pub struct BatchCreated {
    pub batch_id: Uuid,
}

#[derive(Serialize)]
pub struct BatchPollResponse {
    pub status: String,
    pub result: Option<BatchResult>,
    pub error: Option<String>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error_response(e: &Error) -> ApiError {
    let status = match e.kind() {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

/// POST /generate_blog
pub async fn generate_blog(
    Extension(state): Extension<AppState>,
    Json(payload): Json<GenerateBlogRequest>,
) -> Result<Json<GenerateBlogResponse>, ApiError> {
    let batch = submission::from_pairs(&payload.urls_and_indices, payload.no_words)
        .map_err(|e| error_response(&e))?;

    // a dropped request (client gone) cancels the jobs still running
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let result = state.pipeline.run_with_cancel(batch, cancel).await.map_err(|e| {
        tracing::error!(error = %e, "batch rejected");
        error_response(&e)
    })?;

    Ok(Json(GenerateBlogResponse::from(&result)))
}

/// POST /api/batches
pub async fn submit_batch(
    Extension(state): Extension<AppState>,
    Json(payload): Json<GenerateBlogRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // 1) Validate before accepting anything
    let batch = submission::from_pairs(&payload.urls_and_indices, payload.no_words)
        .map_err(|e| error_response(&e))?;

    // 2) Register as pending
    let batch_id = Uuid::new_v4();
    let token = CancellationToken::new();
    state.jobs.insert(batch_id, BatchStatus::Pending);
    state.cancels.insert(batch_id, token.clone());
    tracing::info!(%batch_id, jobs = batch.len(), "batch accepted");

    // 3) Run in the background
    let state_clone = state.clone();
    tokio::spawn(async move {
        let status = match state_clone.pipeline.run_with_cancel(batch, token).await {
            Ok(result) => BatchStatus::Done {
                result,
                finished_at: Instant::now(),
            },
            Err(e) => BatchStatus::Failed {
                error: e.to_string(),
                finished_at: Instant::now(),
            },
        };
        state_clone.jobs.insert(batch_id, status);
        state_clone.cancels.remove(&batch_id);
    });

    // 4) 202 with the id right away
    Ok((StatusCode::ACCEPTED, Json(BatchCreated { batch_id })))
}

impl From<BatchStatus> for BatchPollResponse {
    fn from(status: BatchStatus) -> Self {
        match status {
            BatchStatus::Pending => BatchPollResponse {
                status: "pending".to_string(),
                result: None,
                error: None,
            },
            BatchStatus::Done { result, .. } => BatchPollResponse {
                status: "done".to_string(),
                result: Some(result),
                error: None,
            },
            BatchStatus::Failed { error, .. } => BatchPollResponse {
                status: "failed".to_string(),
                result: None,
                error: Some(error),
            },
        }
    }
}

/// GET /api/batches/{id}
///
/// A finished batch is handed out once and then forgotten.
pub async fn poll_batch(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Some((_, status)) = state.jobs.remove_if(&id, |_, status| status.is_finished()) {
        return (StatusCode::OK, Json(json!(BatchPollResponse::from(status))));
    }
    if state.jobs.contains_key(&id) {
        (StatusCode::OK, Json(json!(BatchPollResponse::from(BatchStatus::Pending))))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "error": "Batch not found" })))
    }
}

/// DELETE /api/batches/{id}
pub async fn cancel_batch(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Some(token) = state.cancels.get(&id) {
        token.cancel();
        tracing::info!(batch_id = %id, "batch cancellation requested");
        (StatusCode::ACCEPTED, Json(json!({ "status": "cancelling" })))
    } else if state.jobs.contains_key(&id) {
        (StatusCode::CONFLICT, Json(json!({ "error": "Batch already finished" })))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "error": "Batch not found" })))
    }
}
