use axum::{Json, extract::State, extract::rejection::JsonRejection, http::StatusCode};
use learn_core::model::{AnswerDraft, AnswerLog, ProgressAction, StudentProgress};
use services::{AppliedAction, ProgressView};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::ApiState;

/// GET /api/progress
pub async fn get_progress(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<ProgressView>> {
    let svc = state.services.progress();
    let progress = svc.load_or_create(user.id).await?;
    Ok(Json(svc.view(progress)))
}

/// PUT /api/progress: whole-record last-write-wins save.
pub async fn put_progress(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<StudentProgress>, JsonRejection>,
) -> ApiResult<Json<ProgressView>> {
    let Json(progress) = payload?;
    let svc = state.services.progress();
    let stored = svc.save(user.id, progress).await?;
    Ok(Json(svc.view(stored)))
}

/// POST /api/progress/actions
pub async fn post_action(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ProgressAction>, JsonRejection>,
) -> ApiResult<Json<AppliedAction>> {
    let Json(action) = payload?;
    let applied = state.services.progress().apply(user.id, &action).await?;
    Ok(Json(applied))
}

/// POST /api/answers
pub async fn post_answer(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<AnswerDraft>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AnswerLog>)> {
    let Json(draft) = payload?;
    let log = state.services.progress().record_answer(user.id, draft).await?;
    Ok((StatusCode::CREATED, Json(log)))
}
