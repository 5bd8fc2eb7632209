use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    extract::{Path, State},
    http::StatusCode,
};
use learn_core::model::{User, UserId};
use serde::Deserialize;
use services::{
    AuthError, NewUserRequest, ProgressView, SeedOutcome, StudentDetail, StudentOverview,
    UserPatch,
};
use subtle::ConstantTimeEq;
use tracing::info;

use crate::auth::{AdminUser, BearerToken};
use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<ApiState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.services.admin().list_users().await?))
}

/// POST /api/admin/users
pub async fn create_user(
    State(state): State<ApiState>,
    _admin: AdminUser,
    payload: Result<Json<NewUserRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let Json(req) = payload?;
    let user = state.services.admin().create_user(req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// PATCH /api/admin/users/:id
pub async fn update_user(
    State(state): State<ApiState>,
    _admin: AdminUser,
    id: Result<Path<UserId>, PathRejection>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> ApiResult<Json<User>> {
    let Path(id) = id?;
    let Json(patch) = payload?;
    Ok(Json(state.services.admin().update_user(id, patch).await?))
}

/// DELETE /api/admin/users/:id
pub async fn delete_user(
    State(state): State<ApiState>,
    AdminUser(admin): AdminUser,
    id: Result<Path<UserId>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.services.admin().delete_user(id).await?;
    info!(admin = %admin.id, user_id = %id, "account removed by admin");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/admin/students
pub async fn list_students(
    State(state): State<ApiState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<StudentOverview>>> {
    Ok(Json(state.services.admin().student_overview().await?))
}

/// GET /api/admin/students/:id
pub async fn student_detail(
    State(state): State<ApiState>,
    _admin: AdminUser,
    id: Result<Path<UserId>, PathRejection>,
) -> ApiResult<Json<StudentDetail>> {
    let Path(id) = id?;
    Ok(Json(state.services.admin().student_detail(id).await?))
}

/// POST /api/admin/students/:id/reset
pub async fn reset_student(
    State(state): State<ApiState>,
    AdminUser(admin): AdminUser,
    id: Result<Path<UserId>, PathRejection>,
) -> ApiResult<Json<ProgressView>> {
    let Path(id) = id?;
    let view = state.services.admin().reset_student(id).await?;
    info!(admin = %admin.id, user_id = %id, "student reset by admin");
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct SeedRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Constant-time check of a presented secret. An unset or empty seed token
/// matches nothing.
fn seed_token_matches(expected: Option<&str>, presented: &str) -> bool {
    expected.is_some_and(|expected| {
        !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
    })
}

/// POST /api/admin/seed
///
/// Accepts either the configured seed token or an admin session, so the
/// first admin can be created on an empty database.
pub async fn seed(
    State(state): State<ApiState>,
    BearerToken(token): BearerToken,
    payload: Result<Json<SeedRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SeedOutcome>)> {
    if !seed_token_matches(state.config.seed_token.as_deref(), &token) {
        state
            .services
            .auth()
            .require_admin(&token)
            .await
            .map_err(|e| match e {
                AuthError::InvalidToken => ApiError::Unauthorized("invalid seed token".into()),
                other => other.into(),
            })?;
    }

    let Json(req) = payload?;
    let outcome = state
        .services
        .admin()
        .seed(&req.email, &req.password, req.display_name)
        .await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_token_needs_exact_configured_secret() {
        assert!(seed_token_matches(Some("s3cret-seed"), "s3cret-seed"));
        assert!(!seed_token_matches(Some("s3cret-seed"), "s3cret-seeD"));
        assert!(!seed_token_matches(Some("s3cret-seed"), "s3cret"));
        assert!(!seed_token_matches(Some(""), ""));
        assert!(!seed_token_matches(None, "anything"));
    }
}
