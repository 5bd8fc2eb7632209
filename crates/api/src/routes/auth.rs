use axum::{Json, extract::State, extract::rejection::JsonRejection, http::StatusCode};
use learn_core::model::User;
use serde::Deserialize;
use services::Session;

use crate::auth::{AuthUser, BearerToken};
use crate::error::ApiResult;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<ApiState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<Session>> {
    let Json(req) = payload?;
    let session = state.services.auth().login(&req.email, &req.password).await?;
    Ok(Json(session))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<ApiState>,
    BearerToken(token): BearerToken,
) -> ApiResult<StatusCode> {
    state.services.auth().logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/me
pub async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}
