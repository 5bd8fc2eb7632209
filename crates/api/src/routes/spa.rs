//! Single-page app shell and the JSON 404.

use axum::{
    extract::State,
    http::Uri,
    response::{Html, IntoResponse, Response},
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::ApiState;

const FALLBACK_INDEX: &str = include_str!("../../static/index.html");

/// GET / and GET /admin/dashboard
///
/// Both serve the SPA shell; routing between the student view and the
/// dashboard happens client-side.
pub async fn index(State(state): State<ApiState>) -> Response {
    let Some(dir) = state.config.static_dir.as_ref() else {
        return Html(FALLBACK_INDEX).into_response();
    };
    let path = dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "index.html unreadable, serving fallback");
            Html(FALLBACK_INDEX).into_response()
        }
    }
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}
