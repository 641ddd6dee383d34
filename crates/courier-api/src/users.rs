use axum::{Extension, Json, extract::State, response::IntoResponse};

use courier_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Conversation list for the requester (most recent activity first) plus
/// every registered user they have never talked to.
pub async fn directory(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.chat.clone();
    let directory = tokio::task::spawn_blocking(move || chat.directory(claims.sub))
        .await?
        .map_err(ApiError::from)?;

    Ok(Json(directory))
}
