use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use courier_types::api::{Claims, SendMessageRequest, ThreadResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// Fetch the full thread with a peer, ascending by timestamp. Viewing the
/// thread marks the requester's inbound messages read as a side effect.
pub async fn fetch_thread(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.chat.clone();
    let messages = tokio::task::spawn_blocking(move || chat.fetch_thread(claims.sub, peer_id))
        .await?
        .map_err(ApiError::from)?;

    Ok(Json(ThreadResponse { messages }))
}

/// Persist an outbound message, then best-effort push to the receiver's
/// live connections. The HTTP response is the sender's ack; a receiver
/// with no connections simply picks the message up on their next fetch.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.chat.clone();
    let (message, sender) = tokio::task::spawn_blocking(move || {
        let message = chat.send(claims.sub, req.receiver_id, &req.text)?;
        let sender = chat.profile(claims.sub)?;
        Ok::<_, courier_chat::ChatError>((message, sender))
    })
    .await?
    .map_err(ApiError::from)?;

    let offered = state.dispatcher.deliver_message(&message, &sender).await;
    debug!(message_id = %message.id, offered, "message fanned out");

    Ok((StatusCode::CREATED, Json(message)))
}
