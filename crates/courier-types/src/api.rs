use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, UserProfile};

// -- JWT Claims --

/// JWT claims shared by courier-api (REST middleware) and courier-gateway
/// (WebSocket identify handshake). Canonical definition lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub phone: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserProfile,
    pub token: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub messages: Vec<Message>,
}

// -- Directory --

/// One entry in the conversation list: the peer's profile plus the
/// last-message summary from the conversation aggregate.
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub user: UserProfile,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
}

/// Conversations ordered by most recent activity, plus users the
/// requester has never talked to (discovery candidates).
#[derive(Debug, Serialize)]
pub struct DirectoryResponse {
    pub conversations: Vec<ConversationSummary>,
    pub other_users: Vec<UserProfile>,
}
