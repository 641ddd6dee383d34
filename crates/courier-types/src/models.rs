use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account. The password hash never leaves the store layer;
/// everything user-facing goes through [`UserProfile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub password_hash: String,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            phone: self.phone.clone(),
            avatar: self.avatar.clone(),
            last_seen: self.last_seen,
        }
    }
}

/// Public view of a user, safe to put on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub avatar: String,
    pub last_seen: DateTime<Utc>,
}

/// A single direct message. Immutable once persisted except for the
/// one-way `read: false -> true` transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

/// Per-pair aggregate derived from the message stream. Exactly one exists
/// per unordered participant pair, keyed by the symmetric pair key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: [Uuid; 2],
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
}

impl Conversation {
    /// The participant that isn't `user_id`, if `user_id` is a member.
    pub fn peer_of(&self, user_id: Uuid) -> Option<Uuid> {
        match self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }
}
