use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_types::models::{Conversation, Message, User};

/// The single durable document: three ordered collections, each record
/// keyed by its id. Messages are append-only, so collection order is
/// insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

impl Document {
    pub fn user_by_id(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn user_by_id_mut(&mut self, id: Uuid) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    pub fn user_by_phone(&self, phone: &str) -> Option<&User> {
        self.users.iter().find(|u| u.phone == phone)
    }

    pub fn conversation_mut(&mut self, key: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == key)
    }
}
