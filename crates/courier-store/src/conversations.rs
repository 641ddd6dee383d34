//! Conversation index: a pure derivation over message writes. Each
//! unordered participant pair owns exactly one conversation record,
//! addressed by a symmetric pair key.

use uuid::Uuid;

use courier_types::models::{Conversation, Message};

use crate::document::Document;

/// Deterministic key for an unordered pair: the two ids sorted and
/// joined, so `pair_key(a, b) == pair_key(b, a)`.
pub fn pair_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

/// Fold a freshly persisted message into the aggregate: create the
/// conversation on first contact, otherwise overwrite the last-message
/// summary. Last write wins; the store stamps timestamps under the same
/// write lock that applies this, so the message applied last is always
/// the newest.
pub(crate) fn upsert(doc: &mut Document, message: &Message) {
    let key = pair_key(message.sender_id, message.receiver_id);

    if let Some(conversation) = doc.conversation_mut(&key) {
        conversation.last_message = message.text.clone();
        conversation.last_message_time = message.timestamp;
    } else {
        doc.conversations.push(Conversation {
            id: key,
            participants: [message.sender_id, message.receiver_id],
            last_message: message.text.clone(),
            last_message_time: message.timestamp,
        });
    }
}
