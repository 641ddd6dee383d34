pub mod error;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use courier_store::Store;
use courier_types::api::{ConversationSummary, DirectoryResponse};
use courier_types::models::{Message, UserProfile};

pub use crate::error::ChatError;

/// Core chat services over the durable store: message ingress, read
/// receipts, presence, and the pull-based sync queries. All methods do
/// blocking store I/O; async callers wrap them in `spawn_blocking`.
///
/// Fanout is deliberately NOT invoked here. Transports push the returned
/// record to live connections after a successful call, so a delivery
/// failure can never corrupt or duplicate persisted state.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<Store>,
}

impl ChatService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Validate and persist an outbound message. One message append and
    /// one conversation upsert land atomically; the store assigns the
    /// timestamp under its write lock, and the canonical persisted
    /// record is returned for the caller to fan out.
    pub fn send(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: &str,
    ) -> Result<Message, ChatError> {
        if sender_id.is_nil() || receiver_id.is_nil() {
            return Err(ChatError::Validation("sender and receiver are required"));
        }
        if sender_id == receiver_id {
            return Err(ChatError::Validation("cannot message yourself"));
        }
        if text.trim().is_empty() {
            return Err(ChatError::Validation("message text is required"));
        }
        if self.store.find_user_by_id(receiver_id)?.is_none() {
            return Err(ChatError::NotFound(receiver_id));
        }

        let draft = Message {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            text: text.to_string(),
            // Placeholder; the store re-stamps under its write lock.
            timestamp: Utc::now(),
            read: false,
        };
        let message = self.store.append_message(&draft)?;

        debug!(message_id = %message.id, %sender_id, %receiver_id, "message persisted");
        Ok(message)
    }

    /// Ordered thread fetch, then mark the requester's inbound messages
    /// read. Viewing a thread implies acknowledging it; the returned
    /// snapshot is the pre-receipt view.
    pub fn fetch_thread(
        &self,
        requester_id: Uuid,
        peer_id: Uuid,
    ) -> Result<Vec<Message>, ChatError> {
        let messages = self.store.messages_between(requester_id, peer_id)?;
        let flipped = self.store.mark_read(requester_id, peer_id)?;
        if flipped > 0 {
            debug!(%requester_id, %peer_id, flipped, "read receipts applied");
        }
        Ok(messages)
    }

    /// Conversations with peer profile and last-message summary, most
    /// recent first, plus every known user the requester has never
    /// talked to.
    pub fn directory(&self, user_id: Uuid) -> Result<DirectoryResponse, ChatError> {
        let conversations = self.store.conversations_for(user_id)?;

        let mut summaries = Vec::with_capacity(conversations.len());
        let mut known_peers = Vec::new();
        for conversation in &conversations {
            let Some(peer_id) = conversation.peer_of(user_id) else {
                continue;
            };
            known_peers.push(peer_id);
            // A conversation whose peer no longer resolves is dropped
            // from the response rather than failing the whole call.
            let Some(peer) = self.store.find_user_by_id(peer_id)? else {
                warn!(conversation = %conversation.id, %peer_id, "conversation peer missing");
                continue;
            };
            summaries.push(ConversationSummary {
                id: conversation.id.clone(),
                user: peer.profile(),
                last_message: conversation.last_message.clone(),
                last_message_time: conversation.last_message_time,
            });
        }

        let other_users = self
            .store
            .list_users()?
            .iter()
            .filter(|u| u.id != user_id && !known_peers.contains(&u.id))
            .map(|u| u.profile())
            .collect();

        Ok(DirectoryResponse {
            conversations: summaries,
            other_users,
        })
    }

    /// Presence touch: update `last_seen` on login, connect, and
    /// disconnect. Unknown ids are logged and ignored so late-arriving
    /// cleanup can never fail a disconnect.
    pub fn touch(&self, user_id: Uuid) {
        match self.store.touch_last_seen(user_id) {
            Ok(true) => {}
            Ok(false) => warn!(%user_id, "presence touch for unknown user"),
            Err(e) => warn!(%user_id, error = %e, "presence touch failed"),
        }
    }

    pub fn profile(&self, user_id: Uuid) -> Result<UserProfile, ChatError> {
        self.store
            .find_user_by_id(user_id)?
            .map(|u| u.profile())
            .ok_or(ChatError::NotFound(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_types::models::User;

    struct Fixture {
        _dir: tempfile::TempDir,
        chat: ChatService,
        alice: Uuid,
        bob: Uuid,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("courier.json")).unwrap());
        let chat = ChatService::new(store.clone());

        let alice = add_user(&store, "alice", "+15550001");
        let bob = add_user(&store, "bob", "+15550002");

        Fixture {
            _dir: dir,
            chat,
            alice,
            bob,
        }
    }

    fn add_user(store: &Store, name: &str, phone: &str) -> Uuid {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            phone: phone.to_string(),
            password_hash: "hash".to_string(),
            avatar: "/avatars/01.jpg".to_string(),
            created_at: now,
            last_seen: now,
        };
        let id = user.id;
        store.create_user(user).unwrap();
        id
    }

    #[test]
    fn send_persists_message_and_aggregate() {
        let f = fixture();
        let message = f.chat.send(f.alice, f.bob, "hi").unwrap();
        assert!(!message.read);

        let thread = f.chat.store().messages_between(f.alice, f.bob).unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].id, message.id);

        let conv = f
            .chat
            .store()
            .conversation_for_pair(f.bob, f.alice)
            .unwrap()
            .unwrap();
        assert_eq!(conv.last_message, "hi");
        assert_eq!(conv.last_message_time, message.timestamp);
    }

    #[test]
    fn rapid_sends_stay_chronological() {
        let f = fixture();
        for i in 0..20 {
            f.chat.send(f.alice, f.bob, &format!("m{i}")).unwrap();
        }

        let thread = f.chat.store().messages_between(f.alice, f.bob).unwrap();
        assert_eq!(thread.len(), 20);
        assert!(thread.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

        let conv = f
            .chat
            .store()
            .conversation_for_pair(f.alice, f.bob)
            .unwrap()
            .unwrap();
        assert_eq!(conv.last_message, "m19");
        assert_eq!(conv.last_message_time, thread.last().unwrap().timestamp);
    }

    #[test]
    fn empty_text_rejected_with_no_side_effects() {
        let f = fixture();
        for text in ["", "   ", "\n\t"] {
            match f.chat.send(f.alice, f.bob, text) {
                Err(ChatError::Validation(_)) => {}
                other => panic!("expected validation error, got {:?}", other),
            }
        }
        assert!(f.chat.store().messages_between(f.alice, f.bob).unwrap().is_empty());
        assert!(f
            .chat
            .store()
            .conversation_for_pair(f.alice, f.bob)
            .unwrap()
            .is_none());
    }

    #[test]
    fn self_send_and_unknown_receiver_rejected() {
        let f = fixture();
        assert!(matches!(
            f.chat.send(f.alice, f.alice, "hi me"),
            Err(ChatError::Validation(_))
        ));
        let ghost = Uuid::new_v4();
        assert!(matches!(
            f.chat.send(f.alice, ghost, "anyone there?"),
            Err(ChatError::NotFound(id)) if id == ghost
        ));
    }

    #[test]
    fn fetch_marks_read_and_is_idempotent() {
        let f = fixture();
        f.chat.send(f.alice, f.bob, "hi").unwrap();

        // First fetch returns the pre-receipt snapshot.
        let first = f.chat.fetch_thread(f.bob, f.alice).unwrap();
        assert_eq!(first.len(), 1);
        assert!(!first[0].read);

        // After the fetch the persisted flag is flipped; a second fetch
        // sees it read and changes nothing.
        let second = f.chat.fetch_thread(f.bob, f.alice).unwrap();
        assert!(second[0].read);
        let third = f.chat.fetch_thread(f.bob, f.alice).unwrap();
        assert!(third[0].read);
    }

    #[test]
    fn later_send_keeps_earlier_receipt() {
        let f = fixture();
        f.chat.send(f.alice, f.bob, "hi").unwrap();
        f.chat.fetch_thread(f.bob, f.alice).unwrap();
        f.chat.send(f.alice, f.bob, "bye").unwrap();

        let thread = f.chat.fetch_thread(f.bob, f.alice).unwrap();
        assert_eq!(thread.len(), 2);
        assert!(thread[0].read);
        assert!(!thread[1].read);

        let conv = f
            .chat
            .store()
            .conversation_for_pair(f.alice, f.bob)
            .unwrap()
            .unwrap();
        assert_eq!(conv.last_message, "bye");
    }

    #[test]
    fn offline_receiver_still_sees_message_on_fetch() {
        // No connections exist anywhere in this test: persistence alone
        // must carry the message to the receiver's next fetch.
        let f = fixture();
        f.chat.send(f.alice, f.bob, "missed you").unwrap();
        let thread = f.chat.fetch_thread(f.bob, f.alice).unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].text, "missed you");
    }

    #[test]
    fn directory_splits_conversations_and_candidates() {
        let f = fixture();
        let carol = add_user(f.chat.store(), "carol", "+15550003");

        f.chat.send(f.alice, f.bob, "hi bob").unwrap();

        let directory = f.chat.directory(f.alice).unwrap();
        assert_eq!(directory.conversations.len(), 1);
        assert_eq!(directory.conversations[0].user.id, f.bob);
        assert_eq!(directory.conversations[0].last_message, "hi bob");
        assert_eq!(directory.other_users.len(), 1);
        assert_eq!(directory.other_users[0].id, carol);

        // From carol's side there are no conversations, two candidates.
        let directory = f.chat.directory(carol).unwrap();
        assert!(directory.conversations.is_empty());
        assert_eq!(directory.other_users.len(), 2);
    }

    #[test]
    fn profile_resolves_or_not_found() {
        let f = fixture();
        assert_eq!(f.chat.profile(f.alice).unwrap().name, "alice");
        assert!(matches!(
            f.chat.profile(Uuid::new_v4()),
            Err(ChatError::NotFound(_))
        ));
    }
}
