use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use courier_types::events::ServerEvent;
use courier_types::models::{Message, UserProfile};

/// Connection registry and push fanout. Each user owns a "room": the set
/// of their live connections, keyed by connection id, so multiple
/// devices per user are first-class. Registration and unregistration are
/// the only mutation points.
///
/// Every push is fire-and-forget over an unbounded channel; a slow or
/// dead connection never blocks the caller, and an empty room is a
/// silent no-op (delivery is then guaranteed by the pull-based fetch).
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// user_id -> (conn_id -> outbound event channel)
    rooms: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a new connection under `user_id`. Returns the connection
    /// id and the receiving half the socket task drains.
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .rooms
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        debug!(%user_id, %conn_id, "connection registered");
        (conn_id, rx)
    }

    /// Remove one connection. Idempotent: unregistering a connection
    /// that is already gone is a no-op. Empty rooms are dropped.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(room) = rooms.get_mut(&user_id) {
            room.remove(&conn_id);
            if room.is_empty() {
                rooms.remove(&user_id);
            }
            debug!(%user_id, %conn_id, "connection unregistered");
        }
    }

    /// Push a `receive-message` event to every connection in the
    /// receiver's room. Returns how many connections were offered the
    /// event; zero means the receiver was offline.
    pub async fn deliver_message(&self, message: &Message, sender: &UserProfile) -> usize {
        let event = ServerEvent::ReceiveMessage {
            message: message.clone(),
            sender: sender.clone(),
        };
        self.push_to_room(message.receiver_id, event).await
    }

    /// Push a `user-typing` event to the receiver's room. Never persisted.
    pub async fn relay_typing(&self, sender_id: Uuid, receiver_id: Uuid, is_typing: bool) {
        self.push_to_room(
            receiver_id,
            ServerEvent::UserTyping {
                user_id: sender_id,
                is_typing,
            },
        )
        .await;
    }

    /// Targeted push to one specific connection — used for the
    /// `message-sent` ack and `message-error`, which go only to the
    /// originating connection.
    pub async fn send_to_connection(&self, user_id: Uuid, conn_id: Uuid, event: ServerEvent) {
        let rooms = self.inner.rooms.read().await;
        if let Some(tx) = rooms.get(&user_id).and_then(|room| room.get(&conn_id)) {
            let _ = tx.send(event);
        }
    }

    /// Users with at least one live connection.
    pub async fn online_user_ids(&self) -> Vec<Uuid> {
        self.inner.rooms.read().await.keys().copied().collect()
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .rooms
            .read()
            .await
            .get(&user_id)
            .map_or(0, |room| room.len())
    }

    async fn push_to_room(&self, user_id: Uuid, event: ServerEvent) -> usize {
        let rooms = self.inner.rooms.read().await;
        let Some(room) = rooms.get(&user_id) else {
            return 0;
        };
        let mut offered = 0;
        for tx in room.values() {
            // A closed channel means the socket task already died; the
            // unregister on its way will clean the entry up.
            let _ = tx.send(event.clone());
            offered += 1;
        }
        offered
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
