pub mod conversations;
pub mod document;
pub mod error;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::info;
use uuid::Uuid;

use courier_types::models::{Conversation, Message, User};

use crate::conversations::pair_key;
use crate::document::Document;
pub use crate::error::StoreError;

/// Durable keeper of the three record collections. All mutations go
/// through a single mutex, so concurrent writers serialize and readers
/// always see a fully applied document.
///
/// Write-through discipline: a mutation is applied to a draft copy,
/// flushed to a temp file, fsynced, and renamed over the durable file
/// before the in-memory document adopts it. A failed flush leaves both
/// memory and disk at the prior durable state.
pub struct Store {
    path: PathBuf,
    inner: Mutex<Document>,
}

impl Store {
    /// Open (or initialize) the store at `path`. Creates the document on
    /// first open so permission problems surface here, not mid-request.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let document = if path.exists() {
            let bytes = fs::read(path)?;
            serde_json::from_slice(&bytes)?
        } else {
            Document::default()
        };

        let store = Self {
            path: path.to_path_buf(),
            inner: Mutex::new(document),
        };

        if !store.path.exists() {
            let guard = store.lock()?;
            store.flush(&guard)?;
        }

        info!("store opened at {}", path.display());
        Ok(store)
    }

    // -- Users --

    /// Insert a new user. The unique-phone check and the insert happen
    /// under one lock acquisition, so two racing registrations with the
    /// same phone cannot both succeed.
    pub fn create_user(&self, user: User) -> Result<(), StoreError> {
        self.mutate(|doc| {
            if doc.user_by_phone(&user.phone).is_some() {
                return Err(StoreError::PhoneTaken);
            }
            doc.users.push(user);
            Ok(())
        })
    }

    pub fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError> {
        let doc = self.lock()?;
        Ok(doc.user_by_phone(phone).cloned())
    }

    pub fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let doc = self.lock()?;
        Ok(doc.user_by_id(id).cloned())
    }

    pub fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let doc = self.lock()?;
        Ok(doc.users.clone())
    }

    /// Set `last_seen = now`. Returns false (without flushing) when the
    /// user does not exist, so late disconnect cleanup stays harmless.
    pub fn touch_last_seen(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let mut doc = self.lock()?;
        if doc.user_by_id(user_id).is_none() {
            return Ok(false);
        }

        let mut draft = doc.clone();
        if let Some(user) = draft.user_by_id_mut(user_id) {
            user.last_seen = chrono::Utc::now();
        }
        self.flush(&draft)?;
        *doc = draft;
        Ok(true)
    }

    // -- Messages --

    /// Append a message and fold it into the conversation aggregate in
    /// the same atomic flush. Doing both under one lock acquisition keeps
    /// the aggregate's last-message invariant intact under concurrent
    /// senders.
    ///
    /// The timestamp is assigned here, under the write lock, and is kept
    /// strictly increasing across appends. Stamping outside the lock
    /// would let two racing sends persist in the opposite order of their
    /// timestamps and leave the aggregate pointing at a stale message.
    /// Returns the canonical stamped record.
    pub fn append_message(&self, message: &Message) -> Result<Message, StoreError> {
        self.mutate(|doc| {
            let mut message = message.clone();
            message.timestamp = chrono::Utc::now();
            if let Some(last) = doc.messages.last() {
                if message.timestamp <= last.timestamp {
                    message.timestamp = last.timestamp + chrono::Duration::microseconds(1);
                }
            }
            doc.messages.push(message.clone());
            conversations::upsert(doc, &message);
            Ok(message)
        })
    }

    /// All messages between the two users, ascending by timestamp.
    /// The sort is stable, so equal timestamps keep insertion order.
    pub fn messages_between(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>, StoreError> {
        let doc = self.lock()?;
        let mut messages: Vec<Message> = doc
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b)
                    || (m.sender_id == b && m.receiver_id == a)
            })
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    /// Flip every unread message from `peer_id` to `reader_id` to read.
    /// Returns the number of flipped records; zero skips the flush
    /// entirely, which makes repeated calls true no-ops.
    pub fn mark_read(&self, reader_id: Uuid, peer_id: Uuid) -> Result<usize, StoreError> {
        let mut doc = self.lock()?;

        let unread = doc
            .messages
            .iter()
            .filter(|m| m.sender_id == peer_id && m.receiver_id == reader_id && !m.read)
            .count();
        if unread == 0 {
            return Ok(0);
        }

        let mut draft = doc.clone();
        for message in draft
            .messages
            .iter_mut()
            .filter(|m| m.sender_id == peer_id && m.receiver_id == reader_id && !m.read)
        {
            message.read = true;
        }
        self.flush(&draft)?;
        *doc = draft;
        Ok(unread)
    }

    // -- Conversations --

    pub fn conversation_for_pair(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        let key = pair_key(a, b);
        let doc = self.lock()?;
        Ok(doc.conversations.iter().find(|c| c.id == key).cloned())
    }

    /// Conversations involving the user, most recent activity first.
    pub fn conversations_for(&self, user_id: Uuid) -> Result<Vec<Conversation>, StoreError> {
        let doc = self.lock()?;
        let mut conversations: Vec<Conversation> = doc
            .conversations
            .iter()
            .filter(|c| c.involves(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        Ok(conversations)
    }

    // -- Internals --

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Document>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut Document) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut doc = self.lock()?;
        let mut draft = doc.clone();
        let out = apply(&mut draft)?;
        self.flush(&draft)?;
        *doc = draft;
        Ok(out)
    }

    /// Write the document to a temp file, fsync, then atomically replace
    /// the durable file. Readers of the path never see a torn document.
    /// The parent directory is fsynced afterwards so the rename itself
    /// survives a crash.
    fn flush(&self, doc: &Document) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(doc)?;

        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::File::open(parent)?.sync_all()?;
        }
        Ok(())
    }
}
