//! In-memory store of contacts, chat metadata and message history
//!
//! Loaded once from a JSON file at startup, merged continuously from the
//! transport's event stream, and written back wholesale by the persistence
//! job. Disk writes go through [`crate::exclusive::ExclusiveQueue`]; the
//! in-memory maps are only guarded against torn reads.

mod sync;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::message::parse::normalize_jid;
use crate::transport::{Chat, Contact, RawMessage, Transport, TransportEvent, UpsertBatch};
use crate::{Error, Result};

pub use sync::StoreSync;

/// Messages kept per chat; older ones are dropped first
const MAX_MESSAGES_PER_CHAT: usize = 500;

/// Serialized form of the store file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub contacts: HashMap<String, Contact>,
    #[serde(default)]
    pub chats: HashMap<String, Chat>,
    /// Message history keyed by chat id, oldest first
    #[serde(default)]
    pub messages: HashMap<String, Vec<RawMessage>>,
}

/// Shared handle to the in-memory store
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreSnapshot>>,
}

impl InMemoryStore {
    /// Create a store from an existing snapshot
    #[must_use]
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Arc::new(RwLock::new(snapshot)),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreSnapshot> {
        self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreSnapshot> {
        self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Copy of the current contents
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.read().clone()
    }

    /// Replace the store contents with the file at `path`
    ///
    /// Returns `Ok(false)` and leaves the store untouched when the file does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a valid snapshot
    pub async fn read_from_file(&self, path: &Path) -> Result<bool> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let snapshot: StoreSnapshot = serde_json::from_str(&content)
            .map_err(|e| Error::Store(format!("{}: {e}", path.display())))?;

        tracing::info!(
            path = %path.display(),
            contacts = snapshot.contacts.len(),
            chats = snapshot.chats.len(),
            "loaded store"
        );
        *self.write() = snapshot;
        Ok(true)
    }

    /// Overwrite the file at `path` with the current contents
    ///
    /// Writes to a sibling temp file first and renames it into place.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or any filesystem step fails
    pub async fn write_to_file(&self, path: &Path) -> Result<()> {
        let json = {
            let state = self.read();
            serde_json::to_vec(&*state)?
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, path).await?;

        tracing::debug!(path = %path.display(), bytes = json.len(), "flushed store");
        Ok(())
    }

    /// Merge one transport event
    pub fn apply(&self, event: &TransportEvent) {
        match event {
            TransportEvent::MessagesUpsert(batch) => self.upsert_messages(batch),
            TransportEvent::ContactsUpsert(contacts) => self.upsert_contacts(contacts.clone()),
            TransportEvent::ChatsUpsert(chats) => self.upsert_chats(chats.clone()),
        }
    }

    /// Subscribe to the transport and merge its events until the stream closes
    pub fn bind(&self, transport: &dyn Transport) -> JoinHandle<()> {
        let mut rx = transport.subscribe();
        let store = self.clone();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => store.apply(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "store lagged behind transport events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Append messages to their chat history, replacing any with the same id
    pub fn upsert_messages(&self, batch: &UpsertBatch) {
        let mut state = self.write();
        for message in &batch.messages {
            let (Some(jid), Some(id)) = (message.key.remote_jid.as_deref(), message.key.id.as_deref())
            else {
                continue;
            };

            let history = state.messages.entry(normalize_jid(jid)).or_default();
            if let Some(existing) = history
                .iter_mut()
                .find(|m| m.key.id.as_deref() == Some(id))
            {
                *existing = message.clone();
            } else {
                history.push(message.clone());
                if history.len() > MAX_MESSAGES_PER_CHAT {
                    let excess = history.len() - MAX_MESSAGES_PER_CHAT;
                    history.drain(..excess);
                }
            }
        }
    }

    /// Insert or merge contacts; present fields overwrite stored ones
    pub fn upsert_contacts(&self, contacts: Vec<Contact>) {
        let mut state = self.write();
        for contact in contacts {
            let id = normalize_jid(&contact.id);
            let entry = state.contacts.entry(id.clone()).or_insert_with(|| Contact {
                id,
                ..Contact::default()
            });
            if contact.name.is_some() {
                entry.name = contact.name;
            }
            if contact.notify.is_some() {
                entry.notify = contact.notify;
            }
        }
    }

    /// Insert or merge chats; present fields overwrite stored ones
    pub fn upsert_chats(&self, chats: Vec<Chat>) {
        let mut state = self.write();
        for chat in chats {
            let id = normalize_jid(&chat.id);
            let entry = state.chats.entry(id.clone()).or_insert_with(|| Chat {
                id,
                ..Chat::default()
            });
            if chat.name.is_some() {
                entry.name = chat.name;
            }
            if chat.conversation_timestamp.is_some() {
                entry.conversation_timestamp = chat.conversation_timestamp;
            }
            if chat.unread_count.is_some() {
                entry.unread_count = chat.unread_count;
            }
        }
    }

    /// Display name of a contact: address-book name, then self-chosen name
    #[must_use]
    pub fn contact_name(&self, id: &str) -> Option<String> {
        let state = self.read();
        let contact = state.contacts.get(&normalize_jid(id))?;
        contact.name.clone().or_else(|| contact.notify.clone())
    }

    /// Look up a stored message by chat and message id
    #[must_use]
    pub fn load_message(&self, jid: &str, id: &str) -> Option<RawMessage> {
        let state = self.read();
        state
            .messages
            .get(&normalize_jid(jid))?
            .iter()
            .find(|m| m.key.id.as_deref() == Some(id))
            .cloned()
    }
}
