//! Transport seam
//!
//! The session library that owns the protocol connection is an external
//! collaborator. The dispatch core only needs an event stream to subscribe to
//! and a handful of outbound primitives, expressed by the [`Transport`] trait.

pub mod replay;
mod types;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub use replay::ReplayTransport;
pub use types::{
    Chat, Contact, ContentKind, ContextInfo, FileLength, MediaKind, MessageKey, OutgoingContent,
    OutgoingMedia, Payload, RawContent, RawMessage, TransportEvent, UpsertBatch, UpsertType,
};

use crate::Result;

/// Trait for the messaging transport collaborator
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the transport name
    fn name(&self) -> &'static str;

    /// Identifier of the logged-in account, once the session is open
    fn user_id(&self) -> Option<String>;

    /// Subscribe to the transport's event stream
    ///
    /// Every call returns an independent receiver.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Send a message, optionally quoting an earlier one
    ///
    /// Returns the envelope of the sent message.
    async fn send_message(
        &self,
        jid: &str,
        content: OutgoingContent,
        quoted: Option<&RawMessage>,
    ) -> Result<RawMessage>;

    /// Delete the message identified by `key`
    async fn delete_message(&self, jid: &str, key: &MessageKey) -> Result<()>;

    /// Replace the text of a message previously sent by this account
    async fn edit_message(&self, jid: &str, key: &MessageKey, text: &str) -> Result<()>;

    /// Fetch the bytes of the media carried by `content`
    async fn download_media(&self, content: &RawContent) -> Result<Vec<u8>>;
}
