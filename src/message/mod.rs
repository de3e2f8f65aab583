//! Canonical message context
//!
//! Every inbound chat message is normalized into a [`MessageContext`] before
//! it reaches the middleware chain. The context owns its media reference, an
//! optional one-level [`QuotedMessage`], and reply/delete capabilities bound
//! to the message's own sender and origin.

pub mod normalize;
pub mod parse;
pub mod quoted;

use std::sync::Arc;

pub use normalize::{normalize, prepare, Innermost, Prepared};
pub use quoted::{resolve_quoted, QuotedMessage};

use crate::store::InMemoryStore;
use crate::transport::{
    ContentKind, MediaKind, MessageKey, OutgoingContent, OutgoingMedia, RawContent, RawMessage,
    Transport,
};
use crate::Result;

/// Media attached to an inbound message
#[derive(Clone)]
pub struct Media {
    /// MIME type as reported by the sender
    pub mime_type: String,
    /// Size in bytes, if known
    pub size: Option<u64>,
    source: Arc<RawContent>,
    transport: Arc<dyn Transport>,
}

impl Media {
    pub(crate) fn new(
        mime_type: String,
        size: Option<u64>,
        source: Arc<RawContent>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            mime_type,
            size,
            source,
            transport,
        }
    }

    /// Top-level media class
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        MediaKind::from_mime(&self.mime_type)
    }

    /// Download the media bytes through the transport
    ///
    /// Media can be large; check [`Media::size`] first.
    ///
    /// # Errors
    ///
    /// Returns error if the transport fails to fetch the content
    pub async fn download(&self) -> Result<Vec<u8>> {
        self.transport.download_media(&self.source).await
    }
}

impl PartialEq for Media {
    fn eq(&self, other: &Self) -> bool {
        self.mime_type == other.mime_type && self.size == other.size && self.source == other.source
    }
}

impl std::fmt::Debug for Media {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Media")
            .field("mime_type", &self.mime_type)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Options for [`MessageContext::reply`]
#[derive(Debug, Clone, Default)]
pub struct ReplyOptions {
    /// Identifiers to mention in the reply
    pub mentions: Vec<String>,
    /// Media to send, with the reply text as caption
    pub media: Option<OutgoingMedia>,
}

/// Handle on a reply that was sent successfully
#[derive(Clone)]
pub struct SentReply {
    jid: String,
    key: MessageKey,
    own_id: Option<String>,
    transport: Arc<dyn Transport>,
}

impl SentReply {
    /// Key of the sent message
    #[must_use]
    pub const fn key(&self) -> &MessageKey {
        &self.key
    }

    /// Replace the sent message's text. Failures are logged.
    pub async fn edit(&self, text: &str) {
        if let Err(e) = self.transport.edit_message(&self.jid, &self.key, text).await {
            tracing::error!(chat = %self.jid, id = ?self.key.id, error = %e, "edit failed");
        }
    }

    /// Delete the sent message. Failures are logged.
    pub async fn delete(&self) {
        let sender = self.own_id.clone().unwrap_or_default();
        let key = delete_key(&self.key, &self.jid, &sender, self.own_id.as_deref(), None);
        delete_with_key(self.transport.as_ref(), &self.jid, &key).await;
    }
}

impl std::fmt::Debug for SentReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentReply")
            .field("jid", &self.jid)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Normalized, transport-agnostic view of an inbound message
#[derive(Clone)]
pub struct MessageContext {
    /// Content kind of the top-level payload
    pub kind: ContentKind,
    /// Message text or caption
    pub text: String,
    /// `text` split on single spaces (never empty)
    pub args: Vec<String>,
    /// Attached media, if any
    pub media: Option<Media>,
    /// Author of the message (normalized)
    pub sender: String,
    /// Chat the message came from: group id or the sender's id (normalized)
    pub from: String,
    /// Sender display name
    pub name: String,
    /// Sender phone number in `+<digits>` form
    pub phone: String,
    /// Whether the message came from a group chat
    pub is_group: bool,
    /// Identifiers mentioned in the message
    pub mentioned: Vec<String>,
    /// Message this one replies to
    pub quoted: Option<QuotedMessage>,
    /// Original envelope
    pub raw: Arc<RawMessage>,
    pub(crate) own_id: Option<String>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) store: InMemoryStore,
}

impl MessageContext {
    /// Replace the text, recomputing `args`
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.args = parse::split_args(&self.text);
    }

    /// Transport this message arrived on
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Shared in-memory store
    #[must_use]
    pub const fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// Reply in this message's chat, quoting it
    ///
    /// Returns `None` (after logging) if the transport fails to send.
    pub async fn reply(&self, text: &str, opts: ReplyOptions) -> Option<SentReply> {
        send_reply(
            &self.transport,
            &self.from,
            text,
            opts,
            &self.raw,
            self.own_id.clone(),
        )
        .await
    }

    /// Reply with plain text
    pub async fn reply_text(&self, text: &str) -> Option<SentReply> {
        self.reply(text, ReplyOptions::default()).await
    }

    /// Delete this message
    ///
    /// In a group this deletes the message for everyone and requires admin
    /// rights unless the bot sent it. Failures are logged.
    pub async fn delete(&self) {
        let key = delete_key(
            &self.raw.key,
            &self.from,
            &self.sender,
            self.own_id.as_deref(),
            None,
        );
        delete_with_key(self.transport.as_ref(), &self.from, &key).await;
    }
}

impl std::fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContext")
            .field("kind", &self.kind)
            .field("text", &self.text)
            .field("sender", &self.sender)
            .field("from", &self.from)
            .field("is_group", &self.is_group)
            .field("media", &self.media)
            .field("quoted", &self.quoted)
            .finish_non_exhaustive()
    }
}

/// Quoted-item coordinates used to target a delete at an earlier message
#[derive(Debug, Clone, Copy)]
pub(crate) struct QuotedTarget<'a> {
    pub stanza_id: Option<&'a str>,
    pub participant: Option<&'a str>,
}

/// Build the key that deletes a message
///
/// Starts from `base`, points it at `from`, and marks it as ours when the
/// sender is the logged-in account. For a quoted target the id comes from
/// the stanza id, and in groups the participant from the quote context.
pub(crate) fn delete_key(
    base: &MessageKey,
    from: &str,
    sender: &str,
    own_id: Option<&str>,
    target: Option<QuotedTarget<'_>>,
) -> MessageKey {
    let mut key = base.clone();
    key.remote_jid = Some(from.to_string());
    key.from_me = own_id.is_some_and(|own| own == sender);

    if let Some(target) = target {
        key.id = target.stanza_id.map(String::from);
        if parse::is_group_jid(from) {
            key.participant = target.participant.map(String::from);
        }
    }

    key
}

pub(crate) async fn delete_with_key(transport: &dyn Transport, jid: &str, key: &MessageKey) {
    if let Err(e) = transport.delete_message(jid, key).await {
        tracing::error!(chat = jid, id = ?key.id, error = %e, "delete failed");
    }
}

pub(crate) async fn send_reply(
    transport: &Arc<dyn Transport>,
    jid: &str,
    text: &str,
    opts: ReplyOptions,
    quoted: &RawMessage,
    own_id: Option<String>,
) -> Option<SentReply> {
    let content = OutgoingContent {
        text: text.to_string(),
        mentions: opts.mentions,
        media: opts.media,
    };

    match transport.send_message(jid, content, Some(quoted)).await {
        Ok(sent) => Some(SentReply {
            jid: sent
                .key
                .remote_jid
                .clone()
                .unwrap_or_else(|| jid.to_string()),
            key: sent.key,
            own_id,
            transport: Arc::clone(transport),
        }),
        Err(e) => {
            tracing::error!(chat = jid, quoted = ?quoted.key.id, error = %e, "reply failed");
            None
        }
    }
}
