//! Quoted-reference resolution
//!
//! A reply carries an inline copy of the message it quotes. The copy is
//! normalized with the same extraction as top-level messages, one level deep:
//! a quoted message's own quote is never expanded.

use std::sync::Arc;

use super::normalize::{detect_kind, extract, Extracted};
use super::parse::{normalize_jid, phone_number, split_args};
use super::{delete_key, delete_with_key, send_reply, Media, QuotedTarget, ReplyOptions, SentReply};
use crate::store::InMemoryStore;
use crate::transport::{ContentKind, ContextInfo, MessageKey, RawContent, RawMessage, Transport};

/// Message quoted by an inbound message
#[derive(Clone)]
pub struct QuotedMessage {
    /// Content kind of the quoted payload, if recognized
    pub kind: Option<ContentKind>,
    pub text: String,
    pub args: Vec<String>,
    pub media: Option<Media>,
    /// Author of the quoted message (normalized)
    pub sender: String,
    /// Chat the quote lives in
    pub from: String,
    /// Author's contact name from the store, empty when unknown
    pub name: String,
    pub phone: String,
    pub mentioned: Vec<String>,
    /// Id of the quoted message
    pub stanza_id: Option<String>,
    /// Quoted payload as delivered
    pub content: Arc<RawContent>,
    /// Envelope of the message that carried the quote
    pub raw: Arc<RawMessage>,
    participant: String,
    own_id: Option<String>,
    transport: Arc<dyn Transport>,
}

impl QuotedMessage {
    /// Reply to the quoted message (not to the message quoting it)
    ///
    /// Returns `None` (after logging) if the transport fails to send.
    pub async fn reply(&self, text: &str, opts: ReplyOptions) -> Option<SentReply> {
        let envelope = self.envelope();
        send_reply(
            &self.transport,
            &self.from,
            text,
            opts,
            &envelope,
            self.own_id.clone(),
        )
        .await
    }

    /// Delete the quoted message itself. Failures are logged.
    pub async fn delete(&self) {
        let key = delete_key(
            &self.raw.key,
            &self.from,
            &self.sender,
            self.own_id.as_deref(),
            Some(QuotedTarget {
                stanza_id: self.stanza_id.as_deref(),
                participant: Some(&self.participant),
            }),
        );
        delete_with_key(self.transport.as_ref(), &self.from, &key).await;
    }

    /// Envelope addressing the quoted item, for use as a reply target
    #[must_use]
    pub fn envelope(&self) -> RawMessage {
        RawMessage {
            key: MessageKey {
                remote_jid: Some(self.from.clone()),
                from_me: self.own_id.as_deref() == Some(self.sender.as_str()),
                id: self.stanza_id.clone(),
                participant: Some(self.participant.clone()),
            },
            message: Some(self.content.as_ref().clone()),
            push_name: None,
            message_timestamp: self.raw.message_timestamp,
        }
    }
}

impl PartialEq for QuotedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.text == other.text
            && self.args == other.args
            && self.media == other.media
            && self.sender == other.sender
            && self.from == other.from
            && self.name == other.name
            && self.phone == other.phone
            && self.mentioned == other.mentioned
            && self.stanza_id == other.stanza_id
            && self.content == other.content
            && self.raw == other.raw
            && self.participant == other.participant
            && self.own_id == other.own_id
    }
}

impl std::fmt::Debug for QuotedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotedMessage")
            .field("kind", &self.kind)
            .field("text", &self.text)
            .field("sender", &self.sender)
            .field("from", &self.from)
            .field("stanza_id", &self.stanza_id)
            .field("media", &self.media)
            .finish_non_exhaustive()
    }
}

/// Resolve the quote carried by a message's reply context
///
/// Returns `None` when the context is absent or lacks either the quoted
/// author or the quoted payload. The quote's origin is the chat of the
/// carrying message.
#[must_use]
pub fn resolve_quoted(
    context: Option<&ContextInfo>,
    envelope: &Arc<RawMessage>,
    transport: &Arc<dyn Transport>,
    store: &InMemoryStore,
    own_id: Option<&str>,
) -> Option<QuotedMessage> {
    let context = context?;
    let participant = context.participant.as_deref()?;
    let quoted = context.quoted_message.as_deref()?;

    let kind = detect_kind(quoted);
    let Extracted {
        text,
        media,
        context: quoted_context,
    } = extract(quoted, kind, transport);

    let sender = normalize_jid(participant);
    let from = envelope
        .key
        .remote_jid
        .as_deref()
        .map(normalize_jid)
        .unwrap_or_default();

    Some(QuotedMessage {
        kind,
        args: split_args(&text),
        text,
        media,
        phone: phone_number(&sender),
        name: store.contact_name(&sender).unwrap_or_default(),
        mentioned: quoted_context
            .map(|c| c.mentioned_jid.clone())
            .unwrap_or_default(),
        sender,
        from,
        stanza_id: context.stanza_id.clone(),
        content: Arc::new(quoted.clone()),
        raw: Arc::clone(envelope),
        participant: participant.to_string(),
        own_id: own_id.map(String::from),
        transport: Arc::clone(transport),
    })
}
