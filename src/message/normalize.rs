//! Event normalization
//!
//! Turns a raw upsert batch into a [`MessageContext`]. Only live
//! notifications are considered and only the first message of a batch is
//! inspected; everything else is protocol noise (receipts, history sync) and
//! is dropped without error.

use std::sync::Arc;

use super::parse::{self, calculate_size, normalize_jid, safe_string, split_args};
use super::{resolve_quoted, Media, MessageContext};
use crate::store::InMemoryStore;
use crate::transport::{ContentKind, ContextInfo, Payload, RawContent, RawMessage, Transport, UpsertBatch, UpsertType};

/// First live message of a batch and its detected content kind
#[derive(Debug, Clone, Copy)]
pub struct Prepared<'a> {
    pub kind: ContentKind,
    pub content: &'a RawContent,
    pub envelope: &'a RawMessage,
}

/// Select the message to normalize from a batch
///
/// Returns `None` unless the batch is a live notification whose first
/// message carries a payload of a known content kind.
#[must_use]
pub fn prepare(batch: &UpsertBatch) -> Option<Prepared<'_>> {
    if batch.kind != UpsertType::Notify {
        return None;
    }

    let envelope = batch.messages.first()?;
    let content = envelope.message.as_ref()?;
    let kind = detect_kind(content)?;

    Some(Prepared {
        kind,
        content,
        envelope,
    })
}

/// First populated content kind, checking plain conversation text first
///
/// An empty conversation string does not count as populated.
#[must_use]
pub fn detect_kind(content: &RawContent) -> Option<ContentKind> {
    if content.conversation.as_deref().is_some_and(|t| !t.is_empty()) {
        return Some(ContentKind::Conversation);
    }

    ContentKind::PAYLOAD_KINDS
        .into_iter()
        .find(|kind| content.has(*kind))
}

/// Innermost payload after descending through wrapper kinds
#[derive(Debug, Clone, Copy)]
pub enum Innermost<'a> {
    /// No payload kind matched; the content itself (plain conversation)
    Content(&'a RawContent),
    /// A leaf payload
    Payload(&'a Payload),
}

impl<'a> Innermost<'a> {
    /// Descend through view-once, ephemeral and similar wrappers
    #[must_use]
    pub fn find(content: &'a RawContent) -> Self {
        for kind in ContentKind::PAYLOAD_KINDS {
            if let Some(payload) = content.payload(kind) {
                return match payload.message.as_deref() {
                    Some(inner) => Self::find(inner),
                    None => Self::Payload(payload),
                };
            }
        }
        Self::Content(content)
    }

    /// Text by fallback: conversation, caption, text, then empty
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Content(content) => content.conversation.clone().unwrap_or_default(),
            Self::Payload(payload) => payload
                .caption
                .clone()
                .or_else(|| payload.text.clone())
                .unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn mime_type(&self) -> Option<&'a str> {
        match self {
            Self::Content(_) => None,
            Self::Payload(payload) => payload.mimetype.as_deref(),
        }
    }

    #[must_use]
    pub fn context_info(&self) -> Option<&'a ContextInfo> {
        match self {
            Self::Content(_) => None,
            Self::Payload(payload) => payload.context_info.as_ref(),
        }
    }

    fn media(&self, source: &RawContent, transport: &Arc<dyn Transport>) -> Option<Media> {
        let Self::Payload(payload) = self else {
            return None;
        };
        let mime_type = payload.mimetype.clone()?;
        Some(Media::new(
            mime_type,
            calculate_size(payload.file_length.as_ref()),
            Arc::new(source.clone()),
            Arc::clone(transport),
        ))
    }
}

/// Fields shared by top-level and quoted normalization
pub(crate) struct Extracted<'a> {
    pub text: String,
    pub media: Option<Media>,
    pub context: Option<&'a ContextInfo>,
}

/// Extract text, media and reply context from one content record
///
/// The reply context is read from the `kind` payload and falls back to the
/// innermost payload when the kind is a wrapper.
pub(crate) fn extract<'a>(
    content: &'a RawContent,
    kind: Option<ContentKind>,
    transport: &Arc<dyn Transport>,
) -> Extracted<'a> {
    let inner = Innermost::find(content);
    let context = kind
        .and_then(|k| content.payload(k))
        .and_then(|p| p.context_info.as_ref())
        .or_else(|| inner.context_info());

    Extracted {
        text: inner.text(),
        media: inner.media(content, transport),
        context,
    }
}

/// Normalize an upsert batch into a message context
///
/// Returns `None` for batches [`prepare`] rejects.
#[must_use]
pub fn normalize(
    batch: &UpsertBatch,
    transport: &Arc<dyn Transport>,
    store: &InMemoryStore,
) -> Option<MessageContext> {
    prepare(batch).map(|prepared| build_context(prepared, transport, store))
}

fn build_context(
    prepared: Prepared<'_>,
    transport: &Arc<dyn Transport>,
    store: &InMemoryStore,
) -> MessageContext {
    let Prepared {
        kind,
        content,
        envelope,
    } = prepared;

    let own_id = transport.user_id().map(|id| normalize_jid(&id));
    let Extracted {
        text,
        media,
        context,
    } = extract(content, Some(kind), transport);
    let raw = Arc::new(envelope.clone());

    let mut from = String::new();
    let mut sender = String::new();
    let mut is_group = false;
    if let Some(remote) = envelope.key.remote_jid.as_deref() {
        from = normalize_jid(remote);
        sender.clone_from(&from);
        is_group = parse::is_group_jid(&from);

        if let Some(participant) = envelope.key.participant.as_deref() {
            sender = normalize_jid(participant);
        }
        if envelope.key.from_me
            && let Some(own) = &own_id
        {
            sender.clone_from(own);
        }
    }

    let mentioned = context.map(|c| c.mentioned_jid.clone()).unwrap_or_default();
    let quoted = resolve_quoted(context, &raw, transport, store, own_id.as_deref());

    MessageContext {
        kind,
        args: split_args(&text),
        text,
        media,
        phone: parse::phone_number(&sender),
        name: safe_string(envelope.push_name.as_deref()),
        sender,
        from,
        is_group,
        mentioned,
        quoted,
        raw,
        own_id,
        transport: Arc::clone(transport),
        store: store.clone(),
    }
}
