//! Raw payload types delivered by the transport
//!
//! Field names follow the transport's JSON encoding (camelCase). Fields the
//! dispatch core does not read are kept in `extra` so that payloads survive a
//! store round-trip and can still be handed back for media download.

use serde::{Deserialize, Serialize};

/// Content-kind discriminator: which variant of payload a message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentKind {
    Conversation,
    ImageMessage,
    VideoMessage,
    AudioMessage,
    DocumentMessage,
    DocumentWithCaptionMessage,
    StickerMessage,
    ExtendedTextMessage,
    ViewOnceMessage,
    ViewOnceMessageV2,
    ViewOnceMessageV2Extension,
    EphemeralMessage,
    ContactMessage,
    LocationMessage,
    PollCreationMessage,
    ReactionMessage,
    ButtonsResponseMessage,
    ListResponseMessage,
    TemplateButtonReplyMessage,
}

impl ContentKind {
    /// Payload kinds in detection priority order (plain conversation excluded)
    pub const PAYLOAD_KINDS: [Self; 18] = [
        Self::ImageMessage,
        Self::VideoMessage,
        Self::AudioMessage,
        Self::DocumentMessage,
        Self::DocumentWithCaptionMessage,
        Self::StickerMessage,
        Self::ExtendedTextMessage,
        Self::ViewOnceMessage,
        Self::ViewOnceMessageV2,
        Self::ViewOnceMessageV2Extension,
        Self::EphemeralMessage,
        Self::ContactMessage,
        Self::LocationMessage,
        Self::PollCreationMessage,
        Self::ReactionMessage,
        Self::ButtonsResponseMessage,
        Self::ListResponseMessage,
        Self::TemplateButtonReplyMessage,
    ];

    /// Wire name of the field carrying this kind
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::ImageMessage => "imageMessage",
            Self::VideoMessage => "videoMessage",
            Self::AudioMessage => "audioMessage",
            Self::DocumentMessage => "documentMessage",
            Self::DocumentWithCaptionMessage => "documentWithCaptionMessage",
            Self::StickerMessage => "stickerMessage",
            Self::ExtendedTextMessage => "extendedTextMessage",
            Self::ViewOnceMessage => "viewOnceMessage",
            Self::ViewOnceMessageV2 => "viewOnceMessageV2",
            Self::ViewOnceMessageV2Extension => "viewOnceMessageV2Extension",
            Self::EphemeralMessage => "ephemeralMessage",
            Self::ContactMessage => "contactMessage",
            Self::LocationMessage => "locationMessage",
            Self::PollCreationMessage => "pollCreationMessage",
            Self::ReactionMessage => "reactionMessage",
            Self::ButtonsResponseMessage => "buttonsResponseMessage",
            Self::ListResponseMessage => "listResponseMessage",
            Self::TemplateButtonReplyMessage => "templateButtonReplyMessage",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message key identifying one message within a chat
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    /// Chat the message belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_jid: Option<String>,
    /// Whether the message was sent by this account
    #[serde(default)]
    pub from_me: bool,
    /// Message id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Author inside a group chat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
}

/// Size field as encoded by the transport: a plain number or a 64-bit wrapper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileLength {
    /// Plain numeric size
    Number(u64),
    /// 64-bit integer split into two 32-bit halves
    Long {
        low: i32,
        high: i32,
        #[serde(default)]
        unsigned: bool,
    },
    /// Decimal string
    Text(String),
}

/// Reply/mention metadata attached to a payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInfo {
    /// Id of the quoted message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stanza_id: Option<String>,
    /// Author of the quoted message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
    /// Inline copy of the quoted message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_message: Option<Box<RawContent>>,
    /// Identifiers mentioned in the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentioned_jid: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of one content kind (image, extended text, wrapper, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_length: Option<FileLength>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_info: Option<ContextInfo>,
    /// Inner message for wrapper kinds (view-once, ephemeral, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Box<RawContent>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Message content: at most a few of these fields are populated at once
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_with_caption_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_text_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_once_message: Option<Payload>,
    #[serde(default, rename = "viewOnceMessageV2", skip_serializing_if = "Option::is_none")]
    pub view_once_message_v2: Option<Payload>,
    #[serde(
        default,
        rename = "viewOnceMessageV2Extension",
        skip_serializing_if = "Option::is_none"
    )]
    pub view_once_message_v2_extension: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_creation_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons_response_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_response_message: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_button_reply_message: Option<Payload>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RawContent {
    /// Plain text content
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            conversation: Some(text.into()),
            ..Self::default()
        }
    }

    /// Payload stored under the given kind, if populated
    ///
    /// `Conversation` carries a bare string rather than a payload and always
    /// returns `None` here.
    #[must_use]
    pub const fn payload(&self, kind: ContentKind) -> Option<&Payload> {
        match kind {
            ContentKind::Conversation => None,
            ContentKind::ImageMessage => self.image_message.as_ref(),
            ContentKind::VideoMessage => self.video_message.as_ref(),
            ContentKind::AudioMessage => self.audio_message.as_ref(),
            ContentKind::DocumentMessage => self.document_message.as_ref(),
            ContentKind::DocumentWithCaptionMessage => self.document_with_caption_message.as_ref(),
            ContentKind::StickerMessage => self.sticker_message.as_ref(),
            ContentKind::ExtendedTextMessage => self.extended_text_message.as_ref(),
            ContentKind::ViewOnceMessage => self.view_once_message.as_ref(),
            ContentKind::ViewOnceMessageV2 => self.view_once_message_v2.as_ref(),
            ContentKind::ViewOnceMessageV2Extension => self.view_once_message_v2_extension.as_ref(),
            ContentKind::EphemeralMessage => self.ephemeral_message.as_ref(),
            ContentKind::ContactMessage => self.contact_message.as_ref(),
            ContentKind::LocationMessage => self.location_message.as_ref(),
            ContentKind::PollCreationMessage => self.poll_creation_message.as_ref(),
            ContentKind::ReactionMessage => self.reaction_message.as_ref(),
            ContentKind::ButtonsResponseMessage => self.buttons_response_message.as_ref(),
            ContentKind::ListResponseMessage => self.list_response_message.as_ref(),
            ContentKind::TemplateButtonReplyMessage => self.template_button_reply_message.as_ref(),
        }
    }

    /// Whether the given kind's field is populated
    #[must_use]
    pub fn has(&self, kind: ContentKind) -> bool {
        match kind {
            ContentKind::Conversation => self.conversation.is_some(),
            other => self.payload(other).is_some(),
        }
    }
}

/// Message envelope as delivered by the transport
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub key: MessageKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<RawContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_timestamp: Option<u64>,
}

/// Delivery tag of an upsert batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertType {
    /// Live notification of a new message
    Notify,
    /// History or offline catch-up
    Append,
    #[serde(other)]
    Other,
}

/// Batch of new or updated messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertBatch {
    pub messages: Vec<RawMessage>,
    #[serde(rename = "type")]
    pub kind: UpsertType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Contact record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    /// Name from the address book
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Name the contact set for themselves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<String>,
}

/// Chat metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u32>,
}

/// Event published on the transport's stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum TransportEvent {
    #[serde(rename = "messages.upsert")]
    MessagesUpsert(UpsertBatch),
    #[serde(rename = "contacts.upsert")]
    ContactsUpsert(Vec<Contact>),
    #[serde(rename = "chats.upsert")]
    ChatsUpsert(Vec<Chat>),
}

/// Top-level class of a media MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    /// Determine the media class from a MIME type
    #[must_use]
    pub fn from_mime(mime_type: &str) -> Self {
        let lower = mime_type.to_lowercase();
        if lower.starts_with("image/") {
            Self::Image
        } else if lower.starts_with("video/") {
            Self::Video
        } else if lower.starts_with("audio/") {
            Self::Audio
        } else {
            Self::Document
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }
}

/// Media attached to an outgoing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMedia {
    pub kind: MediaKind,
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
}

/// Content of an outgoing message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingContent {
    /// Text body (caption when media is attached)
    pub text: String,
    /// Identifiers to mention
    pub mentions: Vec<String>,
    pub media: Option<OutgoingMedia>,
}

impl OutgoingContent {
    /// Create a plain text message
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}
