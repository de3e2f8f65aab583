//! Typed event bus
//!
//! The bot subscribes once to the transport's stream and republishes what it
//! sees here, together with the events it derives from each message.
//! Publishing never fails: an event nobody listens to is dropped.

use tokio::sync::broadcast;

use crate::message::{Media, MessageContext};
use crate::transport::{MediaKind, TransportEvent};

/// Default capacity of the bus
pub const DEFAULT_CAPACITY: usize = 256;

/// Event published by the bot
#[derive(Debug, Clone)]
pub enum BotEvent {
    /// A message that reached the router and was not a command
    Message(Box<MessageContext>),
    /// Text of an inbound message, when non-empty
    Text {
        from: String,
        sender: String,
        text: String,
    },
    /// Media attached to an inbound message
    Media {
        kind: MediaKind,
        from: String,
        media: Media,
    },
    /// Raw transport event, passed through unchanged
    Transport(TransportEvent),
}

impl BotEvent {
    /// Event name: `message`, `text`, the media class, or the transport
    /// event's own name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Text { .. } => "text",
            Self::Media { kind, .. } => kind.as_str(),
            Self::Transport(TransportEvent::MessagesUpsert(_)) => "messages.upsert",
            Self::Transport(TransportEvent::ContactsUpsert(_)) => "contacts.upsert",
            Self::Transport(TransportEvent::ChatsUpsert(_)) => "chats.upsert",
        }
    }
}

/// Broadcast bus for [`BotEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BotEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive every event published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.tx.subscribe()
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: BotEvent) -> usize {
        let name = event.name();
        self.tx.send(event).unwrap_or_else(|_| {
            tracing::trace!(event = name, "no subscribers for event");
            0
        })
    }
}
