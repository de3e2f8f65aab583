//! Chat Dispatch - message normalization and command routing for chat bots
//!
//! This library provides the dispatch core for bots on top of a chat
//! transport:
//! - Normalizing raw upsert batches into a [`MessageContext`]
//! - Resolving quoted replies one level deep
//! - Running an ordered middleware chain
//! - Routing commands by prefix or through a prefix-free trie
//! - Persisting the contact/chat/message store without overlapping writes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Transport (external)                │
//! │   session  │  credentials  │  event stream          │
//! └────────────────────┬────────────────────────────────┘
//!                      │ TransportEvent
//! ┌────────────────────▼────────────────────────────────┐
//! │                       Bot                           │
//! │   normalize  │  middleware  │  commands  │  events  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │            Store + exclusive flush queue            │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod exclusive;
pub mod media;
pub mod message;
pub mod middleware;
pub mod store;
pub mod transport;

pub use bot::{Bot, BotBuilder};
pub use commands::{CommandDescriptor, CommandHandler, CommandRegistry, Route};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{BotEvent, EventBus};
pub use exclusive::ExclusiveQueue;
pub use message::{Media, MessageContext, QuotedMessage, ReplyOptions, SentReply};
pub use middleware::{Middleware, Next};
pub use store::{InMemoryStore, StoreSync};
pub use transport::{Transport, TransportEvent};
