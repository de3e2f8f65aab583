//! Command registration and routing
//!
//! Two lookup strategies are tried for each message, always in this order:
//!
//! 1. The trie of prefix-free commands. The longest registered name the text
//!    starts with wins, and no prefix is required. There is no word-boundary
//!    check, so `hello` also matches `helloworld`.
//! 2. The configured prefixes. The first prefix the text starts with is
//!    stripped, the next token is the command name, and it is looked up in the
//!    exact-match map. Commands registered with `ignore_prefix` are skipped
//!    here, since they are reachable through the trie only.
//!
//! Anything else is a plain message. Registration happens before the bot
//! starts; the registry is read-only while dispatching.

pub mod prefix;
pub mod trie;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

pub use prefix::{extract_prefix, normalize_prefix, PrefixMatch, PrefixSetting};
pub use trie::{CommandTrie, TrieMatch};

use crate::message::MessageContext;
use crate::Result;

/// Handler invoked when a command matches
///
/// The context it receives has its text replaced with the text after the
/// command name.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn call(&self, ctx: MessageContext) -> Result<()>;
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(MessageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn call(&self, ctx: MessageContext) -> Result<()> {
        (self)(ctx).await
    }
}

/// Command name plus registration options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub command: String,
    /// Make the command prefix-free: matched by the trie, never by prefix
    pub ignore_prefix: bool,
}

impl CommandDescriptor {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ignore_prefix: false,
        }
    }

    /// Mark the command as prefix-free
    #[must_use]
    pub const fn ignore_prefix(mut self) -> Self {
        self.ignore_prefix = true;
        self
    }
}

impl From<&str> for CommandDescriptor {
    fn from(command: &str) -> Self {
        Self::new(command)
    }
}

impl From<String> for CommandDescriptor {
    fn from(command: String) -> Self {
        Self::new(command)
    }
}

/// A registered command
pub struct Registration {
    /// Name as stored (lower-cased unless case-sensitive)
    pub name: String,
    pub ignore_prefix: bool,
    handler: Arc<dyn CommandHandler>,
}

impl Registration {
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn CommandHandler> {
        &self.handler
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("ignore_prefix", &self.ignore_prefix)
            .finish_non_exhaustive()
    }
}

/// How a routed command was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Trie,
    Prefix,
}

/// Routing decision for one message text
#[derive(Debug)]
pub enum Route<'a> {
    /// Invoke `registration` with `text` as the new message text
    Command {
        registration: &'a Arc<Registration>,
        /// Command name as it appeared in the message
        name: String,
        /// Text after the command name, trimmed
        text: String,
        source: MatchSource,
    },
    /// Not a command; publish as a generic message
    Message,
}

/// Exact-match command map plus trie of prefix-free commands
#[derive(Debug)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<Registration>>,
    trie: CommandTrie<Arc<Registration>>,
    prefixes: Vec<String>,
    case_sensitive: bool,
}

impl CommandRegistry {
    #[must_use]
    pub fn new(prefixes: Vec<String>, case_sensitive: bool) -> Self {
        Self {
            commands: HashMap::new(),
            trie: CommandTrie::new(),
            prefixes,
            case_sensitive,
        }
    }

    #[must_use]
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn fold(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    /// Register a command; a later registration under the same name replaces
    /// the earlier one
    pub fn register(
        &mut self,
        descriptor: impl Into<CommandDescriptor>,
        handler: impl CommandHandler + 'static,
    ) {
        let descriptor = descriptor.into();
        let name = self.fold(descriptor.command.trim());
        let registration = Arc::new(Registration {
            name: name.clone(),
            ignore_prefix: descriptor.ignore_prefix,
            handler: Arc::new(handler),
        });

        if registration.ignore_prefix {
            self.trie.insert(&name, Arc::clone(&registration));
        }
        if self.commands.insert(name.clone(), registration).is_some() {
            tracing::warn!(command = %name, "command registered twice, keeping the latest");
        }
    }

    /// Look up a registration by exact name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Registration>> {
        self.commands.get(&self.fold(name))
    }

    /// Decide how to handle `text`
    ///
    /// The trie is always consulted before the prefix map, so a prefix-free
    /// command wins over any prefixed interpretation of the same text.
    #[must_use]
    pub fn route(&self, text: &str) -> Route<'_> {
        if let Some(found) = self.trie.find_longest(text, !self.case_sensitive) {
            return Route::Command {
                registration: found.value,
                name: text[..found.len].to_string(),
                text: text[found.len..].trim().to_string(),
                source: MatchSource::Trie,
            };
        }

        let Some(matched) = extract_prefix(&self.prefixes, text) else {
            return Route::Message;
        };

        match self.commands.get(&self.fold(&matched.command)) {
            Some(registration) if !registration.ignore_prefix => Route::Command {
                registration,
                name: matched.command,
                text: matched.text,
                source: MatchSource::Prefix,
            },
            _ => Route::Message,
        }
    }
}
