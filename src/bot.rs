//! Bot lifecycle and event loop
//!
//! Commands and middleware are registered on a [`BotBuilder`]. Once built,
//! the [`Bot`] is immutable apart from its store and can be shared with
//! the message chains it runs.
//!
//! ```text
//! transport ─► store merge ─► normalize ─► middleware chain ─► router
//!                                │                              │
//!                                └─► text / media events        ├─► command handler
//!                                                               └─► message event
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt as _, StreamExt as _};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::commands::{CommandDescriptor, CommandHandler, CommandRegistry, Route};
use crate::config::Config;
use crate::events::{BotEvent, EventBus};
use crate::message::{normalize, MessageContext};
use crate::middleware::{run_chain, Endpoint, Middleware};
use crate::store::{InMemoryStore, StoreSync};
use crate::transport::{Transport, TransportEvent, UpsertBatch};
use crate::Result;

/// Message chains owned by the event loop, started in delivery order
type InFlight = FuturesUnordered<BoxFuture<'static, ()>>;

/// Collects middleware and commands before the bot starts
pub struct BotBuilder {
    config: Config,
    middlewares: Vec<Arc<dyn Middleware>>,
    registry: CommandRegistry,
    events: EventBus,
}

impl BotBuilder {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let registry = CommandRegistry::new(config.prefix.clone(), config.case_sensitive);
        Self {
            config,
            middlewares: Vec::new(),
            registry,
            events: EventBus::default(),
        }
    }

    /// Append a middleware; middleware runs in registration order
    #[must_use]
    pub fn use_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Register a command handler
    #[must_use]
    pub fn command(
        mut self,
        descriptor: impl Into<CommandDescriptor>,
        handler: impl CommandHandler + 'static,
    ) -> Self {
        self.registry.register(descriptor, handler);
        self
    }

    /// Finish registration
    #[must_use]
    pub fn build(self) -> Bot {
        let store = InMemoryStore::default();
        let sync = StoreSync::new(
            store.clone(),
            self.config.store_path.clone(),
            self.config.flush_interval,
        );

        Bot {
            config: self.config,
            middlewares: self.middlewares,
            router: Router {
                registry: self.registry,
                events: self.events,
            },
            store,
            sync,
            sync_task: Mutex::new(None),
        }
    }
}

impl std::fmt::Debug for BotBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotBuilder")
            .field("middlewares", &self.middlewares.len())
            .field("commands", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// End of the middleware chain: command dispatch or generic message event
struct Router {
    registry: CommandRegistry,
    events: EventBus,
}

#[async_trait]
impl Endpoint for Router {
    async fn dispatch(&self, ctx: &mut MessageContext) -> Result<()> {
        match self.registry.route(&ctx.text) {
            Route::Command {
                registration,
                name,
                text,
                source,
            } => {
                tracing::debug!(
                    command = %name,
                    text = %text,
                    source = ?source,
                    sender = %ctx.sender,
                    "dispatching command"
                );
                let mut invocation = ctx.clone();
                invocation.set_text(text);
                registration.handler().call(invocation).await
            }
            Route::Message => {
                self.events.publish(BotEvent::Message(Box::new(ctx.clone())));
                Ok(())
            }
        }
    }
}

/// Running bot
pub struct Bot {
    config: Config,
    middlewares: Vec<Arc<dyn Middleware>>,
    router: Router,
    store: InMemoryStore,
    sync: StoreSync,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl Bot {
    #[must_use]
    pub fn builder(config: Config) -> BotBuilder {
        BotBuilder::new(config)
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &InMemoryStore {
        &self.store
    }

    #[must_use]
    pub const fn registry(&self) -> &CommandRegistry {
        &self.router.registry
    }

    /// Receive bot events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.router.events.subscribe()
    }

    /// Load the store file
    ///
    /// A missing file leaves the store empty. So does a corrupt one, after a
    /// warning.
    pub async fn load_store(&self) {
        let path = &self.config.store_path;
        match self.store.read_from_file(path).await {
            Ok(true) => tracing::info!(path = %path.display(), "store loaded"),
            Ok(false) => tracing::info!(path = %path.display(), "no store file, starting empty"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable store file");
            }
        }
    }

    /// Normalize one upsert batch and run it through the chain
    ///
    /// Batches that are not live notifications are dropped. Auxiliary text and
    /// media events are published before the chain runs.
    ///
    /// # Errors
    ///
    /// Returns the error of the middleware or command handler that failed,
    /// after logging it
    pub async fn process_batch(
        &self,
        batch: &UpsertBatch,
        transport: &Arc<dyn Transport>,
    ) -> Result<()> {
        let Some(mut ctx) = normalize(batch, transport, &self.store) else {
            tracing::trace!(
                kind = ?batch.kind,
                messages = batch.messages.len(),
                "dropped batch"
            );
            return Ok(());
        };

        self.publish_derived(&ctx);

        if let Err(e) = run_chain(&self.middlewares, &self.router, &mut ctx).await {
            tracing::error!(
                sender = %ctx.sender,
                from = %ctx.from,
                text = %ctx.text,
                error = %e,
                "message processing failed"
            );
            return Err(e);
        }
        Ok(())
    }

    fn publish_derived(&self, ctx: &MessageContext) {
        if let Some(media) = &ctx.media {
            self.router.events.publish(BotEvent::Media {
                kind: media.kind(),
                from: ctx.from.clone(),
                media: media.clone(),
            });
        }
        if !ctx.text.is_empty() {
            self.router.events.publish(BotEvent::Text {
                from: ctx.from.clone(),
                sender: ctx.sender.clone(),
                text: ctx.text.clone(),
            });
        }
    }

    /// Run until the transport stream closes or `shutdown` resolves
    ///
    /// The transport is subscribed before this returns, so no event
    /// published after the call is missed even if the future is spawned
    /// later. The future loads the store, starts periodic persistence, then
    /// handles every transport event: the store merges it, message batches
    /// join the in-flight set, and the event is republished on the bot's bus.
    /// In-flight chains run on the loop's own task, so they start in delivery
    /// order and interleave only at their await points. Buffered events are
    /// handled before a shutdown request is honoured. On exit, in-flight
    /// messages are awaited and the store is flushed.
    ///
    /// # Errors
    ///
    /// The future returns error if the final store flush fails
    pub fn run<S>(
        self: Arc<Self>,
        transport: Arc<dyn Transport>,
        shutdown: S,
    ) -> impl Future<Output = Result<()>> + Send + 'static
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let rx = transport.subscribe();
        self.event_loop(rx, transport, shutdown)
    }

    async fn event_loop<S>(
        self: Arc<Self>,
        mut rx: broadcast::Receiver<TransportEvent>,
        transport: Arc<dyn Transport>,
        shutdown: S,
    ) -> Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        self.load_store().await;
        let sync_task = self.sync.start();
        *self.sync_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(sync_task);

        let mut in_flight = InFlight::new();
        tokio::pin!(shutdown);

        tracing::info!(
            transport = transport.name(),
            commands = self.router.registry.len(),
            middlewares = self.middlewares.len(),
            "bot started"
        );

        loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Ok(event) => handle_event(&self, event, &transport, &mut in_flight),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "bot lagged behind transport events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("transport stream closed");
                        break;
                    }
                },
                Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
            }
        }

        while in_flight.next().await.is_some() {}

        self.shutdown().await
    }

    /// Stop periodic persistence and flush the store once more
    ///
    /// # Errors
    ///
    /// Returns error if the flush fails
    pub async fn shutdown(&self) -> Result<()> {
        let task = self
            .sync_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            // Resolves once the loop and its armed timer are dropped
            let _ = task.await;
        }

        self.sync.flush_now().await?;
        tracing::info!(path = %self.config.store_path.display(), "store flushed");
        Ok(())
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("config", &self.config)
            .field("middlewares", &self.middlewares.len())
            .field("commands", &self.router.registry.len())
            .finish_non_exhaustive()
    }
}

fn handle_event(
    bot: &Arc<Bot>,
    event: TransportEvent,
    transport: &Arc<dyn Transport>,
    in_flight: &mut InFlight,
) {
    bot.store.apply(&event);

    if let TransportEvent::MessagesUpsert(batch) = &event {
        let bot = Arc::clone(bot);
        let transport = Arc::clone(transport);
        let batch = batch.clone();
        let chain = async move {
            // Failures are logged by process_batch
            let _ = bot.process_batch(&batch, &transport).await;
        };
        in_flight.push(
            async move {
                if AssertUnwindSafe(chain).catch_unwind().await.is_err() {
                    tracing::error!("message task panicked");
                }
            }
            .boxed(),
        );
    }

    bot.router.events.publish(BotEvent::Transport(event));
}
