//! Dispatch integration tests
//!
//! Drives the bot with a mock transport from raw batches to handlers,
//! middleware and bot events

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_dispatch::commands::CommandDescriptor;
use chat_dispatch::store::StoreSnapshot;
use chat_dispatch::transport::{Contact, ContentKind, MediaKind, RawMessage};
use chat_dispatch::{
    Bot, BotEvent, Config, Error, MessageContext, Middleware, Next, ReplyOptions, Transport,
    TransportEvent,
};
use tokio::sync::{broadcast, oneshot};

mod common;
use common::{notify, recorder, text_message, MockTransport, BOT_ID};

const ALICE: &str = "15551234567@s.whatsapp.net";

fn config(prefixes: &[&str]) -> Config {
    Config {
        prefix: prefixes.iter().map(|p| (*p).to_string()).collect(),
        ..Config::default()
    }
}

fn mock() -> (Arc<MockTransport>, Arc<dyn Transport>) {
    let mock = Arc::new(MockTransport::new());
    let transport: Arc<dyn Transport> = Arc::clone(&mock) as Arc<dyn Transport>;
    (mock, transport)
}

/// Next generic message event, skipping text/media/transport events
fn next_message(rx: &mut broadcast::Receiver<BotEvent>) -> Option<Box<MessageContext>> {
    loop {
        match rx.try_recv() {
            Ok(BotEvent::Message(ctx)) => return Some(ctx),
            Ok(_) => {}
            Err(_) => return None,
        }
    }
}

#[tokio::test]
async fn test_prefixed_command_receives_remaining_text() {
    let (handler, mut calls) = recorder();
    let bot = Bot::builder(config(&["!"])).command("ping", handler).build();
    let (_, transport) = mock();

    bot.process_batch(&notify(text_message(ALICE, "M1", "!ping extra")), &transport)
        .await
        .unwrap();

    let ctx = calls.try_recv().unwrap();
    assert_eq!(ctx.text, "extra");
    assert_eq!(ctx.args, vec!["extra"]);
    assert_eq!(ctx.sender, ALICE);
    assert_eq!(ctx.phone, "+15551234567");
    assert_eq!(ctx.name, "Tester");
}

#[tokio::test]
async fn test_prefix_free_command_without_prefix() {
    let (handler, mut calls) = recorder();
    let bot = Bot::builder(config(&[]))
        .command(CommandDescriptor::new("hello").ignore_prefix(), handler)
        .build();
    let (_, transport) = mock();

    bot.process_batch(&notify(text_message(ALICE, "M1", "hello world")), &transport)
        .await
        .unwrap();

    let ctx = calls.try_recv().unwrap();
    assert_eq!(ctx.text, "world");
    assert_eq!(ctx.args, vec!["world"]);
}

#[tokio::test]
async fn test_unmatched_text_becomes_message_event() {
    let (handler, mut calls) = recorder();
    let bot = Bot::builder(config(&["!"])).command("ping", handler).build();
    let mut events = bot.subscribe();
    let (_, transport) = mock();

    bot.process_batch(&notify(text_message(ALICE, "M1", "random chat")), &transport)
        .await
        .unwrap();

    let message = next_message(&mut events).unwrap();
    assert_eq!(message.text, "random chat");
    assert_eq!(message.args, vec!["random", "chat"]);
    assert!(calls.try_recv().is_err());
}

#[tokio::test]
async fn test_longer_prefix_free_command_wins() {
    let (short, mut short_calls) = recorder();
    let (long, mut long_calls) = recorder();
    let bot = Bot::builder(config(&[]))
        .command(CommandDescriptor::new("help").ignore_prefix(), short)
        .command(CommandDescriptor::new("helpme").ignore_prefix(), long)
        .build();
    let (_, transport) = mock();

    bot.process_batch(&notify(text_message(ALICE, "M1", "helpme now")), &transport)
        .await
        .unwrap();

    assert_eq!(long_calls.try_recv().unwrap().text, "now");
    assert!(short_calls.try_recv().is_err());
}

#[tokio::test]
async fn test_no_prefix_configured_only_generic_messages() {
    let (handler, mut calls) = recorder();
    let bot = Bot::builder(config(&[])).command("ping", handler).build();
    let mut events = bot.subscribe();
    let (_, transport) = mock();

    for text in ["ping", "!ping", "/ping"] {
        bot.process_batch(&notify(text_message(ALICE, "M1", text)), &transport)
            .await
            .unwrap();
        assert_eq!(next_message(&mut events).unwrap().text, text);
    }
    assert!(calls.try_recv().is_err());
}

/// Stops every message that does not come from an allowed chat
struct AllowOnly(&'static str);

#[async_trait]
impl Middleware for AllowOnly {
    async fn handle(
        &self,
        ctx: &mut MessageContext,
        next: Next<'_>,
    ) -> chat_dispatch::Result<()> {
        if ctx.from == self.0 {
            next.run(ctx).await
        } else {
            Ok(())
        }
    }
}

/// Fails on messages containing "boom"
struct Explode;

#[async_trait]
impl Middleware for Explode {
    async fn handle(
        &self,
        ctx: &mut MessageContext,
        next: Next<'_>,
    ) -> chat_dispatch::Result<()> {
        if ctx.text.contains("boom") {
            return Err(Error::Middleware(format!("refusing {}", ctx.text)));
        }
        next.run(ctx).await
    }
}

#[tokio::test]
async fn test_short_circuit_skips_dispatch_and_message_event() {
    let (handler, mut calls) = recorder();
    let bot = Bot::builder(config(&["!"]))
        .use_middleware(AllowOnly(ALICE))
        .command("ping", handler)
        .build();
    let mut events = bot.subscribe();
    let (_, transport) = mock();

    let stranger = "19998887777@s.whatsapp.net";
    bot.process_batch(&notify(text_message(stranger, "M1", "!ping")), &transport)
        .await
        .unwrap();
    bot.process_batch(&notify(text_message(stranger, "M2", "hi")), &transport)
        .await
        .unwrap();
    assert!(calls.try_recv().is_err());
    assert!(next_message(&mut events).is_none());

    bot.process_batch(&notify(text_message(ALICE, "M3", "!ping")), &transport)
        .await
        .unwrap();
    assert_eq!(calls.try_recv().unwrap().sender, ALICE);
}

#[tokio::test]
async fn test_middleware_error_only_aborts_that_message() {
    let (handler, mut calls) = recorder();
    let bot = Bot::builder(config(&["!"]))
        .use_middleware(Explode)
        .command("ping", handler)
        .build();
    let (_, transport) = mock();

    let err = bot
        .process_batch(&notify(text_message(ALICE, "M1", "!ping boom")), &transport)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Middleware(_)));
    assert!(calls.try_recv().is_err());

    bot.process_batch(&notify(text_message(ALICE, "M2", "!ping ok")), &transport)
        .await
        .unwrap();
    assert_eq!(calls.try_recv().unwrap().text, "ok");
}

#[tokio::test]
async fn test_reply_quotes_message_and_can_be_edited() {
    let (handler, mut calls) = recorder();
    let bot = Bot::builder(config(&["!"])).command("ping", handler).build();
    let (mock, transport) = mock();

    bot.process_batch(&notify(text_message(ALICE, "M1", "!ping")), &transport)
        .await
        .unwrap();
    let ctx = calls.try_recv().unwrap();

    let sent = ctx.reply_text("pong").await.unwrap();
    sent.edit("pong!").await;

    let messages = mock.sent_messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].jid, ALICE);
    assert_eq!(messages[0].content.text, "pong");
    assert_eq!(messages[0].quoted.as_ref().unwrap().id.as_deref(), Some("M1"));

    let edits = mock.edited.lock().await.clone();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].1.id.as_deref(), Some("SENT0"));
    assert_eq!(edits[0].2, "pong!");
}

#[tokio::test]
async fn test_failed_reply_returns_none() {
    let (handler, mut calls) = recorder();
    let bot = Bot::builder(config(&["!"])).command("ping", handler).build();
    let (mock, transport) = mock();

    bot.process_batch(&notify(text_message(ALICE, "M1", "!ping")), &transport)
        .await
        .unwrap();
    let ctx = calls.try_recv().unwrap();

    mock.fail_sends();
    assert!(ctx.reply_text("pong").await.is_none());
    assert!(mock.sent_messages().await.is_empty());
}

fn quoted_reply_in_group() -> RawMessage {
    serde_json::from_value(serde_json::json!({
        "key": {
            "remoteJid": "120363000000@g.us",
            "fromMe": false,
            "id": "NEWEST",
            "participant": "15550000001:3@s.whatsapp.net"
        },
        "pushName": "Bob",
        "message": {
            "extendedTextMessage": {
                "text": "!del",
                "contextInfo": {
                    "stanzaId": "QUOTED1",
                    "participant": "15550000002@s.whatsapp.net",
                    "quotedMessage": {"conversation": "original words"},
                    "mentionedJid": ["15550000002@s.whatsapp.net"]
                }
            }
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_quoted_delete_targets_quoted_item() {
    let (handler, mut calls) = recorder();
    let bot = Bot::builder(config(&["!"])).command("del", handler).build();
    bot.store().upsert_contacts(vec![Contact {
        id: "15550000002@s.whatsapp.net".into(),
        name: Some("Carol".into()),
        notify: None,
    }]);
    let (mock, transport) = mock();

    bot.process_batch(&notify(quoted_reply_in_group()), &transport)
        .await
        .unwrap();
    let ctx = calls.try_recv().unwrap();

    assert!(ctx.is_group);
    assert_eq!(ctx.sender, "15550000001@s.whatsapp.net");
    assert_eq!(ctx.mentioned, vec!["15550000002@s.whatsapp.net"]);

    let quoted = ctx.quoted.as_ref().unwrap();
    assert_eq!(quoted.text, "original words");
    assert_eq!(quoted.name, "Carol");
    assert_eq!(quoted.kind, Some(ContentKind::Conversation));

    quoted.delete().await;

    let deleted = mock.deleted_keys().await;
    assert_eq!(deleted.len(), 1);
    let (jid, key) = &deleted[0];
    assert_eq!(jid, "120363000000@g.us");
    assert_eq!(key.remote_jid.as_deref(), Some("120363000000@g.us"));
    assert_eq!(key.id.as_deref(), Some("QUOTED1"));
    assert_eq!(key.participant.as_deref(), Some("15550000002@s.whatsapp.net"));
    assert!(!key.from_me);
}

#[tokio::test]
async fn test_own_message_sender_is_bot() {
    let (handler, mut calls) = recorder();
    let bot = Bot::builder(config(&["!"])).command("ping", handler).build();
    let (mock, transport) = mock();

    let mut message = text_message(ALICE, "M1", "!ping");
    message.key.from_me = true;
    bot.process_batch(&notify(message), &transport).await.unwrap();

    let ctx = calls.try_recv().unwrap();
    assert_eq!(ctx.sender, BOT_ID);
    assert_eq!(ctx.from, ALICE);

    ctx.delete().await;
    let deleted = mock.deleted_keys().await;
    assert_eq!(deleted[0].1.id.as_deref(), Some("M1"));
    assert!(deleted[0].1.from_me);
}

#[tokio::test]
async fn test_run_dispatches_and_flushes_store_on_shutdown() {
    let dir = tempfile::TempDir::new().unwrap();
    let store_path = dir.path().join("bot_store.json");

    let (handler, mut calls) = recorder();
    let bot = Arc::new(
        Bot::builder(Config {
            store_path: store_path.clone(),
            flush_interval: Duration::from_secs(3600),
            ..config(&["!"])
        })
        .command("ping", handler)
        .build(),
    );
    let (mock, transport) = mock();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(Arc::clone(&bot).run(transport, async move {
        let _ = stop_rx.await;
    }));

    mock.publish(TransportEvent::ContactsUpsert(vec![Contact {
        id: ALICE.into(),
        name: Some("Alice".into()),
        notify: None,
    }]));
    mock.publish(TransportEvent::MessagesUpsert(notify(text_message(
        ALICE,
        "M1",
        "!ping from run",
    ))));

    let ctx = tokio::time::timeout(Duration::from_secs(5), calls.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ctx.text, "from run");

    stop_tx.send(()).unwrap();
    running.await.unwrap().unwrap();

    let reloaded = chat_dispatch::InMemoryStore::default();
    assert!(reloaded.read_from_file(&store_path).await.unwrap());
    assert_eq!(reloaded.contact_name(ALICE).as_deref(), Some("Alice"));
    assert!(reloaded.load_message(ALICE, "M1").is_some());
}

#[tokio::test]
async fn test_corrupt_store_file_starts_empty() {
    let dir = tempfile::TempDir::new().unwrap();
    let store_path = dir.path().join("bot_store.json");
    std::fs::write(&store_path, "{ definitely not json").unwrap();

    let bot = Arc::new(
        Bot::builder(Config {
            store_path: store_path.clone(),
            ..Config::default()
        })
        .build(),
    );
    let (_, transport) = mock();

    Arc::clone(&bot).run(transport, async {}).await.unwrap();

    assert_eq!(bot.store().snapshot(), StoreSnapshot::default());
    let reloaded = chat_dispatch::InMemoryStore::default();
    assert!(reloaded.read_from_file(&store_path).await.unwrap());
}

#[tokio::test]
async fn test_quoted_reply_targets_quoted_item() {
    let (handler, mut calls) = recorder();
    let bot = Bot::builder(config(&["!"])).command("del", handler).build();
    let (mock, transport) = mock();

    bot.process_batch(&notify(quoted_reply_in_group()), &transport)
        .await
        .unwrap();
    let ctx = calls.try_recv().unwrap();
    let quoted = ctx.quoted.as_ref().unwrap();

    let sent = quoted.reply("noted", ReplyOptions::default()).await.unwrap();

    let messages = mock.sent_messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].jid, "120363000000@g.us");
    let target = messages[0].quoted.as_ref().unwrap();
    assert_eq!(target.id.as_deref(), Some("QUOTED1"));
    assert_eq!(target.participant.as_deref(), Some("15550000002@s.whatsapp.net"));

    sent.delete().await;
    let deleted = mock.deleted_keys().await;
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].1.id.as_deref(), Some("SENT0"));
    assert!(deleted[0].1.from_me);
}

fn image_message() -> RawMessage {
    serde_json::from_value(serde_json::json!({
        "key": {"remoteJid": ALICE, "fromMe": false, "id": "IMG1"},
        "pushName": "Tester",
        "message": {
            "imageMessage": {
                "mimetype": "image/jpeg",
                "caption": "look at this",
                "fileLength": 1234
            }
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_media_event_precedes_text_and_downloads() {
    let bot = Bot::builder(config(&["!"])).build();
    let mut events = bot.subscribe();
    let (_, transport) = mock();

    bot.process_batch(&notify(image_message()), &transport)
        .await
        .unwrap();

    match events.try_recv().unwrap() {
        BotEvent::Media { kind, from, media } => {
            assert_eq!(kind, MediaKind::Image);
            assert_eq!(from, ALICE);
            assert_eq!(media.mime_type, "image/jpeg");
            assert_eq!(media.size, Some(1234));
            assert_eq!(media.download().await.unwrap(), b"media-bytes");
        }
        other => panic!("expected media event, got {}", other.name()),
    }
    match events.try_recv().unwrap() {
        BotEvent::Text { text, .. } => assert_eq!(text, "look at this"),
        other => panic!("expected text event, got {}", other.name()),
    }

    let message = next_message(&mut events).unwrap();
    assert_eq!(message.kind, ContentKind::ImageMessage);
    assert_eq!(message.media.as_ref().unwrap().kind(), MediaKind::Image);
}

/// Records the id of every message whose chain starts
struct StartOrder(Arc<std::sync::Mutex<Vec<String>>>);

#[async_trait]
impl Middleware for StartOrder {
    async fn handle(
        &self,
        ctx: &mut MessageContext,
        next: Next<'_>,
    ) -> chat_dispatch::Result<()> {
        self.0
            .lock()
            .unwrap()
            .push(ctx.raw.key.id.clone().unwrap_or_default());
        tokio::task::yield_now().await;
        next.run(ctx).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chains_start_in_delivery_order() {
    let started = Arc::new(std::sync::Mutex::new(Vec::new()));
    let bot = Arc::new(
        Bot::builder(config(&["!"]))
            .use_middleware(StartOrder(Arc::clone(&started)))
            .build(),
    );
    let (mock, transport) = mock();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(Arc::clone(&bot).run(transport, async move {
        let _ = stop_rx.await;
    }));

    let ids: Vec<String> = (0..60).map(|i| format!("{i:03}")).collect();
    for id in &ids {
        mock.publish(TransportEvent::MessagesUpsert(notify(text_message(ALICE, id, "hi"))));
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while started.lock().unwrap().len() < ids.len() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    stop_tx.send(()).unwrap();
    running.await.unwrap().unwrap();
    assert_eq!(*started.lock().unwrap(), ids);
}

#[tokio::test]
async fn test_no_store_write_after_shutdown() {
    let dir = tempfile::TempDir::new().unwrap();
    let store_path = dir.path().join("bot_store.json");

    let bot = Arc::new(
        Bot::builder(Config {
            store_path: store_path.clone(),
            flush_interval: Duration::from_millis(50),
            ..Config::default()
        })
        .build(),
    );
    let (_, transport) = mock();

    Arc::clone(&bot)
        .run(transport, tokio::time::sleep(Duration::from_millis(120)))
        .await
        .unwrap();

    std::fs::remove_file(&store_path).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!store_path.exists());
}
