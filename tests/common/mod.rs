//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chat_dispatch::commands::CommandHandler;
use chat_dispatch::transport::{
    MessageKey, OutgoingContent, RawContent, RawMessage, UpsertBatch, UpsertType,
};
use chat_dispatch::{Error, MessageContext, Transport, TransportEvent};
use tokio::sync::{broadcast, mpsc, Mutex};

pub const BOT_ID: &str = "100@s.whatsapp.net";

/// Outbound message recorded by [`MockTransport`]
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub jid: String,
    pub content: OutgoingContent,
    pub quoted: Option<MessageKey>,
}

/// Mock transport for testing
pub struct MockTransport {
    events: broadcast::Sender<TransportEvent>,
    pub sent: Arc<Mutex<Vec<SentMessage>>>,
    pub deleted: Arc<Mutex<Vec<(String, MessageKey)>>>,
    pub edited: Arc<Mutex<Vec<(String, MessageKey, String)>>>,
    fail_sends: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            sent: Arc::new(Mutex::new(Vec::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            edited: Arc::new(Mutex::new(Vec::new())),
            fail_sends: AtomicBool::new(false),
        }
    }

    pub fn publish(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Make every subsequent send fail
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn deleted_keys(&self) -> Vec<(String, MessageKey)> {
        self.deleted.lock().await.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn user_id(&self) -> Option<String> {
        // Device-qualified, as live sessions report it
        Some("100:7@s.whatsapp.net".to_string())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn send_message(
        &self,
        jid: &str,
        content: OutgoingContent,
        quoted: Option<&RawMessage>,
    ) -> chat_dispatch::Result<RawMessage> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Transport("send refused".into()));
        }

        let mut sent = self.sent.lock().await;
        let id = format!("SENT{}", sent.len());
        sent.push(SentMessage {
            jid: jid.to_string(),
            content: content.clone(),
            quoted: quoted.map(|q| q.key.clone()),
        });

        Ok(RawMessage {
            key: MessageKey {
                remote_jid: Some(jid.to_string()),
                from_me: true,
                id: Some(id),
                participant: None,
            },
            message: Some(RawContent::text(content.text)),
            push_name: None,
            message_timestamp: None,
        })
    }

    async fn delete_message(&self, jid: &str, key: &MessageKey) -> chat_dispatch::Result<()> {
        self.deleted
            .lock()
            .await
            .push((jid.to_string(), key.clone()));
        Ok(())
    }

    async fn edit_message(
        &self,
        jid: &str,
        key: &MessageKey,
        text: &str,
    ) -> chat_dispatch::Result<()> {
        self.edited
            .lock()
            .await
            .push((jid.to_string(), key.clone(), text.to_string()));
        Ok(())
    }

    async fn download_media(&self, _content: &RawContent) -> chat_dispatch::Result<Vec<u8>> {
        Ok(b"media-bytes".to_vec())
    }
}

/// Live notification carrying one message
pub fn notify(message: RawMessage) -> UpsertBatch {
    UpsertBatch {
        messages: vec![message],
        kind: UpsertType::Notify,
        request_id: None,
    }
}

/// Plain text message in a direct chat
pub fn text_message(from: &str, id: &str, text: &str) -> RawMessage {
    RawMessage {
        key: MessageKey {
            remote_jid: Some(from.to_string()),
            from_me: false,
            id: Some(id.to_string()),
            participant: None,
        },
        message: Some(RawContent::text(text)),
        push_name: Some("Tester".to_string()),
        message_timestamp: Some(1_700_000_000),
    }
}

/// Command handler forwarding every invocation to a channel
pub fn recorder() -> (
    impl CommandHandler + 'static,
    mpsc::UnboundedReceiver<MessageContext>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |ctx: MessageContext| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(ctx);
            Ok::<(), Error>(())
        }
    };
    (handler, rx)
}
