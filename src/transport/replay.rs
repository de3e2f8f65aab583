//! Replay transport
//!
//! Publishes transport events recorded as JSON lines and logs every outbound
//! call instead of sending it anywhere. Used by `dispatch replay`.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use super::{MessageKey, OutgoingContent, RawContent, RawMessage, Transport, TransportEvent};
use crate::{Error, Result};

/// Capacity of the event stream buffer
const EVENT_BUFFER: usize = 256;

/// Transport that replays recorded events
pub struct ReplayTransport {
    user_id: String,
    events: broadcast::Sender<TransportEvent>,
    sent: AtomicUsize,
}

impl ReplayTransport {
    /// Create a replay transport logged in as `user_id`
    #[must_use]
    pub fn new(user_id: String) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            user_id,
            events,
            sent: AtomicUsize::new(0),
        }
    }

    /// Publish a single event to all subscribers
    pub fn publish(&self, event: TransportEvent) {
        // No subscribers is not an error for a replay
        let _ = self.events.send(event);
    }

    /// Number of messages sent through this transport so far
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }

    /// Publish every event in a JSON-lines file
    ///
    /// Blank lines are skipped. Returns the number of events published.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or a line is not a valid event
    pub async fn replay_file(&self, path: &Path) -> Result<usize> {
        let file = tokio::fs::File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut count = 0;
        let mut line_no = 0;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let event: TransportEvent = serde_json::from_str(&line).map_err(|e| {
                Error::Transport(format!("{}:{line_no}: invalid event: {e}", path.display()))
            })?;
            self.publish(event);
            count += 1;
            // Let subscribers drain before the buffer fills
            tokio::task::yield_now().await;
        }

        tracing::info!(path = %path.display(), events = count, "replay finished");
        Ok(count)
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn user_id(&self) -> Option<String> {
        Some(self.user_id.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn send_message(
        &self,
        jid: &str,
        content: OutgoingContent,
        quoted: Option<&RawMessage>,
    ) -> Result<RawMessage> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            to = jid,
            text = %content.text,
            media = content.media.as_ref().map(|m| m.kind.as_str()),
            quoted = quoted.and_then(|q| q.key.id.as_deref()),
            "send"
        );

        Ok(RawMessage {
            key: MessageKey {
                remote_jid: Some(jid.to_string()),
                from_me: true,
                id: Some(uuid::Uuid::new_v4().simple().to_string().to_uppercase()),
                participant: None,
            },
            message: Some(RawContent::text(content.text)),
            push_name: None,
            message_timestamp: u64::try_from(chrono::Utc::now().timestamp()).ok(),
        })
    }

    async fn delete_message(&self, jid: &str, key: &MessageKey) -> Result<()> {
        tracing::info!(chat = jid, id = ?key.id, participant = ?key.participant, "delete");
        Ok(())
    }

    async fn edit_message(&self, jid: &str, key: &MessageKey, text: &str) -> Result<()> {
        tracing::info!(chat = jid, id = ?key.id, text, "edit");
        Ok(())
    }

    async fn download_media(&self, _content: &RawContent) -> Result<Vec<u8>> {
        Err(Error::Transport(
            "replay transport cannot download media".to_string(),
        ))
    }
}
