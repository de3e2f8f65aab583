//! Periodic store persistence
//!
//! Owns the re-arm policy for [`ExclusiveQueue::run_on_interval`]: each flush
//! is a one-shot exclusive job, and the next one is armed only after the
//! previous flush has finished.

use std::path::PathBuf;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::InMemoryStore;
use crate::exclusive::ExclusiveQueue;
use crate::Result;

/// Flushes an [`InMemoryStore`] to disk through an exclusive queue
#[derive(Debug, Clone)]
pub struct StoreSync {
    store: InMemoryStore,
    path: PathBuf,
    interval: Duration,
    queue: ExclusiveQueue,
}

impl StoreSync {
    #[must_use]
    pub fn new(store: InMemoryStore, path: PathBuf, interval: Duration) -> Self {
        Self {
            store,
            path,
            interval,
            queue: ExclusiveQueue::new(),
        }
    }

    /// Queue shared by periodic and on-demand flushes
    #[must_use]
    pub const fn queue(&self) -> &ExclusiveQueue {
        &self.queue
    }

    /// Write the store now, after any flush already in progress
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub async fn flush_now(&self) -> Result<()> {
        let store = self.store.clone();
        let path = self.path.clone();
        self.queue
            .schedule_exclusive(move || async move { store.write_to_file(&path).await })
            .await?
    }

    /// Start the periodic flush loop
    ///
    /// Runs until the returned handle is aborted, which also disarms the
    /// pending timer. Failed flushes are logged and the next one is armed as
    /// usual.
    #[must_use]
    pub fn start(&self) -> JoinHandle<()> {
        let this = self.clone();

        tokio::spawn(async move {
            tracing::info!(
                path = %this.path.display(),
                interval_ms = u64::try_from(this.interval.as_millis()).unwrap_or(u64::MAX),
                "store sync started"
            );

            loop {
                let store = this.store.clone();
                let path = this.path.clone();
                let mut flush = ArmedFlush(
                    this.queue
                        .run_on_interval(move || async move { store.write_to_file(&path).await }, this.interval),
                );

                match (&mut flush.0).await {
                    Ok(Ok(Ok(()))) => {}
                    Ok(Ok(Err(e))) => tracing::warn!(error = %e, "store flush failed"),
                    Ok(Err(e)) => tracing::error!(error = %e, "store flush task dropped"),
                    Err(e) => {
                        tracing::error!(error = %e, "store sync timer stopped");
                        break;
                    }
                }
            }
        })
    }
}

/// Armed interval timer, disarmed when the flush loop is dropped
struct ArmedFlush(JoinHandle<Result<Result<()>>>);

impl Drop for ArmedFlush {
    fn drop(&mut self) {
        self.0.abort();
    }
}
