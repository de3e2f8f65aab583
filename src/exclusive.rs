//! Exclusive FIFO task queue
//!
//! At most one task body runs at a time. Tasks run in submission order, and a
//! task's outcome is delivered only to the caller that scheduled it, so a
//! failing task never stops the queue from draining.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt as _;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{Error, Result};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
struct State {
    queue: VecDeque<Job>,
    /// Set while a drain loop owns the queue
    locked: bool,
}

/// FIFO queue guaranteeing exclusive execution of its tasks
#[derive(Clone, Default)]
pub struct ExclusiveQueue {
    state: Arc<Mutex<State>>,
}

impl ExclusiveQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether a task is currently executing or waiting to execute
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock().locked
    }

    /// Number of tasks waiting behind the running one
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Enqueue `task` and start draining if the queue is idle
    ///
    /// The task is enqueued immediately, not when the returned future is
    /// first polled. The future resolves with the task's output, or with
    /// [`Error::QueueClosed`] if the task panicked. Must be called from
    /// within a Tokio runtime.
    pub fn schedule_exclusive<F, Fut, T>(
        &self,
        task: F,
    ) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            async move {
                let output = task().await;
                // Caller may have stopped waiting
                let _ = tx.send(output);
            }
            .boxed()
        });

        let start_drain = {
            let mut state = self.lock();
            state.queue.push_back(job);
            !std::mem::replace(&mut state.locked, true)
        };

        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.state)));
        }

        async move { rx.await.map_err(|_| Error::QueueClosed) }
    }

    /// Arm a repeating timer that submits `task` once the queue is idle
    ///
    /// On each tick, if the queue is not locked, the timer stops and `task` is
    /// scheduled exclusively. A busy queue defers to the next tick, so a slow
    /// task never overlaps its successor. The timer is not re-armed: the
    /// returned handle resolves with the task's outcome and the caller decides
    /// whether to arm again.
    pub fn run_on_interval<F, Fut, T>(&self, task: F, period: Duration) -> JoinHandle<Result<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let queue = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !queue.is_locked() {
                    return queue.schedule_exclusive(task).await;
                }
                tracing::trace!(pending = queue.pending(), "exclusive queue busy, deferring tick");
            }
        })
    }
}

impl std::fmt::Debug for ExclusiveQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ExclusiveQueue")
            .field("locked", &state.locked)
            .field("pending", &state.queue.len())
            .finish()
    }
}

async fn drain(state: Arc<Mutex<State>>) {
    loop {
        let job = {
            let mut guard = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match guard.queue.pop_front() {
                Some(job) => job,
                None => {
                    guard.locked = false;
                    return;
                }
            }
        };

        if AssertUnwindSafe(job()).catch_unwind().await.is_err() {
            tracing::error!("exclusive task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_returns_task_output() {
        let queue = ExclusiveQueue::new();
        let out = queue.schedule_exclusive(|| async { 41 + 1 }).await.unwrap();
        assert_eq!(out, 42);
        tokio::task::yield_now().await;
        assert!(!queue.is_locked());
    }

    #[tokio::test]
    async fn test_error_goes_to_caller_and_queue_continues() {
        let queue = ExclusiveQueue::new();
        let failing = queue.schedule_exclusive(|| async { Err::<(), _>("boom") });
        let next = queue.schedule_exclusive(|| async { "ok" });

        assert_eq!(failing.await.unwrap(), Err("boom"));
        assert_eq!(next.await.unwrap(), "ok");
    }

    #[tokio::test]
    #[allow(unreachable_code)]
    async fn test_panicking_task_reports_closed() {
        let queue = ExclusiveQueue::new();
        let bad = queue.schedule_exclusive::<_, _, ()>(|| async { panic!("task blew up") });
        let good = queue.schedule_exclusive(|| async { 7 });

        let bad = bad.await;
        assert!(matches!(bad, Err(Error::QueueClosed)));
        assert_eq!(good.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_fifo_without_overlap() {
        let queue = ExclusiveQueue::new();
        let active = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let futures: Vec<_> = (0..8)
            .map(|i| {
                let active = Arc::clone(&active);
                let order = Arc::clone(&order);
                queue.schedule_exclusive(move || async move {
                    assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    order.lock().unwrap().push(i);
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for f in futures {
            f.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_defers_while_locked() {
        let queue = ExclusiveQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let manual_log = Arc::clone(&log);
        let manual = queue.schedule_exclusive(move || async move {
            manual_log.lock().unwrap().push("manual-start");
            tokio::time::sleep(Duration::from_millis(250)).await;
            manual_log.lock().unwrap().push("manual-end");
        });

        let timed_log = Arc::clone(&log);
        let timed = queue.run_on_interval(
            move || async move {
                timed_log.lock().unwrap().push("timed");
            },
            Duration::from_millis(100),
        );

        manual.await.unwrap();
        timed.await.unwrap().unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["manual-start", "manual-end", "timed"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_is_one_shot() {
        let queue = ExclusiveQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        queue
            .run_on_interval(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                Duration::from_millis(10),
            )
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
