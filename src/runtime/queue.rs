use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

/// FIFO queue between the poller and the worker pool.
///
/// Unbounded, so `push` never waits. `pop` parks the caller until an item
/// arrives, and yields `None` once the queue is closed and drained.
/// Consumers acknowledge each item with `task_done`; `join` resolves only
/// when every pushed item has been acknowledged, not merely dequeued.
pub struct DispatchQueue<T> {
    inner: Mutex<Inner<T>>,
    consumers: Notify,
    drained: Notify,
}

struct Inner<T> {
    items: VecDeque<T>,
    unfinished: usize,
    closed: bool,
}

impl<T> DispatchQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                unfinished: 0,
                closed: false,
            }),
            consumers: Notify::new(),
            drained: Notify::new(),
        }
    }

    pub async fn push(&self, item: T) {
        let mut inner = self.inner.lock().await;
        inner.items.push_back(item);
        inner.unfinished += 1;
        drop(inner);
        self.consumers.notify_one();
    }

    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.consumers.notified();
            {
                let mut inner = self.inner.lock().await;
                if let Some(item) = inner.items.pop_front() {
                    if !inner.items.is_empty() {
                        // pass the baton to another parked consumer
                        self.consumers.notify_one();
                    }
                    return Some(item);
                }
                if inner.closed {
                    // cascade the wakeup so every parked consumer exits
                    self.consumers.notify_one();
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Acknowledge one previously popped item as fully processed.
    pub async fn task_done(&self) {
        let mut inner = self.inner.lock().await;
        debug_assert!(inner.unfinished > 0, "task_done without a matching pop");
        inner.unfinished = inner.unfinished.saturating_sub(1);
        if inner.unfinished == 0 {
            self.drained.notify_waiters();
        }
    }

    /// Wait until every item ever pushed has been acknowledged.
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            {
                let inner = self.inner.lock().await;
                if inner.unfinished == 0 {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Begin shutdown: parked consumers wake up and drain what is left.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        drop(inner);
        self.consumers.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<T> Default for DispatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
