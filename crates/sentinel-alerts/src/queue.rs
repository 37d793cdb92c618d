//! Bounded queue between the deduplicator and the dispatcher.
//!
//! Producers never wait: pushing into a full queue evicts the oldest pending
//! item. The consumer waits for items and sees `None` once the queue is
//! closed and drained.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// Result of [`AlertQueue::push`].
#[derive(Debug, PartialEq)]
pub enum PushOutcome<T> {
    Queued,
    /// Queued, and the returned oldest item was evicted to make room.
    DroppedOldest(T),
    /// The queue is closed; the item was not queued.
    Closed(T),
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Drop-oldest bounded queue with a single async consumer.
pub struct AlertQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T> AlertQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, item: T) -> PushOutcome<T> {
        let outcome = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return PushOutcome::Closed(item);
            }
            let evicted = if inner.items.len() >= self.capacity {
                inner.items.pop_front()
            } else {
                None
            };
            inner.items.push_back(item);
            match evicted {
                Some(old) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    PushOutcome::DroppedOldest(old)
                }
                None => PushOutcome::Queued,
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Wait for the next item. `None` once closed and empty.
    pub async fn pop(&self) -> Option<T> {
        loop {
            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            // A push between the check and here leaves a permit, so this
            // cannot miss a wakeup.
            self.notify.notified().await;
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Stop accepting items. Pending items are still handed out.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items evicted so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_drop_oldest_when_full() {
        let queue = AlertQueue::new(2);
        assert_eq!(queue.push(1), PushOutcome::Queued);
        assert_eq!(queue.push(2), PushOutcome::Queued);
        assert_eq!(queue.push(3), PushOutcome::DroppedOldest(1));

        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = AlertQueue::new(4);
        queue.push("a");
        queue.push("b");
        queue.close();

        assert_eq!(queue.push("c"), PushOutcome::Closed("c"));
        assert_eq!(queue.pop().await, Some("a"));
        assert_eq!(queue.pop().await, Some("b"));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(AlertQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(42);
        assert_eq!(consumer.await.unwrap(), Some(42));
    }
}
