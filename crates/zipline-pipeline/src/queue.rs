//! FIFO queues terminated by a single end marker.
//!
//! # Design
//! - One implementation backs the file, directory and transfer queues.
//! - Producers suspend on a capacity signal instead of polling; consumers
//!   suspend until an item or the end marker arrives.
//! - `close` inserts the end marker exactly once and ignores capacity, so a
//!   full queue can always be terminated.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Reason an item was not accepted.
#[derive(Debug)]
pub enum Offer<T> {
    /// The queue is at capacity; retry later.
    Full(T),
    /// The end marker has been inserted; the item will never be accepted.
    Closed(T),
}

impl<T> Offer<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }
}

/// Result of a non-blocking take.
#[derive(Debug, PartialEq, Eq)]
pub enum Polled<T> {
    /// Next item in FIFO order.
    Item(T),
    /// Nothing queued yet.
    Empty,
    /// The end marker was reached.
    End,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
    high_water: usize,
}

/// Bounded or unbounded FIFO with an end marker.
pub struct SentinelQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: Option<usize>,
    readable: Notify,
    writable: Notify,
}

impl<T> SentinelQueue<T> {
    /// Queue holding at most `capacity` items (minimum one).
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    /// Queue without a capacity limit.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
                high_water: 0,
            }),
            capacity,
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue without waiting.
    ///
    /// # Errors
    ///
    /// Hands the item back as [`Offer::Full`] or [`Offer::Closed`].
    pub fn try_offer(&self, item: T) -> Result<(), Offer<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(Offer::Closed(item));
        }
        if self.capacity.is_some_and(|capacity| state.items.len() >= capacity) {
            return Err(Offer::Full(item));
        }
        state.items.push_back(item);
        state.high_water = state.high_water.max(state.items.len());
        drop(state);
        self.readable.notify_one();
        Ok(())
    }

    /// Enqueue, suspending while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns the item when the queue closes or `cancel` fires first.
    pub async fn push(&self, item: T, cancel: &CancellationToken) -> Result<(), T> {
        let mut pending = item;
        loop {
            let writable = self.writable.notified();
            tokio::pin!(writable);
            writable.as_mut().enable();

            match self.try_offer(pending) {
                Ok(()) => return Ok(()),
                Err(Offer::Closed(item)) => return Err(item),
                Err(Offer::Full(item)) => pending = item,
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(pending),
                () = writable => {}
            }
        }
    }

    /// Dequeue without waiting.
    pub fn try_recv(&self) -> Polled<T> {
        let mut state = self.lock();
        if let Some(item) = state.items.pop_front() {
            drop(state);
            self.writable.notify_one();
            return Polled::Item(item);
        }
        if state.closed {
            Polled::End
        } else {
            Polled::Empty
        }
    }

    /// Dequeue, suspending until an item arrives. `None` marks the end.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let readable = self.readable.notified();
            tokio::pin!(readable);
            readable.as_mut().enable();

            match self.try_recv() {
                Polled::Item(item) => return Some(item),
                Polled::End => return None,
                Polled::Empty => readable.await,
            }
        }
    }

    /// Insert the end marker. Returns `true` only for the call that inserted it.
    pub fn close(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        drop(state);
        self.readable.notify_waiters();
        self.writable.notify_waiters();
        true
    }

    /// Remove every queued item, leaving the end marker state untouched.
    ///
    /// Items are returned so the caller drops them outside the queue lock.
    pub fn drain(&self) -> Vec<T> {
        let drained: Vec<T> = self.lock().items.drain(..).collect();
        self.writable.notify_waiters();
        drained
    }

    /// Whether the end marker has been inserted.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether no items are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest number of items ever held at once.
    pub fn high_water(&self) -> usize {
        self.lock().high_water
    }

    /// Configured capacity, `None` when unbounded.
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn fifo_order_and_end_marker() {
        let queue = SentinelQueue::unbounded();
        assert!(queue.try_offer(1).is_ok());
        assert!(queue.try_offer(2).is_ok());
        assert!(queue.close());
        assert!(!queue.close());
        assert!(matches!(queue.try_offer(3), Err(Offer::Closed(3))));
        assert_eq!(queue.try_recv(), Polled::Item(1));
        assert_eq!(queue.try_recv(), Polled::Item(2));
        assert_eq!(queue.try_recv(), Polled::End);
        assert_eq!(queue.try_recv(), Polled::End);
    }

    #[test]
    fn bounded_queue_rejects_when_full_but_still_closes() {
        let queue = SentinelQueue::bounded(2);
        assert!(queue.try_offer('a').is_ok());
        assert!(queue.try_offer('b').is_ok());
        assert!(matches!(queue.try_offer('c'), Err(Offer::Full('c'))));
        assert!(queue.close());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.high_water(), 2);
        assert_eq!(queue.capacity(), Some(2));
    }

    #[tokio::test]
    async fn push_suspends_until_space_is_available() {
        let queue = Arc::new(SentinelQueue::bounded(1));
        let cancel = CancellationToken::new();
        assert!(queue.push(1_u32, &cancel).await.is_ok());

        let producer = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.push(2, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.recv().await, Some(1));
        assert!(matches!(producer.await, Ok(Ok(()))));
        assert_eq!(queue.recv().await, Some(2));
        assert_eq!(queue.high_water(), 1);
    }

    #[tokio::test]
    async fn push_returns_item_on_cancel_or_close() {
        let queue = Arc::new(SentinelQueue::bounded(1));
        let cancel = CancellationToken::new();
        assert!(queue.push("first", &cancel).await.is_ok());

        let producer = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.push("second", &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert!(matches!(producer.await, Ok(Err("second"))));

        let fresh = CancellationToken::new();
        assert!(queue.close());
        assert!(matches!(queue.push("third", &fresh).await, Err("third")));
    }

    #[tokio::test]
    async fn recv_wakes_on_close() {
        let queue: Arc<SentinelQueue<u8>> = Arc::new(SentinelQueue::bounded(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(queue.close());
        assert!(matches!(
            tokio::time::timeout(Duration::from_secs(1), consumer).await,
            Ok(Ok(None))
        ));
    }

    #[test]
    fn drain_keeps_end_marker_state() {
        let queue = SentinelQueue::bounded(3);
        assert!(queue.try_offer(1).is_ok());
        assert!(queue.try_offer(2).is_ok());
        assert!(queue.close());
        assert_eq!(queue.drain(), vec![1, 2]);
        assert!(queue.is_empty());
        assert!(queue.is_closed());
        assert_eq!(queue.try_recv(), Polled::End);
    }
}
