//! Bounded queue limited by item count and by total estimated memory

use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

/// Returned by [`MemoryAwareQueue::push`] after [`MemoryAwareQueue::close`]
#[derive(Debug)]
pub struct QueueClosed<T>(pub T);

/// Point-in-time queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub len: usize,
    pub memory_bytes: u64,
    pub peak_len: usize,
    pub peak_memory_bytes: u64,
    /// Pushes that had to wait for room
    pub producer_waits: u64,
}

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<(T, u64)>,
    memory_bytes: u64,
    closed: bool,
    peak_len: usize,
    peak_memory_bytes: u64,
    producer_waits: u64,
}

/// A FIFO queue with two simultaneous bounds
///
/// A push waits while the queue holds `max_items` items or while adding
/// the item would take the estimated memory past `max_bytes`, whichever
/// is hit first. A single item larger than `max_bytes` still goes through
/// when the queue is otherwise empty, so it cannot wait forever. Memory
/// is released when an item is popped.
#[derive(Debug)]
pub struct MemoryAwareQueue<T> {
    inner: Mutex<Inner<T>>,
    not_full: Notify,
    not_empty: Notify,
    max_items: usize,
    max_bytes: u64,
}

impl<T> MemoryAwareQueue<T> {
    pub fn new(max_items: usize, max_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                memory_bytes: 0,
                closed: false,
                peak_len: 0,
                peak_memory_bytes: 0,
                producer_waits: 0,
            }),
            not_full: Notify::new(),
            not_empty: Notify::new(),
            max_items: max_items.max(1),
            max_bytes,
        }
    }

    /// Adds an item, waiting for room
    ///
    /// # Arguments
    ///
    /// * `item` - The value to queue
    /// * `size` - Its estimated memory footprint in bytes
    ///
    /// # Errors
    ///
    /// Hands the item back if the queue was closed.
    pub async fn push(&self, item: T, size: u64) -> Result<(), QueueClosed<T>> {
        let mut waited = false;
        loop {
            // Register before checking so a pop between the check and the
            // await still wakes us
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock().await;
                if inner.closed {
                    return Err(QueueClosed(item));
                }
                let full = inner.items.len() >= self.max_items
                    || (inner.memory_bytes.saturating_add(size) > self.max_bytes
                        && !inner.items.is_empty());
                if !full {
                    inner.items.push_back((item, size));
                    inner.memory_bytes += size;
                    inner.peak_len = inner.peak_len.max(inner.items.len());
                    inner.peak_memory_bytes = inner.peak_memory_bytes.max(inner.memory_bytes);
                    drop(inner);
                    self.not_empty.notify_waiters();
                    return Ok(());
                }
                if !waited {
                    inner.producer_waits += 1;
                    waited = true;
                    debug!(
                        len = inner.items.len(),
                        memory_bytes = inner.memory_bytes,
                        "pipeline queue full, producer waiting"
                    );
                }
            }

            notified.await;
        }
    }

    /// Removes the oldest item, waiting if the queue is empty
    ///
    /// # Returns
    ///
    /// `None` once the queue is closed and fully drained
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock().await;
                if let Some((item, size)) = inner.items.pop_front() {
                    inner.memory_bytes = inner.memory_bytes.saturating_sub(size);
                    drop(inner);
                    self.not_full.notify_waiters();
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stops accepting pushes; queued items can still be popped
    pub async fn close(&self) {
        self.inner.lock().await.closed = true;
        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();
    }

    pub async fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().await;
        QueueStats {
            len: inner.items.len(),
            memory_bytes: inner.memory_bytes,
            peak_len: inner.peak_len,
            peak_memory_bytes: inner.peak_memory_bytes,
            producer_waits: inner.producer_waits,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}
