use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use utoipa::ToSchema;

use crate::errors::{FeedError, FeedResult};

/// Statistics for a blocking queue
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueueStats {
    pub current_size: usize,
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub closed: bool,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Unbounded FIFO shared between producer and consumer threads
///
/// Features:
/// - Blocking `pop` parked on a condition variable (no busy-waiting)
/// - Non-blocking `try_pop` and bounded `pop_timeout`
/// - Explicit teardown via `close`, which wakes every blocked popper
/// - Lifetime enqueue/dequeue counters for monitoring
///
/// All reads and mutations are serialized under one mutex, so `len` is always
/// consistent with the stored elements. Values are moved in and out.
pub struct BlockingQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    total_enqueued: AtomicU64,
    total_dequeued: AtomicU64,
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            total_enqueued: AtomicU64::new(0),
            total_dequeued: AtomicU64::new(0),
        }
    }

    /// Append an item to the tail and wake one waiting popper
    pub fn push(&self, item: T) {
        {
            let mut state = self.state.lock();
            state.items.push_back(item);
        }
        self.total_enqueued.fetch_add(1, Ordering::Relaxed);
        self.not_empty.notify_one();
    }

    /// Remove the head, blocking until an item is available
    ///
    /// Returns `None` only once the queue has been closed and fully drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        // Predicate re-checked after every wake-up (spurious wake-ups are possible)
        while state.items.is_empty() && !state.closed {
            self.not_empty.wait(&mut state);
        }
        let item = state.items.pop_front();
        drop(state);

        if item.is_some() {
            self.total_dequeued.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Remove the head, waiting at most `timeout` for one to arrive
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        while state.items.is_empty() && !state.closed {
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        let item = state.items.pop_front();
        drop(state);

        if item.is_some() {
            self.total_dequeued.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Remove the head if one is present, without blocking
    pub fn try_pop(&self) -> Option<T> {
        let item = self.state.lock().items.pop_front();
        if item.is_some() {
            self.total_dequeued.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Drop every buffered item
    pub fn clear(&self) {
        self.state.lock().items.clear();
    }

    /// Remove and return every buffered item in FIFO order
    pub fn drain_all(&self) -> Vec<T> {
        let drained: Vec<T> = self.state.lock().items.drain(..).collect();
        self.total_dequeued
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        drained
    }

    /// Tear the queue down: blocked and future `pop` calls return once it is drained
    ///
    /// Pushes are still accepted after close so late producers never fail.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            current_size: state.items.len(),
            total_enqueued: self.total_enqueued.load(Ordering::Relaxed),
            total_dequeued: self.total_dequeued.load(Ordering::Relaxed),
            closed: state.closed,
        }
    }
}

impl<T: Clone> BlockingQueue<T> {
    /// Copy of the head without removing it
    pub fn peek(&self) -> FeedResult<T> {
        self.state
            .lock()
            .items
            .front()
            .cloned()
            .ok_or(FeedError::EmptyQueue)
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
