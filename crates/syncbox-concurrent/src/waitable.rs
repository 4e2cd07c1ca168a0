use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use syncbox_core::{Diagnostics, QueueConfig, QueueSnapshot, QUEUE_TYPVER};
use tracing::{debug, trace, warn};

const MIN_DRAIN_PAUSE: Duration = Duration::from_micros(100);

/// Unbounded FIFO queue whose consumers block, up to a timeout, until an item arrives.
///
/// - `push`/`emplace` never block beyond a short critical section
/// - Waiters are woken only after the producer has released the lock
/// - A woken consumer rechecks the queue; losing the race to another consumer
///   yields `None` rather than an error
///
/// The queue is not `Clone`. Share it by reference or behind an `Arc`.
pub struct WaitableQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
    adds: CachePadded<AtomicU64>,
    removes: CachePadded<AtomicU64>,
    config: QueueConfig,
}

impl<T> WaitableQueue<T> {
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            adds: CachePadded::new(AtomicU64::new(0)),
            removes: CachePadded::new(AtomicU64::new(0)),
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Append `value` to the tail and wake one waiting consumer.
    pub fn push(&self, value: T) {
        {
            let mut items = self.items.lock();
            items.push_back(value);
            self.adds.fetch_add(1, Ordering::Release);
        }
        // Must be outside the lock
        self.ready.notify_one();
    }

    /// Same as [`push`](Self::push), converting the argument first.
    #[inline]
    pub fn emplace<V: Into<T>>(&self, value: V) {
        self.push(value.into());
    }

    /// Wait up to the configured default (100 ms unless overridden) for the next item.
    #[inline]
    pub fn try_wait_item(&self) -> Option<T> {
        self.try_wait_item_for(self.config.wait_timeout())
    }

    /// Wait up to `timeout` for the next item.
    ///
    /// Returns immediately when an item is already queued. Returns `None` on
    /// timeout, or when the wake-up found the queue already emptied by another
    /// consumer; callers loop if they want to keep waiting.
    pub fn try_wait_item_for(&self, timeout: Duration) -> Option<T> {
        let mut items = self.items.lock();
        if items.is_empty() {
            if timeout.is_zero() || self.ready.wait_for(&mut items, timeout).timed_out() {
                return None;
            }
        }

        match items.pop_front() {
            Some(item) => {
                self.removes.fetch_add(1, Ordering::Release);
                Some(item)
            }
            None => {
                trace!("consumer woke to an empty queue");
                None
            }
        }
    }

    /// Pop the head without waiting.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        self.try_wait_item_for(Duration::ZERO)
    }

    /// Poll until the queue is empty, for at most the configured drain timeout.
    #[inline]
    pub fn wait_until_empty(&self) -> usize {
        self.wait_until_empty_for(self.config.drain_timeout())
    }

    /// Poll until the queue is empty or `timeout` elapses; returns the size seen on exit.
    ///
    /// The calling thread sleeps between polls with a doubling pause, so the
    /// lock stays free for producers and consumers. Producers are not stopped:
    /// a push racing the drain can keep the queue non-empty. A timeout too large
    /// to add to the current instant never expires.
    pub fn wait_until_empty_for(&self, timeout: Duration) -> usize {
        let start = Instant::now();
        // `None` when the timeout is too large to represent, e.g. `Duration::MAX`
        let deadline = start.checked_add(timeout);
        let max_pause = self.config.drain_backoff_max().max(MIN_DRAIN_PAUSE);
        let mut pause = self.config.drain_backoff_initial().clamp(MIN_DRAIN_PAUSE, max_pause);

        loop {
            let remaining = self.size();
            if remaining == 0 {
                debug!("queue drained in {:?}", start.elapsed());
                return 0;
            }

            let now = Instant::now();
            if let Some(deadline) = deadline {
                if now >= deadline {
                    warn!(
                        "queue still holds {} items after waiting {:?} for a drain",
                        remaining, timeout
                    );
                    return remaining;
                }
            }

            let pause_now = match deadline {
                Some(deadline) => pause.min(deadline.saturating_duration_since(now)),
                None => pause,
            };
            thread::sleep(pause_now);
            pause = pause.saturating_mul(2).min(max_pause);
        }
    }

    pub fn size(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Total successful pushes since creation.
    #[inline]
    pub fn add_counter(&self) -> u64 {
        self.adds.load(Ordering::Acquire)
    }

    /// Total items handed to consumers since creation.
    #[inline]
    pub fn remove_counter(&self) -> u64 {
        self.removes.load(Ordering::Acquire)
    }
}

impl<T> Default for WaitableQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for WaitableQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitableQueue")
            .field("size", &self.size())
            .field("adds", &self.add_counter())
            .field("removes", &self.remove_counter())
            .finish()
    }
}

impl<T> Diagnostics for WaitableQueue<T> {
    type Snapshot = QueueSnapshot;

    fn snapshot(&self) -> QueueSnapshot {
        let items = self.items.lock();
        QueueSnapshot {
            typver: QUEUE_TYPVER.to_string(),
            adds: self.add_counter(),
            removes: self.remove_counter(),
            size: items.len(),
        }
    }
}
