use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Why a timed push did not enqueue
#[derive(Debug, PartialEq, Eq)]
pub enum PushError<T> {
    /// The queue was closed; the value is handed back
    Closed(T),
    /// The timeout elapsed with the queue still full; the value is handed back
    Timeout(T),
}

impl<T> PushError<T> {
    /// Recover the value that could not be enqueued
    pub fn into_inner(self) -> T {
        match self {
            PushError::Closed(value) | PushError::Timeout(value) => value,
        }
    }
}

/// Why a timed pop returned no element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// The queue is closed and fully drained
    Closed,
    /// The timeout elapsed with the queue still empty
    Timeout,
}

struct Inner<T> {
    buf: VecDeque<T>,
    closed: bool,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

/// A bounded blocking FIFO with close semantics.
///
/// Producers block while the queue is full, consumers block while it is
/// empty, and `close` wakes everyone. Elements still present at close time
/// drain normally; only then do consumers see the queue as finished.
/// Cloning shares the same underlying queue.
pub struct BoundedQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` elements
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "queue capacity must be at least 1");
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner { buf: VecDeque::with_capacity(capacity), closed: false }),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
                capacity,
            }),
        }
    }

    fn enqueue(&self, inner: &mut MutexGuard<'_, Inner<T>>, value: T) {
        inner.buf.push_back(value);
        self.shared.not_empty.notify_one();
    }

    /// Block until there is space, then enqueue.
    ///
    /// Returns the value back as `Err` if the queue is closed on entry or
    /// becomes closed while waiting.
    pub fn push(&self, value: T) -> Result<(), T> {
        let mut inner = self.shared.inner.lock();
        loop {
            if inner.closed {
                return Err(value);
            }
            if inner.buf.len() < self.shared.capacity {
                self.enqueue(&mut inner, value);
                return Ok(());
            }
            self.shared.not_full.wait(&mut inner);
        }
    }

    /// As `push`, but gives up after `timeout`.
    ///
    /// The wait uses an absolute deadline, so spurious wakeups cannot
    /// extend it. Closure wins over the timeout on the final re-check.
    pub fn push_timeout(&self, value: T, timeout: Duration) -> Result<(), PushError<T>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        loop {
            if inner.closed {
                return Err(PushError::Closed(value));
            }
            if inner.buf.len() < self.shared.capacity {
                self.enqueue(&mut inner, value);
                return Ok(());
            }
            if self.shared.not_full.wait_until(&mut inner, deadline).timed_out() {
                if inner.closed {
                    return Err(PushError::Closed(value));
                }
                if inner.buf.len() < self.shared.capacity {
                    self.enqueue(&mut inner, value);
                    return Ok(());
                }
                return Err(PushError::Timeout(value));
            }
        }
    }

    /// Block until an element is available and dequeue it.
    ///
    /// Returns `None` only when the queue is closed and empty. A dequeue
    /// wakes one producer even after close, so waiters drain promptly.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some(value) = inner.buf.pop_front() {
                self.shared.not_full.notify_one();
                return Some(value);
            }
            if inner.closed {
                return None;
            }
            self.shared.not_empty.wait(&mut inner);
        }
    }

    /// As `pop`, but gives up after `timeout`.
    ///
    /// On the timed-out re-check an available element wins, then closure,
    /// then `Timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, PopError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some(value) = inner.buf.pop_front() {
                self.shared.not_full.notify_one();
                return Ok(value);
            }
            if inner.closed {
                return Err(PopError::Closed);
            }
            if self.shared.not_empty.wait_until(&mut inner, deadline).timed_out() {
                if let Some(value) = inner.buf.pop_front() {
                    self.shared.not_full.notify_one();
                    return Ok(value);
                }
                if inner.closed {
                    return Err(PopError::Closed);
                }
                return Err(PopError::Timeout);
            }
        }
    }

    /// Close the queue, waking every blocked producer and consumer. Idempotent.
    pub fn close(&self) {
        let mut inner = self.shared.inner.lock();
        if !inner.closed {
            inner.closed = true;
            self.shared.not_full.notify_all();
            self.shared.not_empty.notify_all();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.shared.inner.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.inner.lock().buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}
