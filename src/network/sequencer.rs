//! Admission Sequencing
//!
//! The game master can open overlapping connections: a PLAY for the
//! current match racing an INFO probe, or a START for the next match
//! arriving while a stale STOP is still in flight. The player must
//! answer exactly one message at a time and in arrival order, so every
//! connection passes through two FIFO queues before it may touch the
//! match state:
//!
//! ```text
//!   connection ──► all-queue ──► goodness test ──► good-queue ──► handler
//!                                      │
//!                                      └──► rejected (stale match id)
//! ```
//!
//! The all-queue serializes the goodness test itself, which keeps the
//! arrival order honest. A connection that passes joins the good-queue
//! *before* leaving the all-queue, so no later arrival can slip in
//! between the two queues and overtake it.
//!
//! Queue membership is a [`Slot`] guard. The transport drops a request
//! future the moment its client disconnects, which can happen while the
//! connection is still parked in a queue; the guard's `Drop` withdraws
//! the entry and hands the front over, so an abandoned connection never
//! blocks the ones behind it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

struct Waiter {
    id: u64,
    notify: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct QueueInner {
    next_id: u64,
    waiters: VecDeque<Waiter>,
}

/// A single FIFO turn queue.
///
/// `join` registers a place in line and `Slot::wait` blocks until that
/// place is at the front. The place is surrendered by dropping the
/// slot, on every path including cancellation.
pub(crate) struct WaitQueue {
    // std Mutex: every critical section is a few queue operations with
    // no await inside, and Slot::drop needs synchronous access.
    inner: Mutex<QueueInner>,
}

/// A place in line returned by [`WaitQueue::join`].
pub(crate) struct Slot {
    queue: Arc<WaitQueue>,
    id: u64,
    ready: Option<oneshot::Receiver<()>>,
}

impl WaitQueue {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueInner::default()),
        })
    }

    /// Take a place at the back of the line. The front entry holds no
    /// sender: its owner is already runnable.
    pub(crate) fn join(self: &Arc<Self>) -> Slot {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let ready = if inner.waiters.is_empty() {
            inner.waiters.push_back(Waiter { id, notify: None });
            None
        } else {
            let (notify, ready) = oneshot::channel();
            inner.waiters.push_back(Waiter {
                id,
                notify: Some(notify),
            });
            Some(ready)
        };
        Slot {
            queue: Arc::clone(self),
            id,
            ready,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Slot {
    /// Block until this place reaches the front of the line.
    pub(crate) async fn wait(&mut self) {
        if let Some(ready) = self.ready.take() {
            // The sender disappears only if the whole queue does.
            let _ = ready.await;
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        let mut inner = self.queue.lock();
        let Some(pos) = inner.waiters.iter().position(|waiter| waiter.id == self.id) else {
            return;
        };
        inner.waiters.remove(pos);
        // Leaving from the front hands the turn to the next waiter.
        // Leaving from anywhere else just shortens the line.
        if pos == 0 {
            if let Some(next) = inner.waiters.front_mut() {
                if let Some(notify) = next.notify.take() {
                    let _ = notify.send(());
                }
            }
        }
    }
}

/// The two-stage admission gate in front of the match state machine.
pub(crate) struct AdmissionSequencer {
    /// Every connection, in arrival order.
    pub(crate) all: Arc<WaitQueue>,
    /// Connections that passed the goodness test, in arrival order.
    pub(crate) good: Arc<WaitQueue>,
}

impl AdmissionSequencer {
    pub(crate) fn new() -> Self {
        Self {
            all: WaitQueue::new(),
            good: WaitQueue::new(),
        }
    }
}
