//! Per-subscriber bounded dual-lane queue with the slow-consumer policy of
//! spec §4.3.
//!
//! `tokio::sync::mpsc` is the teacher's usual choice for a bounded queue
//! (see `other_examples` `forward_pty_output`'s `try_send` backpressure
//! loop), but its queue contents are opaque — the coalesce policy here
//! needs to scan and drop from the middle of the output lane, which an
//! `mpsc::Receiver` can't do. So this is a small hand-rolled bounded queue
//! (`Mutex<VecDeque>` + a shared `Notify`) instead, wired the same way an
//! `mpsc` channel would be: one producer side (the hub), one consumer side
//! (the connection's writer task).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::protocol::ServerFrame;

/// Result of attempting to enqueue a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The frame was queued (possibly after coalescing room for it).
    Enqueued,
    /// The lane stayed full even after coalescing; the subscriber should be
    /// evicted.
    Evict,
}

/// The two-lane outbound queue for one (connection, session) subscription.
///
/// Output frames use the coalescing drop policy; every other frame type
/// uses the priority lane and is never silently dropped.
#[derive(Debug)]
pub struct SubscriberQueues {
    output: Mutex<VecDeque<ServerFrame>>,
    priority: Mutex<VecDeque<ServerFrame>>,
    output_cap: usize,
    priority_cap: usize,
    notify: Arc<Notify>,
    closed: std::sync::atomic::AtomicBool,
}

impl SubscriberQueues {
    /// Construct queues for one subscription. `notify` is shared across
    /// every subscription a single connection holds, so its writer task can
    /// wake on a single `Notify` regardless of which session produced data.
    #[must_use]
    pub fn new(output_cap: usize, priority_cap: usize, notify: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            output: Mutex::new(VecDeque::new()),
            priority: Mutex::new(VecDeque::new()),
            output_cap,
            priority_cap,
            notify,
            closed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Enqueue an `output` frame for `session_name`, applying the
    /// space → coalesce → evict policy from spec §4.3.
    pub fn enqueue_output(&self, session_name: &str, frame: ServerFrame) -> EnqueueOutcome {
        let mut queue = self.output.lock().expect("output queue lock poisoned");
        if queue.len() < self.output_cap {
            queue.push_back(frame);
            self.notify.notify_one();
            return EnqueueOutcome::Enqueued;
        }

        let to_drop = (queue.len() / 2).max(1);
        let mut dropped = 0;
        while dropped < to_drop {
            match queue.front() {
                Some(ServerFrame::Output { session_name: sn, .. }) if sn == session_name => {
                    queue.pop_front();
                    dropped += 1;
                }
                _ => break,
            }
        }

        if queue.len() < self.output_cap {
            queue.push_back(frame);
            self.notify.notify_one();
            EnqueueOutcome::Enqueued
        } else {
            EnqueueOutcome::Evict
        }
    }

    /// Enqueue a non-output frame. Never drops silently: a full priority
    /// lane means the subscriber gets evicted instead.
    pub fn enqueue_priority(&self, frame: ServerFrame) -> EnqueueOutcome {
        let mut queue = self.priority.lock().expect("priority queue lock poisoned");
        if queue.len() < self.priority_cap {
            queue.push_back(frame);
            self.notify.notify_one();
            EnqueueOutcome::Enqueued
        } else {
            EnqueueOutcome::Evict
        }
    }

    /// Push a frame onto the priority lane regardless of capacity. Used for
    /// the single final eviction notice the hub sends a subscriber on its
    /// way out, after normal enqueueing has already failed.
    pub fn force_priority(&self, frame: ServerFrame) {
        self.priority
            .lock()
            .expect("priority queue lock poisoned")
            .push_back(frame);
        self.notify.notify_one();
    }

    /// Drain every frame ready to send, priority lane first.
    #[must_use]
    pub fn drain_ready(&self) -> Vec<ServerFrame> {
        let mut priority = self.priority.lock().expect("priority queue lock poisoned");
        let mut output = self.output.lock().expect("output queue lock poisoned");
        let mut frames: Vec<ServerFrame> = priority.drain(..).collect();
        frames.extend(output.drain(..));
        frames
    }

    /// Mark this subscription closed and wake its connection's writer so it
    /// notices on the next poll.
    pub fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Whether the hub has evicted this subscription or torn the session down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::SeqCst)
    }
}
