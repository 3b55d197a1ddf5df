//! Per-thread mailboxes: ordered message queues with a wait signal.
//!
//! A mailbox is a FIFO queue of [`Message`] records plus a wait signal that
//! is set exactly when the queue is non-empty. Producers on any thread push
//! under the mailbox lock; the consumer blocks on the signal and re-tests
//! the queue after every wakeup, so a wakeup can never be missed and a
//! spurious wakeup can never produce a phantom message.
//!
//! Mailboxes are created lazily by the dispatcher, one per distinct thread,
//! and live until the dispatcher is dropped.

use std::collections::VecDeque;
use std::thread::ThreadId;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::message::{Message, MessageFilter};

/// Queue contents plus the wait signal they mirror.
struct MailboxState {
    /// Pending messages in enqueue order.
    queue: VecDeque<Message>,
    /// Set exactly when `queue` is non-empty.
    signaled: bool,
}

impl MailboxState {
    /// Re-derive the signal from the queue. Called after every mutation.
    fn sync_signal(&mut self) {
        self.signaled = !self.queue.is_empty();
    }

    /// Index of the first queued message passing `filter`.
    fn first_match(&self, filter: &MessageFilter) -> Option<usize> {
        self.queue.iter().position(|msg| filter.matches(msg))
    }
}

/// A per-thread FIFO message queue with a blocking receive.
pub struct Mailbox {
    /// The thread this mailbox was created for.
    owner: ThreadId,
    state: Mutex<MailboxState>,
    /// Signaled while the queue is non-empty.
    available: Condvar,
}

impl Mailbox {
    /// Create an empty mailbox owned by `owner`.
    pub fn new(owner: ThreadId) -> Self {
        Self {
            owner,
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                signaled: false,
            }),
            available: Condvar::new(),
        }
    }

    /// The thread this mailbox belongs to.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Append a message and set the wait signal.
    ///
    /// Always succeeds; the queue is bounded only by memory. Safe to call
    /// from any thread, including the owner itself.
    pub fn push(&self, msg: Message) {
        let mut state = self.state.lock();
        tracing::trace!(
            target: "switchyard_core::mailbox",
            owner = ?self.owner,
            code = msg.code,
            depth = state.queue.len() + 1,
            "message enqueued"
        );
        state.queue.push_back(msg);
        state.sync_signal();
        // Wake every waiter; each re-tests the queue under the lock, so a
        // non-matching waiter simply goes back to sleep.
        self.available.notify_all();
    }

    /// Non-blocking receive.
    ///
    /// Returns the first queued message passing `filter`, or `None` if there
    /// is none. With `remove` set the message is taken out of the queue and
    /// the wait signal is cleared once the queue empties; otherwise the
    /// message is only copied out. Non-matching messages stay queued in
    /// their original order either way.
    pub fn try_take(&self, filter: &MessageFilter, remove: bool) -> Option<Message> {
        let mut state = self.state.lock();
        let pos = state.first_match(filter)?;
        if remove {
            let msg = state.queue.remove(pos);
            state.sync_signal();
            msg
        } else {
            state.queue.get(pos).cloned()
        }
    }

    /// Blocking receive.
    ///
    /// Suspends the calling thread until a message passing `filter` is
    /// available, then removes and returns it. The queue is re-tested after
    /// every wakeup; the condvar edge alone is never trusted.
    pub fn take(&self, filter: &MessageFilter) -> Message {
        let mut state = self.state.lock();
        loop {
            if let Some(pos) = state.first_match(filter) {
                let msg = state.queue.remove(pos).unwrap();
                state.sync_signal();
                return msg;
            }
            self.available.wait(&mut state);
        }
    }

    /// Blocking receive with a deadline.
    ///
    /// Returns `None` if no matching message arrived within `timeout`.
    pub fn take_timeout(
        &self,
        filter: &MessageFilter,
        timeout: std::time::Duration,
    ) -> Option<Message> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(pos) = state.first_match(filter) {
                let msg = state.queue.remove(pos);
                state.sync_signal();
                return msg;
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                // One last test: the message may have arrived exactly as the
                // wait timed out.
                let pos = state.first_match(filter)?;
                let msg = state.queue.remove(pos);
                state.sync_signal();
                return msg;
            }
        }
    }

    /// Whether the wait signal is currently set.
    ///
    /// Holds the invariant `is_signaled() == !is_empty()` after every
    /// operation.
    pub fn is_signaled(&self) -> bool {
        self.state.lock().signaled
    }

    /// Number of pending messages.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Check the signal/queue invariant in a single critical section.
    #[cfg(test)]
    fn signal_consistent(&self) -> bool {
        let state = self.state.lock();
        state.signaled == !state.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::message::codes;

    fn mailbox() -> Mailbox {
        Mailbox::new(std::thread::current().id())
    }

    #[test]
    fn test_signal_mirrors_queue() {
        let mailbox = mailbox();
        assert!(!mailbox.is_signaled());

        mailbox.push(Message::to_thread(1, 0, 0));
        assert!(mailbox.is_signaled());

        mailbox.push(Message::to_thread(2, 0, 0));
        assert!(mailbox.is_signaled());

        mailbox.try_take(&MessageFilter::any(), true).unwrap();
        assert!(mailbox.is_signaled());

        mailbox.try_take(&MessageFilter::any(), true).unwrap();
        assert!(!mailbox.is_signaled());
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_fifo_order_single_thread() {
        let mailbox = mailbox();
        for i in 0..10 {
            mailbox.push(Message::to_thread(100, i, 0));
        }
        for i in 0..10 {
            let msg = mailbox.try_take(&MessageFilter::any(), true).unwrap();
            assert_eq!(msg.param1, i);
        }
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mailbox = mailbox();
        mailbox.push(Message::to_thread(5, 42, 0));

        let peeked = mailbox.try_take(&MessageFilter::any(), false).unwrap();
        assert_eq!(peeked.param1, 42);
        assert_eq!(mailbox.len(), 1);
        assert!(mailbox.is_signaled());

        // A peek immediately after a signaled state must succeed again.
        let taken = mailbox.try_take(&MessageFilter::any(), true).unwrap();
        assert_eq!(taken.param1, 42);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_filtered_take_leaves_others_queued() {
        let mailbox = mailbox();
        mailbox.push(Message::to_thread(10, 1, 0));
        mailbox.push(Message::to_thread(20, 2, 0));
        mailbox.push(Message::to_thread(10, 3, 0));

        let filter = MessageFilter::code_range(20, 20);
        let msg = mailbox.try_take(&filter, true).unwrap();
        assert_eq!(msg.param1, 2);

        // The non-matching messages are still there, in order.
        assert_eq!(mailbox.len(), 2);
        let first = mailbox.try_take(&MessageFilter::any(), true).unwrap();
        let second = mailbox.try_take(&MessageFilter::any(), true).unwrap();
        assert_eq!((first.param1, second.param1), (1, 3));
    }

    #[test]
    fn test_blocking_take_wakes_on_push() {
        let mailbox = Arc::new(mailbox());
        let mailbox_clone = mailbox.clone();

        let consumer = std::thread::spawn(move || {
            mailbox_clone.take(&MessageFilter::any())
        });

        // Let the consumer block before the message exists.
        std::thread::sleep(Duration::from_millis(50));
        mailbox.push(Message::to_thread(codes::TIMER, 9, 0));

        let msg = consumer.join().unwrap();
        assert_eq!(msg.code, codes::TIMER);
        assert_eq!(msg.param1, 9);
        assert!(!mailbox.is_signaled());
    }

    #[test]
    fn test_take_timeout_expires_empty() {
        let mailbox = mailbox();
        let start = Instant::now();
        let msg = mailbox.take_timeout(&MessageFilter::any(), Duration::from_millis(30));
        assert!(msg.is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_signal_invariant_under_concurrent_mutation() {
        let mailbox = Arc::new(mailbox());
        let mut handles = Vec::new();

        // Producers and a draining consumer hammer the queue; the signal
        // must mirror queue emptiness at every observation point.
        for seed in 0..3u64 {
            let mailbox = mailbox.clone();
            handles.push(std::thread::spawn(move || {
                let mut rng = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
                for i in 0..200 {
                    rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    if rng % 3 == 0 {
                        mailbox.try_take(&MessageFilter::any(), true);
                    } else {
                        mailbox.push(Message::to_thread(1, i, 0));
                    }
                    assert!(mailbox.signal_consistent());
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        // Drain whatever is left and re-check the resting state.
        while mailbox.try_take(&MessageFilter::any(), true).is_some() {}
        assert!(!mailbox.is_signaled());
        assert!(mailbox.is_empty());
    }
}
