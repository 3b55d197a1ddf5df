//! The timer service: repeating timers delivered through trampolines.
//!
//! Each timer fires on an independent schedule. A firing invokes the
//! timer's trampoline exactly once, on the service's worker thread, with no
//! service lock held; the trampoline either runs a direct callback or posts
//! a timer message through the dispatcher, exactly as an external poster
//! would. Timers run independently of all mailboxes.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use slotmap::{Key, KeyData, SlotMap, new_key_type};

use crate::error::{Result, SwitchyardError, TimerError};

new_key_type! {
    /// A unique identifier for a live timer.
    pub struct TimerId;
}

/// Convert a timer id to its raw representation, for carrying in a message
/// parameter.
pub fn timer_id_to_raw(id: TimerId) -> u64 {
    id.data().as_ffi()
}

/// Reconstruct a timer id from its raw representation.
pub fn timer_id_from_raw(raw: u64) -> TimerId {
    TimerId::from(KeyData::from_ffi(raw))
}

/// The per-firing action of a timer.
type TimerTrampoline = Arc<dyn Fn(TimerId) + Send + Sync>;

/// Internal timer data.
struct TimerData {
    /// When this timer should next fire.
    next_fire: Instant,
    /// The repeat interval.
    interval: Duration,
    /// Whether this timer is active.
    active: bool,
    /// Invoked once per firing, outside the service lock.
    trampoline: TimerTrampoline,
}

/// An entry in the timer queue (min-heap by fire time).
#[derive(Debug, Clone, Copy)]
struct TimerQueueEntry {
    id: TimerId,
    fire_time: Instant,
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other.fire_time.cmp(&self.fire_time)
    }
}

/// The timer table: all live timers plus the pending-fire queue.
struct TimerTable {
    /// All registered timers.
    timers: SlotMap<TimerId, TimerData>,
    /// Priority queue of pending fires (min-heap by fire time).
    queue: BinaryHeap<TimerQueueEntry>,
}

impl TimerTable {
    fn new() -> Self {
        Self {
            timers: SlotMap::with_key(),
            queue: BinaryHeap::new(),
        }
    }

    /// Register a repeating timer. The first firing happens no earlier than
    /// one `interval` after the call.
    fn schedule(&mut self, interval: Duration, trampoline: TimerTrampoline) -> TimerId {
        let next_fire = Instant::now() + interval;

        let id = self.timers.insert(TimerData {
            next_fire,
            interval,
            active: true,
            trampoline,
        });
        self.queue.push(TimerQueueEntry {
            id,
            fire_time: next_fire,
        });

        tracing::debug!(target: "switchyard_core::timer", ?id, ?interval, "timer scheduled");
        id
    }

    /// Stop and remove a timer.
    fn cancel(&mut self, id: TimerId) -> Result<()> {
        if let Some(timer) = self.timers.get_mut(id) {
            timer.active = false;
            self.timers.remove(id);
            tracing::debug!(target: "switchyard_core::timer", ?id, "timer cancelled");
            Ok(())
        } else {
            Err(TimerError::InvalidTimerId.into())
        }
    }

    fn is_active(&self, id: TimerId) -> bool {
        self.timers.get(id).is_some_and(|t| t.active)
    }

    fn active_count(&self) -> usize {
        self.timers.iter().filter(|(_, t)| t.active).count()
    }

    /// Duration until the next firing, if any timer is live.
    fn time_until_next(&mut self) -> Option<Duration> {
        // Clean up entries for cancelled timers from the front of the queue.
        while let Some(entry) = self.queue.peek() {
            if !self.timers.get(entry.id).is_some_and(|t| t.active) {
                self.queue.pop();
            } else {
                break;
            }
        }

        self.queue.peek().map(|entry| {
            let now = Instant::now();
            if entry.fire_time > now {
                entry.fire_time - now
            } else {
                Duration::ZERO
            }
        })
    }

    /// Pop every timer due at `now`, reschedule it, and return the
    /// trampolines to invoke once the lock is released.
    fn collect_due(&mut self, now: Instant) -> Vec<(TimerId, TimerTrampoline)> {
        let mut due = Vec::new();

        while let Some(entry) = self.queue.peek() {
            if entry.fire_time > now {
                break;
            }

            let entry = self.queue.pop().unwrap();
            let id = entry.id;

            let Some(timer) = self.timers.get_mut(id) else {
                continue;
            };
            if !timer.active {
                continue;
            }
            // Skip stale entries left behind by rescheduling.
            if entry.fire_time != timer.next_fire {
                continue;
            }

            tracing::trace!(target: "switchyard_core::timer", ?id, "timer fired");
            due.push((id, Arc::clone(&timer.trampoline)));

            // Schedule the next firing from the scheduled time, not from
            // `now`, so the cadence does not drift.
            let next_fire = entry.fire_time + timer.interval;
            timer.next_fire = next_fire;
            self.queue.push(TimerQueueEntry {
                id,
                fire_time: next_fire,
            });
        }

        due
    }
}

/// State shared between the service handle and its worker thread.
struct TimerShared {
    table: Mutex<TimerTable>,
    /// Pinged whenever the table changes or shutdown begins.
    wakeup: Condvar,
    shutdown: AtomicBool,
}

/// A process-wide registry of active repeating timers, driven by a single
/// worker thread.
///
/// Dropping the service kills every outstanding timer and joins the worker,
/// so no firing can reach torn-down state.
pub struct TimerService {
    shared: Arc<TimerShared>,
    worker: Option<JoinHandle<()>>,
}

impl TimerService {
    /// Start the timer service and its worker thread.
    pub fn new() -> Result<Self> {
        let shared = Arc::new(TimerShared {
            table: Mutex::new(TimerTable::new()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("switchyard-timers".to_owned())
            .spawn(move || Self::worker_loop(&worker_shared))
            .map_err(|e| SwitchyardError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Register a repeating timer.
    ///
    /// `trampoline` is invoked once per firing on the worker thread, with no
    /// service lock held. Each call yields a distinct id and an independent
    /// schedule; timers sharing an interval are never coalesced.
    pub fn schedule<F>(&self, interval: Duration, trampoline: F) -> TimerId
    where
        F: Fn(TimerId) + Send + Sync + 'static,
    {
        let id = self
            .shared
            .table
            .lock()
            .schedule(interval, Arc::new(trampoline));
        // The new timer may fire earlier than whatever the worker is
        // currently sleeping towards.
        self.shared.wakeup.notify_all();
        id
    }

    /// Stop and remove a timer.
    ///
    /// Returns whether a live timer with that id existed. A firing already
    /// in progress completes; only future firings are prevented.
    pub fn cancel(&self, id: TimerId) -> bool {
        let cancelled = self.shared.table.lock().cancel(id).is_ok();
        if cancelled {
            self.shared.wakeup.notify_all();
        }
        cancelled
    }

    /// Whether `id` names a live timer.
    pub fn is_active(&self, id: TimerId) -> bool {
        self.shared.table.lock().is_active(id)
    }

    /// Number of live timers.
    pub fn active_count(&self) -> usize {
        self.shared.table.lock().active_count()
    }

    fn worker_loop(shared: &TimerShared) {
        tracing::debug!(target: "switchyard_core::timer", "timer worker started");

        loop {
            let due = {
                let mut table = shared.table.lock();
                if shared.shutdown.load(AtomicOrdering::SeqCst) {
                    break;
                }

                match table.time_until_next() {
                    Some(wait) if wait > Duration::ZERO => {
                        let _ = shared.wakeup.wait_for(&mut table, wait);
                    }
                    Some(_) => {
                        // The earliest timer is already due; fire without waiting.
                    }
                    None => {
                        shared.wakeup.wait(&mut table);
                    }
                }

                if shared.shutdown.load(AtomicOrdering::SeqCst) {
                    break;
                }
                table.collect_due(Instant::now())
            };

            // Trampolines run outside the table lock, so they may call back
            // into the service (or the dispatcher) without deadlocking.
            for (id, trampoline) in due {
                (*trampoline)(id);
            }
        }

        tracing::debug!(target: "switchyard_core::timer", "timer worker stopped");
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl TimerService {
    fn shutdown(&mut self) {
        self.shared.shutdown.store(true, AtomicOrdering::SeqCst);
        {
            // Taking the table lock first closes the window where the worker
            // has checked the shutdown flag but not yet started waiting; a
            // bare notify could be lost there and the join below would hang.
            let _table = self.shared.table.lock();
            self.shared.wakeup.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        // Kill all outstanding timers so nothing lingers past teardown.
        let mut table = self.shared.table.lock();
        table.timers.clear();
        table.queue.clear();
    }
}
