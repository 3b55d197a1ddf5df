//! The dispatcher: windows, posting, synchronous sends and timers.
//!
//! The dispatcher owns the window registry, the class-template registry, the
//! per-thread mailbox collection and the timer service, each behind its own
//! lock. It is an explicit owned value rather than a process-wide singleton;
//! typical use wraps one `Dispatcher` in an `Arc` shared by every thread.
//!
//! No collection lock is ever held while a user callback runs (`send`,
//! `dispatch`, timer trampolines), so callbacks may call back into the
//! dispatcher freely.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Result;
use crate::mailbox::Mailbox;
use crate::message::{Message, MessageFilter, Received, codes};
use crate::registry::{ClassRegistry, WindowHandle, WindowProc, WindowRegistry};
use crate::timer::{TimerId, TimerService, timer_id_to_raw};

/// Lazily created per-thread mailboxes, keyed by thread id.
///
/// Mailboxes are never removed; they live until the dispatcher is dropped.
struct MailboxMap {
    inner: Mutex<HashMap<ThreadId, Arc<Mailbox>>>,
}

impl MailboxMap {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Get the mailbox for `thread`, creating it on first use.
    ///
    /// Returns a clone of the `Arc`, so enqueue and receive never hold the
    /// map lock.
    fn get_or_create(&self, thread: ThreadId) -> Arc<Mailbox> {
        let mut map = self.inner.lock();
        Arc::clone(
            map.entry(thread)
                .or_insert_with(|| Arc::new(Mailbox::new(thread))),
        )
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// The message-queue runtime facade.
///
/// See the crate docs for the guarantees; in short: per-mailbox FIFO
/// delivery, blocking receive without missed wakeups, synchronous
/// queue-bypassing sends, and repeating timers delivered through the same
/// queues.
pub struct Dispatcher {
    windows: Arc<Mutex<WindowRegistry>>,
    classes: Mutex<ClassRegistry>,
    mailboxes: Arc<MailboxMap>,
    timers: TimerService,
}

impl Dispatcher {
    /// Create a dispatcher and start its timer worker.
    ///
    /// # Errors
    ///
    /// Fails if the timer worker thread cannot be spawned.
    pub fn new() -> Result<Self> {
        Ok(Self {
            windows: Arc::new(Mutex::new(WindowRegistry::new())),
            classes: Mutex::new(ClassRegistry::new()),
            mailboxes: Arc::new(MailboxMap::new()),
            timers: TimerService::new()?,
        })
    }

    // -------------------------------------------------------------------------
    // Window lifecycle
    // -------------------------------------------------------------------------

    /// Create a window owned by the calling thread.
    ///
    /// `proc` is the window's dispatch callback; `user_data` seeds the
    /// window's user-data slot. Ownership never transfers to another thread.
    pub fn create_window<F>(&self, proc: F, user_data: isize) -> WindowHandle
    where
        F: Fn(WindowHandle, u32, isize, isize) -> isize + Send + Sync + 'static,
    {
        self.windows
            .lock()
            .insert(thread::current().id(), Arc::new(proc), user_data)
    }

    /// Register a named class template.
    ///
    /// First registration wins; re-registering a name is a silent no-op that
    /// returns `false`.
    pub fn register_class<F>(&self, name: &str, proc: F) -> bool
    where
        F: Fn(WindowHandle, u32, isize, isize) -> isize + Send + Sync + 'static,
    {
        self.classes.lock().register(name, Arc::new(proc))
    }

    /// Create a window from a registered class template.
    ///
    /// Returns `None` if no class with that name exists.
    pub fn create_window_from_class(&self, name: &str, user_data: isize) -> Option<WindowHandle> {
        let proc: WindowProc = self.classes.lock().lookup(name)?;
        Some(
            self.windows
                .lock()
                .insert(thread::current().id(), proc, user_data),
        )
    }

    /// Destroy a window.
    ///
    /// Returns whether the handle was live. Messages already queued for the
    /// window stay in the owner's mailbox; dispatching them later is a safe
    /// no-op.
    pub fn destroy_window(&self, handle: WindowHandle) -> bool {
        self.windows.lock().remove(handle)
    }

    /// Overwrite a window's user-data slot. Returns `false` for unknown
    /// handles.
    pub fn set_window_user_data(&self, handle: WindowHandle, value: isize) -> bool {
        self.windows.lock().set_user_data(handle, value)
    }

    /// Read a window's user-data slot.
    pub fn window_user_data(&self, handle: WindowHandle) -> Option<isize> {
        self.windows.lock().user_data(handle)
    }

    /// The thread that owns `handle`, if the window still exists.
    pub fn window_owner(&self, handle: WindowHandle) -> Option<ThreadId> {
        self.windows.lock().owner_of(handle)
    }

    /// Number of live windows.
    pub fn window_count(&self) -> usize {
        self.windows.lock().len()
    }

    // -------------------------------------------------------------------------
    // Posting and receiving
    // -------------------------------------------------------------------------

    /// Post a message to a window's owning thread.
    ///
    /// Returns `false` if the handle is unknown; the message is then not
    /// delivered anywhere. Callers that ignore the result silently lose the
    /// message.
    pub fn post_message(&self, handle: WindowHandle, code: u32, param1: isize, param2: isize) -> bool {
        let owner = self.windows.lock().owner_of(handle);
        let Some(owner) = owner else {
            tracing::trace!(
                target: "switchyard_core::dispatcher",
                ?handle,
                code,
                "post to unknown window dropped"
            );
            return false;
        };
        self.mailboxes
            .get_or_create(owner)
            .push(Message::to_window(handle, code, param1, param2));
        true
    }

    /// Post a thread-directed message.
    ///
    /// The target mailbox is created lazily, so this always succeeds even
    /// for threads that have never touched the dispatcher.
    pub fn post_thread_message(&self, thread: ThreadId, code: u32, param1: isize, param2: isize) -> bool {
        self.mailboxes
            .get_or_create(thread)
            .push(Message::to_thread(code, param1, param2));
        true
    }

    /// Synchronously invoke a window's callback on the calling thread.
    ///
    /// Bypasses all mailboxes and blocks until the callback returns.
    /// Returns `0` if the handle is unknown. No dispatcher lock is held
    /// while the callback runs.
    pub fn send_message(&self, handle: WindowHandle, code: u32, param1: isize, param2: isize) -> isize {
        let proc = self.windows.lock().proc_of(handle);
        match proc {
            Some(proc) => (*proc)(handle, code, param1, param2),
            None => {
                tracing::trace!(
                    target: "switchyard_core::dispatcher",
                    ?handle,
                    code,
                    "send to unknown window ignored"
                );
                0
            }
        }
    }

    /// Block until a message passing `filter` arrives on the calling
    /// thread's mailbox.
    ///
    /// A dequeued quit message yields [`Received::Quit`]; the receiving loop
    /// is expected to stop on it. This is the only suspending operation in
    /// the crate.
    pub fn get_message(&self, filter: &MessageFilter) -> Received {
        let mailbox = self.mailboxes.get_or_create(thread::current().id());
        let msg = mailbox.take(filter);
        if msg.code == codes::QUIT {
            tracing::debug!(
                target: "switchyard_core::dispatcher",
                exit_code = msg.param1,
                "quit message received"
            );
            Received::Quit {
                exit_code: msg.param1 as i32,
            }
        } else {
            Received::Message(msg)
        }
    }

    /// Non-blocking receive on the calling thread's mailbox.
    ///
    /// `remove` controls whether a returned message is consumed or left
    /// queued.
    pub fn peek_message(&self, filter: &MessageFilter, remove: bool) -> Option<Message> {
        self.mailboxes
            .get_or_create(thread::current().id())
            .try_take(filter, remove)
    }

    /// Invoke the target window's callback with the message's fields.
    ///
    /// Runs on the calling thread with no lock held. Returns `0` when the
    /// message is thread-directed or its window no longer exists; stale
    /// messages left behind by `destroy_window` degrade to this no-op.
    pub fn dispatch_message(&self, msg: &Message) -> isize {
        let Some(handle) = msg.window else {
            return 0;
        };
        self.send_message(handle, msg.code, msg.param1, msg.param2)
    }

    /// Post the reserved quit message to the calling thread's own mailbox.
    ///
    /// Only the next `get_message` on this thread observes it; other
    /// threads' mailboxes are unaffected.
    pub fn post_quit_message(&self, exit_code: i32) {
        self.post_thread_message(
            thread::current().id(),
            codes::QUIT,
            exit_code as isize,
            0,
        );
    }

    /// Number of mailboxes created so far.
    pub fn mailbox_count(&self) -> usize {
        self.mailboxes.len()
    }

    // -------------------------------------------------------------------------
    // Timers
    // -------------------------------------------------------------------------

    /// Start a repeating timer that invokes `callback` directly on each
    /// firing.
    ///
    /// The callback runs on the timer worker's context and is not routed
    /// through any mailbox.
    pub fn set_callback_timer<F>(&self, interval: Duration, callback: F) -> TimerId
    where
        F: Fn(TimerId) + Send + Sync + 'static,
    {
        self.timers.schedule(interval, callback)
    }

    /// Start a repeating timer delivered as messages.
    ///
    /// Each firing posts `{code: codes::TIMER, param1: raw timer id}` to
    /// `window`'s owning thread, or thread-directs it to the thread that
    /// called `set_message_timer` when no window is given. The window is
    /// resolved at fire time, so destroying it degrades later firings to
    /// dropped posts.
    pub fn set_message_timer(&self, window: Option<WindowHandle>, interval: Duration) -> TimerId {
        let windows = Arc::clone(&self.windows);
        let mailboxes = Arc::clone(&self.mailboxes);
        let origin = thread::current().id();

        self.timers.schedule(interval, move |id| {
            let param1 = timer_id_to_raw(id) as isize;
            match window {
                Some(handle) => {
                    let owner = windows.lock().owner_of(handle);
                    match owner {
                        Some(owner) => {
                            mailboxes
                                .get_or_create(owner)
                                .push(Message::to_window(handle, codes::TIMER, param1, 0));
                        }
                        None => {
                            tracing::trace!(
                                target: "switchyard_core::timer",
                                ?id,
                                ?handle,
                                "timer fire for destroyed window dropped"
                            );
                        }
                    }
                }
                None => {
                    mailboxes
                        .get_or_create(origin)
                        .push(Message::to_thread(codes::TIMER, param1, 0));
                }
            }
        })
    }

    /// Stop a timer. Returns whether a live timer with that id existed.
    ///
    /// A firing already in progress completes; only future firings are
    /// prevented.
    pub fn kill_timer(&self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    /// Number of live timers.
    pub fn active_timer_count(&self) -> usize {
        self.timers.active_count()
    }
}

static_assertions::assert_impl_all!(Dispatcher: Send, Sync);
static_assertions::assert_impl_all!(Mailbox: Send, Sync);
