//! Window and class-template registries.
//!
//! A window here is not a graphical surface: it is an opaque handle bundling
//! an owning thread, a dispatch callback and one slot of user data. Handles
//! come from a versioned slot map, so a handle is never observably reused
//! after the window is destroyed.
//!
//! The registries carry no interior locking; the dispatcher wraps each in a
//! single mutex covering all of its mutating operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;

use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// An opaque, process-unique identifier for a window.
    pub struct WindowHandle;
}

/// A window's dispatch callback.
///
/// Invoked with the window handle, the message code and both parameters;
/// returns the dispatch result. The same capability type backs directly
/// created windows, class templates and synchronous sends.
pub type WindowProc = Arc<dyn Fn(WindowHandle, u32, isize, isize) -> isize + Send + Sync>;

/// Internal per-window data.
pub struct WindowData {
    /// The thread that created the window. Ownership never transfers.
    pub owner: ThreadId,
    /// The dispatch callback.
    pub proc: WindowProc,
    /// Opaque user data, mutable through `set_user_data`.
    pub user_data: isize,
}

/// Maps window handles to their owning thread, callback and user data.
#[derive(Default)]
pub struct WindowRegistry {
    windows: SlotMap<WindowHandle, WindowData>,
}

impl WindowRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            windows: SlotMap::with_key(),
        }
    }

    /// Record a new window owned by `owner` and return its handle.
    pub fn insert(&mut self, owner: ThreadId, proc: WindowProc, user_data: isize) -> WindowHandle {
        let handle = self.windows.insert(WindowData {
            owner,
            proc,
            user_data,
        });
        tracing::debug!(
            target: "switchyard_core::registry",
            ?handle,
            ?owner,
            "window created"
        );
        handle
    }

    /// Remove a window record.
    ///
    /// Returns whether a record was present. Messages already queued for the
    /// handle are left in the owner's mailbox; dispatching them later is a
    /// no-op.
    pub fn remove(&mut self, handle: WindowHandle) -> bool {
        let removed = self.windows.remove(handle).is_some();
        if removed {
            tracing::debug!(target: "switchyard_core::registry", ?handle, "window destroyed");
        }
        removed
    }

    /// Look up a window record.
    pub fn get(&self, handle: WindowHandle) -> Option<&WindowData> {
        self.windows.get(handle)
    }

    /// The thread that owns `handle`, if the window still exists.
    pub fn owner_of(&self, handle: WindowHandle) -> Option<ThreadId> {
        self.windows.get(handle).map(|data| data.owner)
    }

    /// Clone the dispatch callback of `handle`, if the window still exists.
    pub fn proc_of(&self, handle: WindowHandle) -> Option<WindowProc> {
        self.windows.get(handle).map(|data| Arc::clone(&data.proc))
    }

    /// Overwrite the user-data slot. Returns `false` for unknown handles.
    pub fn set_user_data(&mut self, handle: WindowHandle, value: isize) -> bool {
        match self.windows.get_mut(handle) {
            Some(data) => {
                data.user_data = value;
                true
            }
            None => false,
        }
    }

    /// Read the user-data slot.
    pub fn user_data(&self, handle: WindowHandle) -> Option<isize> {
        self.windows.get(handle).map(|data| data.user_data)
    }

    /// Whether `handle` names a live window.
    pub fn contains(&self, handle: WindowHandle) -> bool {
        self.windows.contains_key(handle)
    }

    /// Number of live windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no windows are registered.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Named, reusable dispatch-callback templates.
///
/// Registering a class stores its callback under a unique name; windows can
/// then be created from the class without repeating the callback at each
/// creation site.
#[derive(Default)]
pub struct ClassRegistry {
    classes: HashMap<String, WindowProc>,
}

impl ClassRegistry {
    /// Create an empty class registry.
    pub fn new() -> Self {
        Self {
            classes: HashMap::new(),
        }
    }

    /// Register a class template under `name`.
    ///
    /// Registration is first-wins: a second registration of the same name is
    /// a silent no-op that returns `false` and leaves the original callback
    /// in place.
    pub fn register(&mut self, name: &str, proc: WindowProc) -> bool {
        if self.classes.contains_key(name) {
            tracing::debug!(
                target: "switchyard_core::registry",
                name,
                "duplicate class registration ignored"
            );
            return false;
        }
        self.classes.insert(name.to_owned(), proc);
        tracing::debug!(target: "switchyard_core::registry", name, "class registered");
        true
    }

    /// Clone the callback registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<WindowProc> {
        self.classes.get(name).cloned()
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether no classes are registered.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
