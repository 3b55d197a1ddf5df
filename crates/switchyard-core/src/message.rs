//! Message records, reserved message codes and receive filters.

use std::time::Instant;

use crate::registry::WindowHandle;

/// Reserved message codes.
///
/// Codes outside this module are free for application use. Timer messages
/// carry the raw timer id in `param1`; quit messages carry the exit code in
/// `param1`.
pub mod codes {
    /// Posted to the sender's own mailbox by `post_quit_message`.
    pub const QUIT: u32 = 0x0012;
    /// Posted on each firing of a message-mode timer.
    pub const TIMER: u32 = 0x0113;
}

/// A message record flowing through a mailbox.
///
/// Messages are immutable once created and copied by value through the
/// queue. `window` is `None` for thread-directed messages.
#[derive(Debug, Clone)]
pub struct Message {
    /// The target window, if this message is addressed to one.
    pub window: Option<WindowHandle>,
    /// The message code.
    pub code: u32,
    /// First message parameter.
    pub param1: isize,
    /// Second message parameter.
    pub param2: isize,
    /// When this message was enqueued.
    pub posted_at: Instant,
}

impl Message {
    /// Create a message addressed to a window.
    pub fn to_window(window: WindowHandle, code: u32, param1: isize, param2: isize) -> Self {
        Self {
            window: Some(window),
            code,
            param1,
            param2,
            posted_at: Instant::now(),
        }
    }

    /// Create a thread-directed message (no target window).
    pub fn to_thread(code: u32, param1: isize, param2: isize) -> Self {
        Self {
            window: None,
            code,
            param1,
            param2,
            posted_at: Instant::now(),
        }
    }
}

/// A receive filter for `get_message`/`peek_message`.
///
/// The code range `(0, 0)` matches every code. A `window` of `None` matches
/// both thread-directed and window-directed messages; `Some(handle)` matches
/// only messages addressed to that window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFilter {
    /// Restrict matching to messages addressed to this window.
    pub window: Option<WindowHandle>,
    /// Lower bound of the matched code range (inclusive).
    pub min_code: u32,
    /// Upper bound of the matched code range (inclusive).
    pub max_code: u32,
}

impl MessageFilter {
    /// A filter that matches every message.
    pub fn any() -> Self {
        Self {
            window: None,
            min_code: 0,
            max_code: 0,
        }
    }

    /// A filter that matches codes in `[min_code, max_code]`.
    pub fn code_range(min_code: u32, max_code: u32) -> Self {
        Self {
            window: None,
            min_code,
            max_code,
        }
    }

    /// A filter that matches only messages addressed to `window`.
    pub fn for_window(window: WindowHandle) -> Self {
        Self {
            window: Some(window),
            min_code: 0,
            max_code: 0,
        }
    }

    /// Check whether `msg` passes this filter.
    pub fn matches(&self, msg: &Message) -> bool {
        if let Some(window) = self.window {
            if msg.window != Some(window) {
                return false;
            }
        }
        // The (0, 0) range matches everything.
        if self.min_code == 0 && self.max_code == 0 {
            return true;
        }
        (self.min_code..=self.max_code).contains(&msg.code)
    }
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self::any()
    }
}

/// The outcome of a blocking receive.
#[derive(Debug, Clone)]
pub enum Received {
    /// An ordinary message was dequeued.
    Message(Message),
    /// A quit message was dequeued; the receiving loop should stop.
    Quit {
        /// The exit code supplied to `post_quit_message`.
        exit_code: i32,
    },
}

impl Received {
    /// Returns `true` if this is the quit result.
    pub fn is_quit(&self) -> bool {
        matches!(self, Self::Quit { .. })
    }

    /// Unwrap the message, if this is not the quit result.
    pub fn into_message(self) -> Option<Message> {
        match self {
            Self::Message(msg) => Some(msg),
            Self::Quit { .. } => None,
        }
    }
}
