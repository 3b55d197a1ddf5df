//! Core runtime for Switchyard.
//!
//! This crate reconstructs a classic synchronous-dispatch message loop from
//! primitive thread-synchronization tools, for platforms that have no native
//! windowing or message system:
//!
//! - **Dispatcher**: the facade — create windows, post, send, receive, dispatch
//! - **Mailbox**: per-thread FIFO queue with a blocking, filterable receive
//! - **Window Registry**: opaque handles bundling owner thread, callback, user data
//! - **Class Templates**: named, reusable dispatch callbacks
//! - **Timer Service**: repeating timers firing direct callbacks or queued messages
//!
//! The windows here carry no graphical behavior. The runtime only moves
//! opaque message records between threads, with three guarantees: strict
//! FIFO per recipient despite concurrent producers, blocking receive with no
//! missed wakeups, and synchronous queue-bypassing sends.
//!
//! # Message Loop Example
//!
//! ```no_run
//! use switchyard_core::{Dispatcher, MessageFilter, Received};
//!
//! fn main() -> switchyard_core::Result<()> {
//!     let dispatcher = Dispatcher::new()?;
//!
//!     let window = dispatcher.create_window(|_window, code, param1, _param2| {
//!         println!("message {code:#06x} with {param1}");
//!         0
//!     }, 0);
//!
//!     dispatcher.post_message(window, 0x0400, 7, 0);
//!
//!     loop {
//!         match dispatcher.get_message(&MessageFilter::any()) {
//!             Received::Message(msg) => {
//!                 dispatcher.dispatch_message(&msg);
//!             }
//!             Received::Quit { exit_code } => {
//!                 println!("quit with {exit_code}");
//!                 break;
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Timer Example
//!
//! ```no_run
//! use std::time::Duration;
//! use switchyard_core::{codes, Dispatcher, MessageFilter, Received};
//!
//! fn main() -> switchyard_core::Result<()> {
//!     let dispatcher = Dispatcher::new()?;
//!
//!     // Delivered to this thread's mailbox every 250ms.
//!     let timer = dispatcher.set_message_timer(None, Duration::from_millis(250));
//!
//!     if let Received::Message(msg) = dispatcher.get_message(&MessageFilter::any()) {
//!         assert_eq!(msg.code, codes::TIMER);
//!     }
//!
//!     dispatcher.kill_timer(timer);
//!     Ok(())
//! }
//! ```

mod dispatcher;
mod error;
pub mod logging;
mod mailbox;
mod message;
mod registry;
mod timer;

pub use dispatcher::Dispatcher;
pub use error::{Result, SwitchyardError, TimerError};
pub use mailbox::Mailbox;
pub use message::{Message, MessageFilter, Received, codes};
pub use registry::{ClassRegistry, WindowData, WindowHandle, WindowProc, WindowRegistry};
pub use timer::{TimerId, TimerService, timer_id_from_raw, timer_id_to_raw};
