//! Logging facilities for Switchyard.
//!
//! Switchyard uses the `tracing` crate for instrumentation. To see logs,
//! install a tracing subscriber in your application:
//!
//! ```ignore
//! use tracing_subscriber;
//!
//! fn main() {
//!     // Initialize tracing (you can customize this)
//!     tracing_subscriber::fmt::init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! Message and timer flow is logged at `trace` level, lifecycle events
//! (window creation, class registration, quit) at `debug` level.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core runtime target.
    pub const CORE: &str = "switchyard_core";
    /// Dispatcher facade target.
    pub const DISPATCHER: &str = "switchyard_core::dispatcher";
    /// Mailbox enqueue/receive target.
    pub const MAILBOX: &str = "switchyard_core::mailbox";
    /// Window and class registry target.
    pub const REGISTRY: &str = "switchyard_core::registry";
    /// Timer service target.
    pub const TIMER: &str = "switchyard_core::timer";
}
