//! Error types for Switchyard.
//!
//! Most recoverable conditions in this crate (unknown window handle, unknown
//! thread, duplicate class registration) are reported through boolean or
//! `Option` results, never through errors. The types here cover the few
//! operations that can genuinely fail: spawning the timer worker thread and
//! the internal `Result`-flavored timer table operations.

use std::fmt;

/// The main error type for Switchyard operations.
#[derive(Debug)]
pub enum SwitchyardError {
    /// Timer-related error.
    Timer(TimerError),
    /// The timer worker thread could not be spawned.
    WorkerSpawn(String),
}

impl fmt::Display for SwitchyardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timer(err) => write!(f, "Timer error: {err}"),
            Self::WorkerSpawn(msg) => {
                write!(f, "Failed to spawn timer worker thread: {msg}")
            }
        }
    }
}

impl std::error::Error for SwitchyardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Timer(err) => Some(err),
            Self::WorkerSpawn(_) => None,
        }
    }
}

/// Timer-specific errors.
#[derive(Debug)]
pub enum TimerError {
    /// The timer id is invalid or has already been cancelled.
    InvalidTimerId,
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimerId => write!(f, "Invalid or cancelled timer id"),
        }
    }
}

impl std::error::Error for TimerError {}

impl From<TimerError> for SwitchyardError {
    fn from(err: TimerError) -> Self {
        Self::Timer(err)
    }
}

/// A specialized Result type for Switchyard operations.
pub type Result<T> = std::result::Result<T, SwitchyardError>;
