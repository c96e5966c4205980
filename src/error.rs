//! Custom error types for the sweep engine.
//!
//! This module defines the primary error type, `SweepError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to classify everything that can go wrong during a sweep
//! session, from a single flaky instrument readout to a dropped connection.
//!
//! ## Error Hierarchy
//!
//! `SweepError` is an enum that consolidates the failure modes of a session:
//!
//! - **`Actuation`** / **`Readout`**: transient hardware/link failures. The
//!   runner logs them and skips the current step; the sweep continues.
//! - **`Configuration`**: semantically invalid parameters (a resolution
//!   bandwidth of 0, an inverted frequency band). Fatal to the current step
//!   only; a different setpoint may configure successfully.
//! - **`AcquisitionTimeout`**: the instrument never reported operation
//!   complete. The step is skipped; no partial trace is recorded.
//! - **`ConnectionLost`**: fatal to the whole session. The runner transitions
//!   to `Failed`, cleanup runs, and no further steps are attempted.
//! - **`Cancelled`**: not really an error. The runner transitions to
//!   `Aborted`; records already appended remain valid.
//! - **`Config`** / **`Io`** / **`Storage`**: configuration-file and summary
//!   persistence failures, wrapped from their source crates via `#[from]`.
//!
//! The step/session split is encoded once, in [`SweepError::aborts_session`],
//! so every catch site maps to exactly one recovery action.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type SweepResult<T> = std::result::Result<T, SweepError>;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Actuation error: {0}")]
    Actuation(String),

    #[error("Readout error: {0}")]
    Readout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Acquisition timed out after {waited:?}")]
    AcquisitionTimeout { waited: Duration },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Cancelled by external stop request")]
    Cancelled,

    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Summary storage error: {0}")]
    Storage(String),
}

impl SweepError {
    /// Whether this error terminates the whole session.
    ///
    /// Everything else is per-step: the runner logs the error through the
    /// sink and moves to the next setpoint.
    pub fn aborts_session(&self) -> bool {
        matches!(
            self,
            SweepError::ConnectionLost(_) | SweepError::Cancelled | SweepError::Storage(_)
        )
    }

    /// Whether this is a cooperative cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SweepError::Cancelled)
    }
}

impl From<csv::Error> for SweepError {
    fn from(value: csv::Error) -> Self {
        SweepError::Storage(value.to_string())
    }
}
