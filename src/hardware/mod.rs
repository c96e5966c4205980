//! Hardware capability traits.
//!
//! Instead of one monolithic device trait, the sweep engine talks to two
//! narrow capabilities:
//!
//! - [`Actuator`] - a controllable physical quantity (TEC temperature, drive
//!   current, wavelength) with set/readback.
//! - [`Instrument`] - a measuring device that can be configured for a band
//!   and resolution tier, then asked for exactly one trace or one scalar.
//!
//! Concrete implementations (VISA/SCPI links, vendor automation surfaces)
//! live outside this crate; [`mock`] provides simulated devices for tests
//! and the demo binary, and [`scpi`] provides transport helpers for real
//! implementations.
//!
//! Each trait:
//! - Is async (`#[async_trait]`)
//! - Is thread-safe (`Send + Sync`)
//! - Returns [`SweepError`] so the runner can classify failures
//! - Focuses on one concern

pub mod mock;
pub mod scpi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SweepResult;
use crate::trace::{FrequencyBand, ResolutionSpec, TraceSample};

/// Scalar quantity an instrument can report directly, without a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarMetric {
    /// Optical power from a power meter, watts.
    OpticalPower,
}

impl std::fmt::Display for ScalarMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarMetric::OpticalPower => write!(f, "optical power"),
        }
    }
}

/// A controllable physical quantity with best-effort readback.
///
/// # Contract
/// - `set` sends a setpoint and returns without waiting for convergence;
///   it fails with `SweepError::Actuation` when the link is unavailable.
/// - `get` returns `None` (not an error) when the link is transiently
///   unreadable. Callers must tolerate missing readings; stabilization
///   treats them as missed polls.
///
/// There is no state machine beyond connected/disconnected; reconnection is
/// the owning collaborator's responsibility.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Axis name for logging ("temperature", "current", ...).
    fn name(&self) -> &str;

    /// Send a setpoint in the actuator's native units.
    async fn set(&self, value: f64) -> SweepResult<()>;

    /// Best-effort current readback.
    async fn get(&self) -> Option<f64>;
}

/// A measuring device with tiered resolution settings.
///
/// # Contract
/// - `configure` is idempotent and fails with `SweepError::Configuration`
///   on invalid parameters.
/// - `acquire_once` triggers exactly one acquisition and blocks until the
///   device reports operation complete or an internal timeout elapses
///   (`SweepError::AcquisitionTimeout`). No implicit retry; retries are the
///   orchestrator's business.
/// - `acquire_scalar` serves devices that report a single derived value
///   (power meters). Implementations typically try several command variants
///   in priority order and return the first finite parse, failing with
///   `SweepError::Readout` when all variants fail; see [`scpi::query_scalar`].
///
/// # Concurrency
/// One runner owns one instrument handle for a session's lifetime; no two
/// acquisitions may be in flight on the same physical connection.
#[async_trait]
pub trait Instrument: Send + Sync {
    /// Apply band and resolution settings for the next acquisition(s).
    async fn configure(&self, band: FrequencyBand, resolution: &ResolutionSpec)
        -> SweepResult<()>;

    /// Trigger one acquisition and return its trace.
    async fn acquire_once(&self) -> SweepResult<TraceSample>;

    /// Read a single derived value instead of a trace.
    async fn acquire_scalar(&self, metric: ScalarMetric) -> SweepResult<f64> {
        Err(crate::error::SweepError::Readout(format!(
            "instrument does not report {metric}"
        )))
    }

    /// Release the underlying connection. Called once during session
    /// cleanup regardless of how the sweep ended.
    async fn close(&self) -> SweepResult<()> {
        Ok(())
    }
}
