//! Setpoint stabilization: wait until an actuator's readback converges.
//!
//! After a setpoint change the physical quantity (TEC temperature, drive
//! current, emitted wavelength) takes seconds to settle. [`wait_for`] sleeps
//! a settle delay once, then polls the actuator readback until it lands
//! within tolerance of the target or the wait budget runs out. A timeout is
//! deliberately non-fatal: real sweeps continue with best-effort settling
//! rather than discarding hours of measurement over one slow step.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{SweepError, SweepResult};
use crate::hardware::Actuator;

/// Convergence parameters for one actuator.
///
/// Invariant: `max_wait >= poll_interval > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilizationPolicy {
    /// Acceptable |readback - target| in the actuator's native units.
    pub tolerance: f64,
    /// Total polling budget after the settle delay.
    #[serde(with = "humantime_serde")]
    pub max_wait: Duration,
    /// Time between readback polls.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Fixed wait applied once before polling begins, letting the setpoint
    /// change start taking physical effect.
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
}

impl StabilizationPolicy {
    pub fn validate(&self) -> SweepResult<()> {
        if self.poll_interval.is_zero() {
            return Err(SweepError::Configuration(
                "stabilization poll interval must be > 0".into(),
            ));
        }
        if self.max_wait < self.poll_interval {
            return Err(SweepError::Configuration(format!(
                "stabilization max_wait ({:?}) must be >= poll_interval ({:?})",
                self.max_wait, self.poll_interval
            )));
        }
        if !(self.tolerance > 0.0) {
            return Err(SweepError::Configuration(
                "stabilization tolerance must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// How a stabilization wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// Readback converged to within tolerance.
    Stabilized { readback: f64, waited: Duration },
    /// The wait budget elapsed without convergence. Non-fatal.
    TimedOut {
        last_readback: Option<f64>,
        waited: Duration,
    },
    /// The session stop flag was raised mid-wait.
    Cancelled,
}

impl WaitOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WaitOutcome::Cancelled)
    }
}

/// Poll `actuator` until its readback is within `policy.tolerance` of
/// `target`, up to `policy.max_wait`.
///
/// A `None` readback is a no-op poll (flaky telemetry, not a failure): sleep
/// and retry. If the actuator never produces a reading the call degrades to
/// a fixed delay of `settle_delay + max_wait` and reports `TimedOut`.
/// The cancellation token is checked on every poll.
pub async fn wait_for(
    actuator: &dyn Actuator,
    target: f64,
    policy: &StabilizationPolicy,
    cancel: &CancelToken,
) -> WaitOutcome {
    let started = Instant::now();

    if !interruptible_sleep(policy.settle_delay, policy.poll_interval, cancel).await {
        return WaitOutcome::Cancelled;
    }

    let poll_start = Instant::now();
    let mut last_readback = None;
    loop {
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        if poll_start.elapsed() >= policy.max_wait {
            break;
        }

        match actuator.get().await {
            Some(readback) => {
                last_readback = Some(readback);
                let delta = (readback - target).abs();
                if delta <= policy.tolerance {
                    let waited = started.elapsed();
                    info!(
                        actuator = actuator.name(),
                        readback,
                        target,
                        ?waited,
                        "setpoint stabilized"
                    );
                    return WaitOutcome::Stabilized { readback, waited };
                }
                debug!(
                    actuator = actuator.name(),
                    readback, target, delta, "waiting for convergence"
                );
            }
            None => {
                // Transiently unreadable link. Treat as a missed poll.
                debug!(actuator = actuator.name(), "readback unavailable, retrying");
            }
        }

        sleep(policy.poll_interval).await;
    }

    let waited = started.elapsed();
    warn!(
        actuator = actuator.name(),
        target,
        ?waited,
        ?last_readback,
        "stabilization timed out, proceeding with best-effort settling"
    );
    WaitOutcome::TimedOut {
        last_readback,
        waited,
    }
}

/// Sleep `total`, waking every `interval` to honor cancellation.
///
/// Returns false if cancelled before the sleep completed.
async fn interruptible_sleep(total: Duration, interval: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        sleep((deadline - now).min(interval)).await;
    }
}
