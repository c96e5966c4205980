//! Sweep axis definitions and setpoint sequence generation.
//!
//! A [`SweepSpec`] describes one scanned axis (temperature in °C, current in
//! mA, or frequency in Hz) as `{start, stop, step}` plus an optional fine
//! sub-range that overrides the step inside a window of interest. Iterating
//! the spec always yields a finite, deduplicated sequence that follows the
//! direction implied by `start` and `stop`, descending included.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{SweepError, SweepResult};

/// Rounding quantum for setpoint deduplication.
///
/// Setpoints closer than this are considered the same physical target.
const DEDUP_TOLERANCE: f64 = 1e-6;

/// Physical quantity scanned by one sweep axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAxis {
    /// TEC temperature, °C.
    Temperature,
    /// Drive current, mA.
    Current,
    /// Laser wavelength, nm.
    Wavelength,
}

impl std::fmt::Display for SweepAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepAxis::Temperature => write!(f, "temperature"),
            SweepAxis::Current => write!(f, "current"),
            SweepAxis::Wavelength => write!(f, "wavelength"),
        }
    }
}

/// Optional fine sub-range inside a sweep: the step is replaced by
/// `fine_step` between `center - half_width` and `center + half_width`.
///
/// The window is clamped to the outer `[start, stop]` bounds when it would
/// exceed them; clamping logs a warning but is not an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FineRange {
    pub center: f64,
    pub half_width: f64,
    pub fine_step: f64,
}

/// One scanned axis: `{start, stop, step}` with an optional fine sub-range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSpec {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
    #[serde(default)]
    pub fine: Option<FineRange>,
}

impl SweepSpec {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Self {
            start,
            stop,
            step,
            fine: None,
        }
    }

    pub fn with_fine(mut self, fine: FineRange) -> Self {
        self.fine = Some(fine);
        self
    }

    /// Semantic validation, run once at session start.
    pub fn validate(&self) -> SweepResult<()> {
        if self.step == 0.0 || !self.step.is_finite() {
            return Err(SweepError::Configuration(
                "sweep step must be finite and non-zero".into(),
            ));
        }
        if !self.start.is_finite() || !self.stop.is_finite() {
            return Err(SweepError::Configuration(
                "sweep bounds must be finite".into(),
            ));
        }
        if let Some(fine) = &self.fine {
            if fine.fine_step == 0.0 || fine.half_width < 0.0 {
                return Err(SweepError::Configuration(
                    "fine sub-range needs a non-zero step and non-negative half-width".into(),
                ));
            }
        }
        Ok(())
    }

    /// Generate the full setpoint sequence.
    ///
    /// Coarse segments use `step`; the fine window (if any) uses `fine_step`.
    /// The result is deduplicated to within 1e-6 and never overshoots `stop`
    /// by more than one step.
    pub fn setpoints(&self) -> Vec<f64> {
        let Some(fine) = self.fine else {
            return dedup(float_range(self.start, self.stop, self.step));
        };

        let (lo, hi) = if self.start > self.stop {
            (self.stop, self.start)
        } else {
            (self.start, self.stop)
        };

        // Clamp the fine window into the outer bounds.
        let mut fine_hi = round6(fine.center + fine.half_width);
        let mut fine_lo = round6(fine.center - fine.half_width);
        let (orig_hi, orig_lo) = (fine_hi, fine_lo);
        fine_hi = fine_hi.min(hi);
        fine_lo = fine_lo.max(lo);
        if fine_hi != orig_hi || fine_lo != orig_lo {
            warn!(
                requested = ?(orig_lo, orig_hi),
                effective = ?(fine_lo, fine_hi),
                "fine sub-range exceeds sweep bounds, clamped"
            );
        }

        let step = self.step.abs();
        let mut points = Vec::new();
        let descending = self.start > self.stop;

        if descending {
            if self.start > fine_hi + DEDUP_TOLERANCE {
                let mut coarse = float_range(self.start, fine_hi + step, self.step);
                if coarse.last().is_some_and(|v| close(*v, fine_hi)) {
                    coarse.pop();
                }
                points.extend(coarse);
            }
            points.extend(float_range(fine_hi, fine_lo, fine.fine_step));
            if fine_lo - step > self.stop + DEDUP_TOLERANCE {
                let mut coarse = float_range(fine_lo - step, self.stop, self.step);
                if coarse.first().is_some_and(|v| close(*v, fine_lo)) {
                    coarse.remove(0);
                }
                points.extend(coarse);
            }
        } else {
            if self.start < fine_lo - DEDUP_TOLERANCE {
                let mut coarse = float_range(self.start, fine_lo - step, self.step);
                if coarse.last().is_some_and(|v| close(*v, fine_lo)) {
                    coarse.pop();
                }
                points.extend(coarse);
            }
            points.extend(float_range(fine_lo, fine_hi, fine.fine_step));
            if fine_hi + step < self.stop - DEDUP_TOLERANCE {
                let mut coarse = float_range(fine_hi + step, self.stop, self.step);
                if coarse.first().is_some_and(|v| close(*v, fine_hi)) {
                    coarse.remove(0);
                }
                points.extend(coarse);
            }
        }

        dedup(points)
    }
}

fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < DEDUP_TOLERANCE
}

/// Inclusive float range that follows the direction implied by its bounds.
///
/// The step magnitude is used; its sign is ignored. The terminal bound is
/// included when it lands within the dedup tolerance.
fn float_range(start: f64, stop: f64, step: f64) -> Vec<f64> {
    let mag = step.abs();
    let mut out = Vec::new();
    if mag == 0.0 {
        return out;
    }
    let mut t = start;
    if start <= stop {
        while t <= stop + DEDUP_TOLERANCE {
            out.push(round6(t));
            t += mag;
        }
    } else {
        while t >= stop - DEDUP_TOLERANCE {
            out.push(round6(t));
            t -= mag;
        }
    }
    out
}

/// Order-preserving dedup to within [`DEDUP_TOLERANCE`].
fn dedup(points: Vec<f64>) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::with_capacity(points.len());
    for p in points {
        if !out.iter().any(|q| close(*q, p)) {
            out.push(p);
        }
    }
    out
}
