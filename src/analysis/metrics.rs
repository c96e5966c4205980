//! Derived metrics extracted from traces.
//!
//! Each sweep step reduces an acquisition to one scalar for the summary
//! row. Which reduction applies is per test type and chosen in the session
//! configuration.

use serde::{Deserialize, Serialize};

use crate::analysis::peaks::Peak;
use crate::trace::TraceSample;

/// Trace-derived scalar recorded per sweep step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceMetric {
    /// Frequency of the strongest detected peak, Hz.
    PeakFrequency,
    /// Parabolically refined frequency of the global maximum, Hz.
    InterpolatedPeakFrequency,
    /// Power at the strongest detected peak, dBm.
    PeakPower,
    /// Total integrated power over the trace (RIN-style), linear units.
    IntegratedPower,
}

/// Reduce a trace (and the peaks detected in it) to one scalar.
///
/// Returns `None` when the metric is undefined for this acquisition - no
/// detected peak for the peak metrics, an empty trace for the rest - in
/// which case the runner skips the step's record.
pub fn extract_metric(
    metric: TraceMetric,
    trace: &TraceSample,
    peaks: &[Peak],
) -> Option<f64> {
    match metric {
        TraceMetric::PeakFrequency => strongest(peaks).map(|p| p.x),
        TraceMetric::PeakPower => strongest(peaks).map(|p| p.y),
        TraceMetric::InterpolatedPeakFrequency => interpolated_peak_x(trace),
        TraceMetric::IntegratedPower => rin_power_integrals(trace).last().copied(),
    }
}

fn strongest(peaks: &[Peak]) -> Option<&Peak> {
    peaks
        .iter()
        .max_by(|a, b| a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
}

/// Refine the global maximum's x coordinate by fitting a parabola through
/// the peak sample and its two neighbors.
///
/// The sampled maximum alone limits precision to the bin spacing; the
/// three-point vertex recovers sub-bin accuracy as long as the peak is not
/// on the trace boundary. Degenerate (flat) fits fall back to the sampled
/// coordinate.
pub fn interpolated_peak_x(trace: &TraceSample) -> Option<f64> {
    let (idx, x2, _) = trace.argmax()?;
    let xs = trace.xs();
    let ys = trace.ys();
    if idx == 0 || idx >= ys.len() - 1 {
        return Some(x2);
    }

    let (x1, x3) = (xs[idx - 1], xs[idx + 1]);
    let (y1, y2, y3) = (ys[idx - 1], ys[idx], ys[idx + 1]);

    let denom = y1 - 2.0 * y2 + y3;
    if denom.abs() < 1e-15 {
        return Some(x2);
    }
    let delta = 0.5 * (y1 - y3) / denom;
    Some(x2 + delta * (x3 - x1) / 2.0)
}

/// Cumulative RMS power integrals over a dB trace.
///
/// Converts to linear units, then trapezoid-integrates over prefixes that
/// grow by `SEGMENT_LENGTH` samples, returning the square root of each
/// prefix integral. The final element is the whole-trace value used as the
/// `IntegratedPower` metric; the full vector supports RIN-vs-bandwidth
/// curves downstream.
pub fn rin_power_integrals(trace: &TraceSample) -> Vec<f64> {
    const SEGMENT_LENGTH: usize = 6;

    let xs = trace.xs();
    let ys = trace.ys();
    if xs.len() < 2 {
        return Vec::new();
    }

    let linear: Vec<f64> = ys
        .iter()
        .map(|&db| if db.is_finite() { 10f64.powf(db / 10.0) } else { 0.0 })
        .collect();

    let mut out = Vec::new();
    for k in 1..=xs.len() / SEGMENT_LENGTH {
        let end = k * SEGMENT_LENGTH;
        let mut integral = 0.0;
        for i in 1..end {
            let dx = xs[i] - xs[i - 1];
            integral += dx * (linear[i] + linear[i - 1]) / 2.0;
        }
        out.push(integral.sqrt());
    }
    out
}
