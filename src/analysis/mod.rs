//! Trace analysis: peak detection and derived metrics.

pub mod metrics;
pub mod peaks;

pub use metrics::{extract_metric, interpolated_peak_x, rin_power_integrals, TraceMetric};
pub use peaks::{Peak, PeakDetector, PeakTracker};
