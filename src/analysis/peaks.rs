//! Statistically significant local-maximum detection on spectral traces.
//!
//! The detector estimates a global noise floor from the trace edges, then
//! walks the interior looking for samples that are local maxima within a
//! reduced guard radius and stand far enough above both the local background
//! and the noise floor. The guard-band/neighborhood scheme is tuned for
//! narrow lines on an elevated background, which is what anomalous
//! single-frequency spurs look like on a spectrum analyzer.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::trace::TraceSample;

/// A detected local maximum with its estimated background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Frequency (or wavelength) coordinate of the peak sample.
    pub x: f64,
    /// Power at the peak, dBm.
    pub y: f64,
    /// Estimated local noise floor under the peak, dBm.
    pub local_noise_floor: f64,
}

/// Detection thresholds for one scan tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PeakDetector {
    /// Minimum height above the local noise floor, dB.
    pub threshold_db: f64,
    /// Minimum height above the neighborhood average, dB.
    pub prominence_db: f64,
    /// Half-width of the exclusion band around a candidate, samples.
    pub guard_points: usize,
}

/// Relaxation applied to the prominence test, admitting narrow peaks
/// against a locally elevated background. Empirically tuned; see the
/// calibration note in DESIGN.md.
const PROMINENCE_RELAXATION: f64 = 0.8;

impl PeakDetector {
    pub fn new(threshold_db: f64, prominence_db: f64, guard_points: usize) -> Self {
        Self {
            threshold_db,
            prominence_db,
            guard_points,
        }
    }

    /// Find all significant local maxima, in ascending x order.
    ///
    /// A trace shorter than `2 * guard_points + 1` yields no peaks; that is
    /// not an error. The detector holds no state across calls.
    pub fn find(&self, trace: &TraceSample) -> Vec<Peak> {
        let xs = trace.xs();
        let ys = trace.ys();
        // A zero guard would let the local-maximum test index past the ends.
        let g = self.guard_points.max(1);
        if ys.len() < 2 * g + 1 {
            return Vec::new();
        }

        // Global noise floor: mean over the first and last 10% of samples,
        // with a floor of 10 points per edge.
        let edge = ((ys.len() as f64 * 0.1) as usize).max(10).min(ys.len());
        let edge_sum: f64 =
            ys[..edge].iter().sum::<f64>() + ys[ys.len() - edge..].iter().sum::<f64>();
        let global_noise = edge_sum / (2 * edge) as f64;

        // Narrower guard radius for the local-maximum test catches peaks
        // only a few bins wide.
        let narrow_guard = (g / 2).max(1);

        let mut peaks = Vec::new();
        for i in g..ys.len() - g {
            let y = ys[i];

            let is_local_max = (1..=narrow_guard)
                .all(|j| y > ys[i - j] && y > ys[i + j]);
            if !is_local_max {
                continue;
            }

            // Neighborhood means over windows just outside the guard radius.
            let left = &ys[i.saturating_sub(g + 2)..i];
            let right = &ys[i + 1..(i + g + 3).min(ys.len())];
            let left_mean = mean(left).unwrap_or(global_noise);
            let right_mean = mean(right).unwrap_or(global_noise);
            let local_noise = left_mean.min(right_mean).min(global_noise);

            if y - local_noise >= self.threshold_db
                && y - left_mean.max(right_mean) >= self.prominence_db * PROMINENCE_RELAXATION
            {
                debug!(freq_hz = xs[i], power_dbm = y, local_noise, "peak detected");
                peaks.push(Peak {
                    x: xs[i],
                    y,
                    local_noise_floor: local_noise,
                });
            }
        }
        peaks
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Deduplicates peaks across repeated scans of overlapping bands.
///
/// Frequencies are bucketed to the nearest `bucket_hz` (default 1 MHz): a
/// peak whose bucket has been seen before is not novel. Used during
/// continuous monitoring so the same spur is reported once per session.
#[derive(Debug)]
pub struct PeakTracker {
    bucket_hz: f64,
    seen: HashSet<i64>,
}

impl PeakTracker {
    pub fn new(bucket_hz: f64) -> Self {
        Self {
            bucket_hz,
            seen: HashSet::new(),
        }
    }

    /// Filter `peaks` down to those not seen before, recording them.
    pub fn novel(&mut self, peaks: &[Peak]) -> Vec<Peak> {
        peaks
            .iter()
            .filter(|p| self.seen.insert((p.x / self.bucket_hz).round() as i64))
            .copied()
            .collect()
    }
}

impl Default for PeakTracker {
    fn default() -> Self {
        Self::new(1.0e6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat floor with a single spike at `spike_index`.
    fn spike_trace(len: usize, floor: f64, spike_index: usize, spike: f64) -> TraceSample {
        let mut ys = vec![floor; len];
        ys[spike_index] = spike;
        let xs: Vec<f64> = (0..len).map(|i| i as f64 * 1e6).collect();
        TraceSample::new(xs, ys).unwrap()
    }

    #[test]
    fn detects_single_spike_above_thresholds() {
        let trace = spike_trace(200, -80.0, 100, -3.0);
        let detector = PeakDetector::new(5.0, 5.0, 10);
        let peaks = detector.find(&trace);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].x, 100.0e6);
        assert_eq!(peaks[0].y, -3.0);
        assert!(peaks[0].y - peaks[0].local_noise_floor >= 5.0);
    }

    #[test]
    fn detection_is_idempotent() {
        let trace = spike_trace(200, -80.0, 57, -10.0);
        let detector = PeakDetector::new(5.0, 5.0, 10);
        let first = detector.find(&trace);
        let second = detector.find(&trace);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn threshold_boundary_is_exact() {
        let floor = -80.0;
        let threshold = 5.0;
        let prominence = 5.0;
        // Exactly threshold above the floor: on a flat floor the edge mean,
        // neighborhood means and local noise all equal the floor, and the
        // prominence margin equals the threshold margin.
        let at = spike_trace(200, floor, 100, floor + threshold);
        let just_below = spike_trace(200, floor, 100, floor + threshold - 0.01);

        // prominence * 0.8 = 4.0 <= 5.0, so the threshold test is binding.
        let detector = PeakDetector::new(threshold, prominence, 10);
        assert_eq!(detector.find(&at).len(), 1);
        assert_eq!(detector.find(&just_below).len(), 0);
    }

    #[test]
    fn short_trace_yields_no_peaks() {
        let trace = spike_trace(15, -80.0, 7, 0.0);
        let detector = PeakDetector::new(1.0, 1.0, 10);
        assert!(detector.find(&trace).is_empty());
    }

    #[test]
    fn plateau_is_not_a_local_maximum() {
        let mut ys = vec![-80.0; 100];
        // Two equal samples: neither is strictly greater than the other.
        ys[50] = -3.0;
        ys[51] = -3.0;
        let xs: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let trace = TraceSample::new(xs, ys).unwrap();
        let detector = PeakDetector::new(5.0, 5.0, 4);
        assert!(detector.find(&trace).is_empty());
    }

    #[test]
    fn peaks_come_out_in_ascending_x_order() {
        let mut ys = vec![-80.0; 300];
        ys[60] = -5.0;
        ys[200] = -2.0;
        let xs: Vec<f64> = (0..300).map(|i| i as f64 * 1e6).collect();
        let trace = TraceSample::new(xs, ys).unwrap();
        let peaks = PeakDetector::new(5.0, 5.0, 10).find(&trace);
        assert_eq!(peaks.len(), 2);
        assert!(peaks[0].x < peaks[1].x);
    }

    #[test]
    fn tracker_buckets_nearby_frequencies() {
        let mut tracker = PeakTracker::default();
        let first = Peak {
            x: 80.0e6,
            y: -3.0,
            local_noise_floor: -80.0,
        };
        // 0.3 MHz away: same 1 MHz bucket.
        let nearby = Peak {
            x: 80.3e6,
            y: -4.0,
            local_noise_floor: -80.0,
        };
        let far = Peak {
            x: 95.0e6,
            y: -6.0,
            local_noise_floor: -80.0,
        };
        assert_eq!(tracker.novel(&[first]).len(), 1);
        assert_eq!(tracker.novel(&[nearby]).len(), 0);
        assert_eq!(tracker.novel(&[far]).len(), 1);
    }
}
