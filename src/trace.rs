//! Acquisition geometry and trace data types.
//!
//! [`FrequencyBand`] and [`ResolutionSpec`] describe what a single
//! acquisition should look at and how hard it should look;
//! [`TraceSample`] is the immutable result of one acquisition.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{SweepError, SweepResult};

/// Frequency window of a single acquisition, Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub start_hz: f64,
    pub stop_hz: f64,
}

impl FrequencyBand {
    pub fn new(start_hz: f64, stop_hz: f64) -> Self {
        Self { start_hz, stop_hz }
    }

    /// Band of `span_hz` centered on `center_hz`.
    pub fn centered(center_hz: f64, span_hz: f64) -> Self {
        Self {
            start_hz: center_hz - span_hz / 2.0,
            stop_hz: center_hz + span_hz / 2.0,
        }
    }

    pub fn center_hz(&self) -> f64 {
        (self.start_hz + self.stop_hz) / 2.0
    }

    pub fn span_hz(&self) -> f64 {
        self.stop_hz - self.start_hz
    }

    pub fn validate(&self) -> SweepResult<()> {
        if !self.start_hz.is_finite() || !self.stop_hz.is_finite() {
            return Err(SweepError::Configuration(
                "frequency band bounds must be finite".into(),
            ));
        }
        if self.stop_hz <= self.start_hz {
            return Err(SweepError::Configuration(format!(
                "frequency band stop ({}) must exceed start ({})",
                self.stop_hz, self.start_hz
            )));
        }
        Ok(())
    }
}

/// Trace accumulation mode for an acquisition.
///
/// Max-hold retains the maximum seen per sample position across sweeps and
/// is used during coarse passes to catch transients; clear-write shows only
/// the current sweep and is used for fine passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceMode {
    ClearWrite,
    MaxHold,
}

impl Default for TraceMode {
    fn default() -> Self {
        TraceMode::ClearWrite
    }
}

/// Resolution settings for one acquisition tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionSpec {
    /// Resolution bandwidth, Hz. Must be positive.
    pub rbw_hz: f64,
    /// Video bandwidth, Hz. `None` leaves the instrument's coupling alone.
    #[serde(default)]
    pub vbw_hz: Option<f64>,
    /// Trace averaging count. 1 disables averaging.
    #[serde(default = "default_average_count")]
    pub average_count: u32,
    #[serde(default)]
    pub trace_mode: TraceMode,
    /// Requested sweep time; `None` lets the instrument pick.
    #[serde(default, with = "humantime_serde::option")]
    pub sweep_time: Option<Duration>,
}

fn default_average_count() -> u32 {
    1
}

impl ResolutionSpec {
    pub fn validate(&self) -> SweepResult<()> {
        if !(self.rbw_hz > 0.0) {
            return Err(SweepError::Configuration(format!(
                "resolution bandwidth must be > 0, got {}",
                self.rbw_hz
            )));
        }
        if let Some(vbw) = self.vbw_hz {
            if !(vbw > 0.0) {
                return Err(SweepError::Configuration(format!(
                    "video bandwidth must be > 0, got {vbw}"
                )));
            }
        }
        if self.average_count == 0 {
            return Err(SweepError::Configuration(
                "average count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Immutable result of one single acquisition: `(frequency, power)` pairs
/// with uniformly spaced frequencies.
///
/// Cloning is cheap; the sample data is shared.
#[derive(Debug, Clone)]
pub struct TraceSample {
    xs: Arc<[f64]>,
    ys: Arc<[f64]>,
}

impl TraceSample {
    /// Build from explicit x/y arrays of equal length.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> SweepResult<Self> {
        if xs.len() != ys.len() {
            return Err(SweepError::Configuration(format!(
                "trace x/y length mismatch: {} vs {}",
                xs.len(),
                ys.len()
            )));
        }
        Ok(Self {
            xs: xs.into(),
            ys: ys.into(),
        })
    }

    /// Build from a power array and the acquisition band, spacing the
    /// frequencies uniformly across `[start, stop]` as analyzers report
    /// trace data.
    pub fn from_band(band: FrequencyBand, ys: Vec<f64>) -> Self {
        let n = ys.len();
        let xs: Vec<f64> = if n < 2 {
            vec![band.start_hz; n]
        } else {
            let dx = band.span_hz() / (n - 1) as f64;
            (0..n).map(|i| band.start_hz + i as f64 * dx).collect()
        };
        Self {
            xs: xs.into(),
            ys: ys.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.ys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ys.is_empty()
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// Index and coordinates of the strongest sample, ignoring NaNs.
    pub fn argmax(&self) -> Option<(usize, f64, f64)> {
        let mut best: Option<(usize, f64, f64)> = None;
        for (i, (&x, &y)) in self.xs.iter().zip(self.ys.iter()).enumerate() {
            if !y.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, _, by)| y > by) {
                best = Some((i, x, y));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_from_center_and_span() {
        let band = FrequencyBand::centered(80e6, 10e6);
        assert_eq!(band.start_hz, 75e6);
        assert_eq!(band.stop_hz, 85e6);
        assert_eq!(band.center_hz(), 80e6);
    }

    #[test]
    fn inverted_band_is_rejected() {
        assert!(FrequencyBand::new(1e9, 1e6).validate().is_err());
    }

    #[test]
    fn zero_rbw_is_rejected() {
        let spec = ResolutionSpec {
            rbw_hz: 0.0,
            vbw_hz: None,
            average_count: 1,
            trace_mode: TraceMode::ClearWrite,
            sweep_time: None,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn trace_from_band_spaces_frequencies_uniformly() {
        let band = FrequencyBand::new(0.0, 100.0);
        let trace = TraceSample::from_band(band, vec![-80.0; 11]);
        assert_eq!(trace.len(), 11);
        assert_eq!(trace.xs()[0], 0.0);
        assert_eq!(trace.xs()[10], 100.0);
        assert_eq!(trace.xs()[5], 50.0);
    }

    #[test]
    fn argmax_skips_nan() {
        let trace =
            TraceSample::new(vec![0.0, 1.0, 2.0], vec![-80.0, f64::NAN, -70.0]).unwrap();
        let (i, x, y) = trace.argmax().unwrap();
        assert_eq!((i, x, y), (2, 2.0, -70.0));
    }
}
