//! Mock hardware implementations.
//!
//! Simulated devices for testing the sweep engine and for running the demo
//! binary without physical hardware. All mocks use async-safe operations
//! (`tokio::time::sleep`, never `std::thread::sleep`).
//!
//! # Available mocks
//!
//! - [`MockActuator`] - first-order-lag setpoint tracking with optional
//!   readback dropout and a configurable convergence offset
//! - [`MockAnalyzer`] - spectrum analyzer producing noise-floor traces with
//!   injected peaks and deterministic failure injection
//! - [`MockPowerMeter`] - scalar-only instrument

use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

use crate::error::{SweepError, SweepResult};
use crate::hardware::{Actuator, Instrument, ScalarMetric};
use crate::trace::{FrequencyBand, ResolutionSpec, TraceMode, TraceSample};

// =============================================================================
// MockActuator
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct ActuatorState {
    /// Value the readback is converging from.
    from: f64,
    target: f64,
    set_at: Instant,
}

/// Simulated actuator whose readback approaches the setpoint exponentially.
///
/// With the default zero time constant the readback tracks the setpoint
/// instantly. `with_readback_offset` pins the readback a fixed distance from
/// the setpoint (never converges); `with_dropout` makes `get` return `None`
/// with the given probability, modelling flaky telemetry.
pub struct MockActuator {
    name: String,
    state: Arc<RwLock<ActuatorState>>,
    time_constant: Duration,
    readback_offset: f64,
    dropout: f64,
    fail_sets: bool,
}

impl MockActuator {
    pub fn new(name: impl Into<String>, initial: f64) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(ActuatorState {
                from: initial,
                target: initial,
                set_at: Instant::now(),
            })),
            time_constant: Duration::ZERO,
            readback_offset: 0.0,
            dropout: 0.0,
            fail_sets: false,
        }
    }

    /// First-order lag time constant for the readback.
    pub fn with_lag(mut self, time_constant: Duration) -> Self {
        self.time_constant = time_constant;
        self
    }

    /// Pin the readback `offset` away from the setpoint.
    pub fn with_readback_offset(mut self, offset: f64) -> Self {
        self.readback_offset = offset;
        self
    }

    /// Probability in `[0, 1]` that a readback poll returns `None`.
    pub fn with_dropout(mut self, probability: f64) -> Self {
        self.dropout = probability;
        self
    }

    /// Make every `set` fail with an actuation error.
    pub fn with_failing_sets(mut self) -> Self {
        self.fail_sets = true;
        self
    }

    async fn model_value(&self) -> f64 {
        let state = *self.state.read().await;
        let value = if self.time_constant.is_zero() {
            state.target
        } else {
            let t = state.set_at.elapsed().as_secs_f64();
            let tau = self.time_constant.as_secs_f64();
            state.target + (state.from - state.target) * (-t / tau).exp()
        };
        value + self.readback_offset
    }
}

#[async_trait]
impl Actuator for MockActuator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set(&self, value: f64) -> SweepResult<()> {
        if self.fail_sets {
            return Err(SweepError::Actuation(format!(
                "{}: simulated link failure",
                self.name
            )));
        }
        let current = self.model_value().await - self.readback_offset;
        let mut state = self.state.write().await;
        *state = ActuatorState {
            from: current,
            target: value,
            set_at: Instant::now(),
        };
        debug!(actuator = %self.name, setpoint = value, "mock setpoint applied");
        Ok(())
    }

    async fn get(&self) -> Option<f64> {
        if self.dropout > 0.0 && rand::thread_rng().gen::<f64>() < self.dropout {
            return None;
        }
        Some(self.model_value().await)
    }
}

// =============================================================================
// MockAnalyzer
// =============================================================================

/// Simulated spectrum analyzer.
///
/// Produces traces of `points` samples at `noise_floor_dbm` with uniform
/// jitter of `noise_amplitude_db`, plus any injected peaks falling inside
/// the configured band. Peaks are single-sample spikes at the nearest bin,
/// which is what a narrow line looks like at coarse RBW.
///
/// `fail_on_coarse_pass(n)` arms a one-shot `AcquisitionTimeout` on the
/// acquisition following the n-th max-hold configuration (1-based), which is
/// how tests align an injected failure with a specific sweep step.
/// `drop_connection_on_pass(n)` instead drops the simulated link from that
/// pass onward; every later call fails with `ConnectionLost`.
pub struct MockAnalyzer {
    points: usize,
    noise_floor_dbm: f64,
    noise_amplitude_db: f64,
    acquisition_delay: Duration,
    peaks: RwLock<Vec<(f64, f64)>>,
    configured: RwLock<Option<FrequencyBand>>,
    coarse_passes: AtomicUsize,
    fail_on_pass: Option<usize>,
    fail_armed: RwLock<bool>,
    drop_on_pass: Option<usize>,
    connection_lost: RwLock<bool>,
    closed: RwLock<bool>,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self {
            points: 2001,
            noise_floor_dbm: -80.0,
            noise_amplitude_db: 1.0,
            acquisition_delay: Duration::ZERO,
            peaks: RwLock::new(Vec::new()),
            configured: RwLock::new(None),
            coarse_passes: AtomicUsize::new(0),
            fail_on_pass: None,
            fail_armed: RwLock::new(false),
            drop_on_pass: None,
            connection_lost: RwLock::new(false),
            closed: RwLock::new(false),
        }
    }

    pub fn with_points(mut self, points: usize) -> Self {
        self.points = points;
        self
    }

    pub fn with_noise(mut self, floor_dbm: f64, amplitude_db: f64) -> Self {
        self.noise_floor_dbm = floor_dbm;
        self.noise_amplitude_db = amplitude_db;
        self
    }

    /// Inject a spectral line at `freq_hz` with power `power_dbm`.
    pub fn with_peak(self, freq_hz: f64, power_dbm: f64) -> Self {
        // The builder has exclusive ownership, so the lock is uncontended.
        if let Ok(mut peaks) = self.peaks.try_write() {
            peaks.push((freq_hz, power_dbm));
        }
        self
    }

    pub fn with_acquisition_delay(mut self, delay: Duration) -> Self {
        self.acquisition_delay = delay;
        self
    }

    /// Fail the acquisition after the n-th max-hold configure (1-based).
    pub fn fail_on_coarse_pass(mut self, pass: usize) -> Self {
        self.fail_on_pass = Some(pass);
        self
    }

    /// Drop the simulated link on the n-th max-hold configure (1-based).
    /// Unlike `fail_on_coarse_pass` this is not one-shot: once dropped,
    /// every call fails with `ConnectionLost`.
    pub fn drop_connection_on_pass(mut self, pass: usize) -> Self {
        self.drop_on_pass = Some(pass);
        self
    }

    pub async fn was_closed(&self) -> bool {
        *self.closed.read().await
    }

    /// Number of max-hold (coarse tier) configurations seen so far.
    pub fn coarse_pass_count(&self) -> usize {
        self.coarse_passes.load(Ordering::SeqCst)
    }
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Instrument for MockAnalyzer {
    async fn configure(
        &self,
        band: FrequencyBand,
        resolution: &ResolutionSpec,
    ) -> SweepResult<()> {
        if *self.connection_lost.read().await {
            return Err(SweepError::ConnectionLost("simulated link drop".into()));
        }
        band.validate()?;
        resolution.validate()?;
        if resolution.trace_mode == TraceMode::MaxHold {
            let pass = self.coarse_passes.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_pass == Some(pass) {
                *self.fail_armed.write().await = true;
            }
            if self.drop_on_pass == Some(pass) {
                *self.connection_lost.write().await = true;
                return Err(SweepError::ConnectionLost("simulated link drop".into()));
            }
        }
        *self.configured.write().await = Some(band);
        Ok(())
    }

    async fn acquire_once(&self) -> SweepResult<TraceSample> {
        if *self.connection_lost.read().await {
            return Err(SweepError::ConnectionLost("simulated link drop".into()));
        }
        let band = (*self.configured.read().await).ok_or_else(|| {
            SweepError::Configuration("acquisition requested before configure".into())
        })?;

        if !self.acquisition_delay.is_zero() {
            sleep(self.acquisition_delay).await;
        }

        let mut armed = self.fail_armed.write().await;
        if *armed {
            *armed = false;
            return Err(SweepError::AcquisitionTimeout {
                waited: self.acquisition_delay.max(Duration::from_millis(1)),
            });
        }
        drop(armed);

        // Snapshot the peak list before touching the rng: ThreadRng is not
        // Send and must not be held across an await point.
        let peaks: Vec<(f64, f64)> = self.peaks.read().await.clone();
        let mut ys: Vec<f64> = {
            let mut rng = rand::thread_rng();
            (0..self.points)
                .map(|_| {
                    self.noise_floor_dbm
                        + rng.gen_range(-self.noise_amplitude_db..=self.noise_amplitude_db)
                })
                .collect()
        };

        let span = band.span_hz();
        if span > 0.0 && self.points > 1 {
            let dx = span / (self.points - 1) as f64;
            for (freq, power) in peaks {
                if freq >= band.start_hz && freq <= band.stop_hz {
                    let bin = ((freq - band.start_hz) / dx).round() as usize;
                    if bin < ys.len() {
                        ys[bin] = power;
                    }
                }
            }
        }

        Ok(TraceSample::from_band(band, ys))
    }

    async fn close(&self) -> SweepResult<()> {
        *self.closed.write().await = true;
        Ok(())
    }
}

// =============================================================================
// MockPowerMeter
// =============================================================================

/// Scalar-only instrument reporting a fixed optical power.
pub struct MockPowerMeter {
    watts: RwLock<f64>,
}

impl MockPowerMeter {
    pub fn new(watts: f64) -> Self {
        Self {
            watts: RwLock::new(watts),
        }
    }

    pub async fn set_power(&self, watts: f64) {
        *self.watts.write().await = watts;
    }
}

#[async_trait]
impl Instrument for MockPowerMeter {
    async fn configure(
        &self,
        _band: FrequencyBand,
        resolution: &ResolutionSpec,
    ) -> SweepResult<()> {
        resolution.validate()
    }

    async fn acquire_once(&self) -> SweepResult<TraceSample> {
        Err(SweepError::Readout(
            "power meter does not produce traces".into(),
        ))
    }

    async fn acquire_scalar(&self, metric: ScalarMetric) -> SweepResult<f64> {
        match metric {
            ScalarMetric::OpticalPower => Ok(*self.watts.read().await),
        }
    }
}
