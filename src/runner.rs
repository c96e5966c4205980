//! The sweep orchestrator.
//!
//! [`SweepRunner`] owns a whole characterization session: it walks the outer
//! axis setpoints, stabilizes each one, scans the configured frequency band
//! in a coarse tier (and a fine tier where the coarse pass found something),
//! reduces each step to one scalar, and appends it to the summary sink
//! before the next step begins.
//!
//! Error policy is per step: transient actuation, readout, configuration
//! and timeout failures are logged through the sink and the step is skipped.
//! Only connection loss, a storage failure, or cancellation ends the
//! session, and cleanup (restoring initial setpoints, closing the
//! instrument) runs no matter how the loop exited.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::analysis::peaks::{PeakDetector, PeakTracker};
use crate::analysis::{extract_metric, TraceMetric};
use crate::cancel::CancelToken;
use crate::error::{SweepError, SweepResult};
use crate::hardware::{Actuator, Instrument, ScalarMetric};
use crate::sink::{Sink, SweepRecord};
use crate::stabilize::{wait_for, StabilizationPolicy, WaitOutcome};
use crate::sweep::{SweepAxis, SweepSpec};
use crate::trace::{FrequencyBand, ResolutionSpec, TraceMode, TraceSample};

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Connecting,
    Stabilizing,
    Acquiring,
    Recording,
    Completed,
    Aborted,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunState::Idle => "idle",
            RunState::Connecting => "connecting",
            RunState::Stabilizing => "stabilizing",
            RunState::Acquiring => "acquiring",
            RunState::Recording => "recording",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
            RunState::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// How each step's scalar is obtained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    /// Scan the band, detect peaks, reduce the trace.
    Trace(TraceMetric),
    /// Ask the instrument for a single derived value directly.
    Scalar(ScalarMetric),
}

/// Resolution and detection settings for one scan tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSettings {
    pub resolution: ResolutionSpec,
    pub detector: PeakDetector,
}

/// Two-tier band scan: a cheap wide coarse pass, and an expensive narrow
/// fine pass that only runs where the coarse pass found a peak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPlan {
    /// Full band covered by the coarse pass.
    pub band: FrequencyBand,
    pub coarse: TierSettings,
    /// Fine tier; `None` records the coarse result directly.
    #[serde(default)]
    pub fine: Option<TierSettings>,
    /// Span of the fine window centered on the strongest coarse peak, Hz.
    #[serde(default = "default_fine_span")]
    pub fine_span_hz: f64,
}

fn default_fine_span() -> f64 {
    10.0e6
}

impl ScanPlan {
    pub fn validate(&self) -> SweepResult<()> {
        self.band.validate()?;
        self.coarse.resolution.validate()?;
        if let Some(fine) = &self.fine {
            fine.resolution.validate()?;
            if !(self.fine_span_hz > 0.0) {
                return Err(SweepError::Configuration(
                    "fine span must be > 0 when a fine tier is configured".into(),
                ));
            }
            // Clamping the fine window assumes it fits inside the band.
            if self.fine_span_hz > self.band.span_hz() {
                return Err(SweepError::Configuration(format!(
                    "fine span ({} Hz) exceeds the scan band span ({} Hz)",
                    self.fine_span_hz,
                    self.band.span_hz()
                )));
            }
        }
        Ok(())
    }
}

/// A secondary axis held at one fixed setpoint for the whole session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FixedSetpoint {
    pub axis: SweepAxis,
    pub value: f64,
}

/// Everything one session needs, immutable once the run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPlan {
    /// Session name, used in logging and the summary sink.
    pub name: String,
    /// Axis the outer loop scans.
    pub axis: SweepAxis,
    pub sweep: SweepSpec,
    /// Secondary axis pinned before the sweep begins.
    #[serde(default)]
    pub secondary: Option<FixedSetpoint>,
    pub stabilization: StabilizationPolicy,
    pub scan: ScanPlan,
    pub metric: MetricSource,
}

impl SessionPlan {
    pub fn validate(&self) -> SweepResult<()> {
        self.sweep.validate()?;
        self.stabilization.validate()?;
        if matches!(self.metric, MetricSource::Trace(_)) {
            self.scan.validate()?;
        }
        Ok(())
    }
}

/// How a session ended, with its bookkeeping.
#[derive(Debug)]
pub struct SweepOutcome {
    pub state: RunState,
    pub records_written: usize,
    pub steps_skipped: usize,
    pub last_error: Option<String>,
}

/// Owns the hardware handles and the sink for the duration of one or more
/// sessions. One runner executes one session at a time; no two acquisitions
/// are ever in flight on the same instrument handle.
pub struct SweepRunner {
    actuators: HashMap<SweepAxis, Arc<dyn Actuator>>,
    instrument: Arc<dyn Instrument>,
    sink: Arc<dyn Sink>,
}

/// Per-session loop bookkeeping, shared between the loop and its outcome.
#[derive(Default)]
struct Counters {
    records_written: usize,
    steps_skipped: usize,
    last_error: Option<String>,
}

impl SweepRunner {
    pub fn new(
        actuators: HashMap<SweepAxis, Arc<dyn Actuator>>,
        instrument: Arc<dyn Instrument>,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Self {
            actuators,
            instrument,
            sink,
        }
    }

    /// Execute one session to completion, cancellation, or failure.
    ///
    /// Cleanup (restore initial setpoints, close the instrument) runs
    /// regardless of how the loop exits.
    pub async fn run(&self, plan: &SessionPlan, cancel: &CancelToken) -> SweepOutcome {
        let mut counters = Counters::default();
        info!(session = %plan.name, axis = %plan.axis, "sweep session starting");

        if let Err(err) = plan.validate() {
            error!(session = %plan.name, %err, "session plan rejected");
            return SweepOutcome {
                state: RunState::Failed,
                records_written: 0,
                steps_skipped: 0,
                last_error: Some(err.to_string()),
            };
        }

        // Connecting: resolve actuators and remember where they started.
        debug!(session = %plan.name, state = %RunState::Connecting, "state");
        let primary = match self.actuators.get(&plan.axis) {
            Some(actuator) => Arc::clone(actuator),
            None => {
                let err = SweepError::Configuration(format!(
                    "no actuator registered for axis {}",
                    plan.axis
                ));
                error!(session = %plan.name, %err, "session plan rejected");
                return SweepOutcome {
                    state: RunState::Failed,
                    records_written: 0,
                    steps_skipped: 0,
                    last_error: Some(err.to_string()),
                };
            }
        };
        let initial_primary = primary.get().await;
        let secondary = match &plan.secondary {
            Some(fixed) => match self.actuators.get(&fixed.axis) {
                Some(actuator) => Some((Arc::clone(actuator), *fixed)),
                None => {
                    let err = SweepError::Configuration(format!(
                        "no actuator registered for secondary axis {}",
                        fixed.axis
                    ));
                    error!(session = %plan.name, %err, "session plan rejected");
                    return SweepOutcome {
                        state: RunState::Failed,
                        records_written: 0,
                        steps_skipped: 0,
                        last_error: Some(err.to_string()),
                    };
                }
            },
            None => None,
        };
        let initial_secondary = match &secondary {
            Some((actuator, _)) => actuator.get().await,
            None => None,
        };

        let loop_result = self
            .run_loop(plan, &primary, secondary.as_ref(), cancel, &mut counters)
            .await;

        // Cleanup runs on every exit path.
        self.restore(&primary, initial_primary).await;
        if let Some((actuator, _)) = &secondary {
            self.restore(actuator, initial_secondary).await;
        }
        if let Err(err) = self.instrument.close().await {
            warn!(session = %plan.name, %err, "instrument close failed");
        }

        let state = match &loop_result {
            Ok(()) => RunState::Completed,
            Err(err) if err.is_cancelled() => RunState::Aborted,
            Err(_) => RunState::Failed,
        };
        if let Err(err) = &loop_result {
            if !err.is_cancelled() {
                counters.last_error = Some(err.to_string());
                self.sink.log(&format!("session aborted: {err}")).await;
            }
        }
        info!(
            session = %plan.name,
            %state,
            records = counters.records_written,
            skipped = counters.steps_skipped,
            "sweep session finished"
        );
        SweepOutcome {
            state,
            records_written: counters.records_written,
            steps_skipped: counters.steps_skipped,
            last_error: counters.last_error,
        }
    }

    async fn run_loop(
        &self,
        plan: &SessionPlan,
        primary: &Arc<dyn Actuator>,
        secondary: Option<&(Arc<dyn Actuator>, FixedSetpoint)>,
        cancel: &CancelToken,
        counters: &mut Counters,
    ) -> SweepResult<()> {
        // Pin the secondary axis once, before the sweep begins.
        if let Some((actuator, fixed)) = secondary {
            actuator.set(fixed.value).await?;
            if wait_for(actuator.as_ref(), fixed.value, &plan.stabilization, cancel)
                .await
                .is_cancelled()
            {
                return Err(SweepError::Cancelled);
            }
        }

        let setpoints = plan.sweep.setpoints();
        info!(
            session = %plan.name,
            steps = setpoints.len(),
            start = plan.sweep.start,
            stop = plan.sweep.stop,
            "sweep sequence generated"
        );

        let mut tracker = PeakTracker::default();
        for (index, &setpoint) in setpoints.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SweepError::Cancelled);
            }

            match self
                .run_step(plan, primary, setpoint, cancel, &mut tracker)
                .await
            {
                Ok(Some(metric)) => {
                    // Durable before the next step starts.
                    debug!(state = %RunState::Recording, setpoint, metric, "state");
                    let record = SweepRecord {
                        primary_setpoint: setpoint,
                        secondary_setpoint: secondary.map(|(_, fixed)| fixed.value),
                        metric,
                    };
                    self.sink.append_record(&record).await?;
                    counters.records_written += 1;
                }
                Ok(None) => {
                    counters.steps_skipped += 1;
                    let message = format!(
                        "step {} ({} = {setpoint}): no metric extracted, step skipped",
                        index + 1,
                        plan.axis
                    );
                    warn!(session = %plan.name, "{message}");
                    self.sink.log(&message).await;
                }
                Err(err) if err.aborts_session() => return Err(err),
                Err(err) => {
                    counters.steps_skipped += 1;
                    counters.last_error = Some(err.to_string());
                    let message = format!(
                        "step {} ({} = {setpoint}) skipped: {err}",
                        index + 1,
                        plan.axis
                    );
                    error!(session = %plan.name, "{message}");
                    self.sink.log(&message).await;
                }
            }
        }
        Ok(())
    }

    /// One outer-loop step: stabilize the setpoint, then measure.
    ///
    /// `Ok(None)` means the step completed but produced no metric (no peak
    /// found); the caller logs and skips without treating it as an error.
    async fn run_step(
        &self,
        plan: &SessionPlan,
        primary: &Arc<dyn Actuator>,
        setpoint: f64,
        cancel: &CancelToken,
        tracker: &mut PeakTracker,
    ) -> SweepResult<Option<f64>> {
        primary.set(setpoint).await?;

        // A stabilization timeout proceeds with best-effort settling, but
        // the operator gets to audit which steps settled and which did not.
        debug!(state = %RunState::Stabilizing, setpoint, "state");
        match wait_for(primary.as_ref(), setpoint, &plan.stabilization, cancel).await {
            WaitOutcome::Cancelled => return Err(SweepError::Cancelled),
            WaitOutcome::TimedOut { waited, .. } => {
                self.sink
                    .log(&format!(
                        "{} = {setpoint}: stabilization timed out after {waited:?}, \
                         proceeding with best-effort settling",
                        plan.axis
                    ))
                    .await;
            }
            WaitOutcome::Stabilized { .. } => {}
        }

        if cancel.is_cancelled() {
            return Err(SweepError::Cancelled);
        }

        debug!(state = %RunState::Acquiring, setpoint, "state");
        match plan.metric {
            MetricSource::Scalar(metric) => {
                let value = self.instrument.acquire_scalar(metric).await?;
                Ok(Some(value))
            }
            MetricSource::Trace(metric) => {
                self.scan_band(plan, metric, setpoint, cancel, tracker).await
            }
        }
    }

    /// Coarse pass over the whole band, then a fine pass centered on the
    /// strongest coarse peak when a fine tier is configured.
    async fn scan_band(
        &self,
        plan: &SessionPlan,
        metric: TraceMetric,
        setpoint: f64,
        cancel: &CancelToken,
        tracker: &mut PeakTracker,
    ) -> SweepResult<Option<f64>> {
        let scan = &plan.scan;
        let (coarse_trace, coarse_peaks) = self
            .acquire_tier(scan.band, &scan.coarse, TraceMode::MaxHold)
            .await?;

        for peak in tracker.novel(&coarse_peaks) {
            info!(
                session = %plan.name,
                freq_mhz = peak.x / 1e6,
                power_dbm = peak.y,
                axis = %plan.axis,
                setpoint,
                "new peak"
            );
        }

        let strongest = coarse_peaks
            .iter()
            .max_by(|a, b| a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
            .copied();

        let (fine, strongest) = match (&scan.fine, strongest) {
            (Some(fine), Some(peak)) => (fine, peak),
            // No fine tier, or nothing to center it on: the coarse result
            // is the step's result.
            _ => return Ok(extract_metric(metric, &coarse_trace, &coarse_peaks)),
        };

        if cancel.is_cancelled() {
            return Err(SweepError::Cancelled);
        }

        // Fine window centered on the strongest peak, clamped into the band.
        let mut fine_band = FrequencyBand::centered(strongest.x, scan.fine_span_hz);
        if fine_band.start_hz < scan.band.start_hz {
            fine_band = FrequencyBand::new(
                scan.band.start_hz,
                scan.band.start_hz + scan.fine_span_hz,
            );
        } else if fine_band.stop_hz > scan.band.stop_hz {
            fine_band = FrequencyBand::new(
                scan.band.stop_hz - scan.fine_span_hz,
                scan.band.stop_hz,
            );
        }

        let (fine_trace, fine_peaks) = self
            .acquire_tier(fine_band, fine, TraceMode::ClearWrite)
            .await?;

        // Fall back to the coarse result when the fine pass loses the peak.
        match extract_metric(metric, &fine_trace, &fine_peaks) {
            Some(value) => Ok(Some(value)),
            None => Ok(extract_metric(metric, &coarse_trace, &coarse_peaks)),
        }
    }

    async fn acquire_tier(
        &self,
        band: FrequencyBand,
        tier: &TierSettings,
        mode: TraceMode,
    ) -> SweepResult<(TraceSample, Vec<crate::analysis::Peak>)> {
        let resolution = ResolutionSpec {
            trace_mode: mode,
            ..tier.resolution.clone()
        };
        self.instrument.configure(band, &resolution).await?;
        let trace = self.instrument.acquire_once().await?;
        let peaks = tier.detector.find(&trace);
        Ok((trace, peaks))
    }

    async fn restore(&self, actuator: &Arc<dyn Actuator>, initial: Option<f64>) {
        let Some(value) = initial else { return };
        match actuator.set(value).await {
            Ok(()) => {
                info!(actuator = actuator.name(), value, "initial setpoint restored");
            }
            Err(err) => {
                warn!(
                    actuator = actuator.name(),
                    value,
                    %err,
                    "failed to restore initial setpoint"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockActuator, MockAnalyzer, MockPowerMeter};
    use crate::sink::MemorySink;
    use std::time::Duration;

    fn fast_policy() -> StabilizationPolicy {
        StabilizationPolicy {
            tolerance: 0.1,
            max_wait: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            settle_delay: Duration::from_millis(1),
        }
    }

    fn tier(rbw_hz: f64) -> TierSettings {
        TierSettings {
            resolution: ResolutionSpec {
                rbw_hz,
                vbw_hz: None,
                average_count: 1,
                trace_mode: TraceMode::ClearWrite,
                sweep_time: None,
            },
            detector: PeakDetector::new(10.0, 10.0, 10),
        }
    }

    fn trace_plan(sweep: SweepSpec) -> SessionPlan {
        SessionPlan {
            name: "test".into(),
            axis: SweepAxis::Temperature,
            sweep,
            secondary: None,
            stabilization: fast_policy(),
            scan: ScanPlan {
                band: FrequencyBand::new(0.0, 200.0e6),
                coarse: tier(100e3),
                fine: None,
                fine_span_hz: 10.0e6,
            },
            metric: MetricSource::Trace(TraceMetric::PeakFrequency),
        }
    }

    fn runner(instrument: Arc<dyn Instrument>, sink: Arc<dyn Sink>) -> SweepRunner {
        let mut actuators: HashMap<SweepAxis, Arc<dyn Actuator>> = HashMap::new();
        actuators.insert(
            SweepAxis::Temperature,
            Arc::new(MockActuator::new("temperature", 25.0)),
        );
        actuators.insert(
            SweepAxis::Current,
            Arc::new(MockActuator::new("current", 100.0)),
        );
        SweepRunner::new(actuators, instrument, sink)
    }

    #[tokio::test]
    async fn full_sweep_records_every_step() {
        let analyzer = Arc::new(
            MockAnalyzer::new()
                .with_points(2001)
                .with_noise(-80.0, 0.5)
                .with_peak(80.0e6, -3.0),
        );
        let sink = Arc::new(MemorySink::new());
        let runner = runner(analyzer.clone(), sink.clone());

        let plan = trace_plan(SweepSpec::new(36.0, 15.0, 1.0));
        let outcome = runner.run(&plan, &CancelToken::new()).await;

        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.records_written, 22);
        assert_eq!(outcome.steps_skipped, 0);

        let records = sink.records().await;
        assert_eq!(records.len(), 22);
        assert_eq!(records[0].primary_setpoint, 36.0);
        assert_eq!(records[21].primary_setpoint, 15.0);
        for record in &records {
            assert!((record.metric - 80.0e6).abs() < 1e5, "got {}", record.metric);
        }
        assert!(analyzer.was_closed().await);
    }

    #[tokio::test]
    async fn single_timeout_skips_one_step_and_completes() {
        let analyzer = Arc::new(
            MockAnalyzer::new()
                .with_points(501)
                .with_noise(-80.0, 0.5)
                .with_peak(80.0e6, -3.0)
                .fail_on_coarse_pass(3),
        );
        let sink = Arc::new(MemorySink::new());
        let runner = runner(analyzer.clone(), sink.clone());

        let plan = trace_plan(SweepSpec::new(1.0, 5.0, 1.0));
        let outcome = runner.run(&plan, &CancelToken::new()).await;

        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.records_written, 4);
        assert_eq!(outcome.steps_skipped, 1);
        assert!(outcome.last_error.is_some());

        let recorded: Vec<f64> = sink
            .records()
            .await
            .iter()
            .map(|r| r.primary_setpoint)
            .collect();
        assert_eq!(recorded, vec![1.0, 2.0, 4.0, 5.0]);
        // The skip was surfaced to the operator.
        let messages = sink.messages().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("step 3"));
    }

    #[tokio::test]
    async fn pre_cancelled_session_aborts_without_records() {
        let analyzer = Arc::new(MockAnalyzer::new().with_peak(80.0e6, -3.0));
        let sink = Arc::new(MemorySink::new());
        let runner = runner(analyzer.clone(), sink.clone());

        let cancel = CancelToken::new();
        cancel.cancel();
        let plan = trace_plan(SweepSpec::new(36.0, 15.0, 1.0));
        let outcome = runner.run(&plan, &cancel).await;

        assert_eq!(outcome.state, RunState::Aborted);
        assert_eq!(outcome.records_written, 0);
        assert!(sink.records().await.is_empty());
        // Cleanup still ran.
        assert!(analyzer.was_closed().await);
    }

    #[tokio::test]
    async fn fine_tier_runs_after_a_coarse_hit() {
        let analyzer = Arc::new(
            MockAnalyzer::new()
                .with_points(1001)
                .with_noise(-80.0, 0.5)
                .with_peak(80.0e6, -3.0),
        );
        let sink = Arc::new(MemorySink::new());
        let runner = runner(analyzer.clone(), sink.clone());

        let mut plan = trace_plan(SweepSpec::new(25.0, 25.0, 1.0));
        plan.scan.fine = Some(tier(10e3));
        plan.metric = MetricSource::Trace(TraceMetric::InterpolatedPeakFrequency);
        let outcome = runner.run(&plan, &CancelToken::new()).await;

        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.records_written, 1);
        // Only the coarse pass uses max-hold; one step means one coarse pass.
        assert_eq!(analyzer.coarse_pass_count(), 1);
        let records = sink.records().await;
        assert!((records[0].metric - 80.0e6).abs() < 1e5);
    }

    #[tokio::test]
    async fn scalar_session_bypasses_the_scan() {
        let meter = Arc::new(MockPowerMeter::new(0.0042));
        let sink = Arc::new(MemorySink::new());
        let runner = runner(meter, sink.clone());

        let mut plan = trace_plan(SweepSpec::new(100.0, 140.0, 10.0));
        plan.axis = SweepAxis::Current;
        plan.metric = MetricSource::Scalar(ScalarMetric::OpticalPower);
        let outcome = runner.run(&plan, &CancelToken::new()).await;

        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.records_written, 5);
        for record in sink.records().await {
            assert_eq!(record.metric, 0.0042);
        }
    }

    #[tokio::test]
    async fn connection_loss_mid_sweep_fails_the_session() {
        let analyzer = Arc::new(
            MockAnalyzer::new()
                .with_points(501)
                .with_noise(-80.0, 0.5)
                .with_peak(80.0e6, -3.0)
                .drop_connection_on_pass(3),
        );
        let sink = Arc::new(MemorySink::new());
        let runner = runner(analyzer.clone(), sink.clone());

        let plan = trace_plan(SweepSpec::new(1.0, 5.0, 1.0));
        let outcome = runner.run(&plan, &CancelToken::new()).await;

        assert_eq!(outcome.state, RunState::Failed);
        assert_eq!(outcome.records_written, 2);
        assert!(outcome
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("Connection lost")));

        // Completed steps stay recorded; nothing ran past the drop.
        let recorded: Vec<f64> = sink
            .records()
            .await
            .iter()
            .map(|r| r.primary_setpoint)
            .collect();
        assert_eq!(recorded, vec![1.0, 2.0]);
        assert_eq!(analyzer.coarse_pass_count(), 3);

        let messages = sink.messages().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("session aborted"), "got: {}", messages[0]);
    }

    #[tokio::test]
    async fn stabilization_timeouts_are_audited_through_the_sink() {
        let analyzer = Arc::new(
            MockAnalyzer::new()
                .with_points(501)
                .with_noise(-80.0, 0.5)
                .with_peak(80.0e6, -3.0),
        );
        let sink = Arc::new(MemorySink::new());
        let mut actuators: HashMap<SweepAxis, Arc<dyn Actuator>> = HashMap::new();
        // Readback pinned twice the tolerance away: every step times out.
        actuators.insert(
            SweepAxis::Temperature,
            Arc::new(MockActuator::new("temperature", 25.0).with_readback_offset(0.2)),
        );
        let runner = SweepRunner::new(actuators, analyzer, sink.clone());

        let plan = trace_plan(SweepSpec::new(20.0, 21.0, 1.0));
        let outcome = runner.run(&plan, &CancelToken::new()).await;

        // Timeouts are non-fatal: every step still measures and records.
        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.records_written, 2);
        let messages = sink.messages().await;
        assert_eq!(messages.len(), 2);
        for message in &messages {
            assert!(
                message.contains("stabilization timed out"),
                "got: {message}"
            );
        }
    }

    #[tokio::test]
    async fn oversized_fine_span_is_rejected() {
        let analyzer = Arc::new(MockAnalyzer::new());
        let sink = Arc::new(MemorySink::new());
        let runner = runner(analyzer, sink);

        let mut plan = trace_plan(SweepSpec::new(20.0, 21.0, 1.0));
        // Band spans 200 MHz; a 300 MHz fine window cannot fit inside it.
        plan.scan.fine = Some(tier(10e3));
        plan.scan.fine_span_hz = 300.0e6;
        let outcome = runner.run(&plan, &CancelToken::new()).await;

        assert_eq!(outcome.state, RunState::Failed);
        assert_eq!(outcome.records_written, 0);
        assert!(outcome
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("fine span")));
    }

    #[tokio::test]
    async fn missing_actuator_fails_before_any_hardware_io() {
        let analyzer = Arc::new(MockAnalyzer::new());
        let sink = Arc::new(MemorySink::new());
        let actuators: HashMap<SweepAxis, Arc<dyn Actuator>> = HashMap::new();
        let runner = SweepRunner::new(actuators, analyzer.clone(), sink.clone());

        let plan = trace_plan(SweepSpec::new(0.0, 1.0, 1.0));
        let outcome = runner.run(&plan, &CancelToken::new()).await;

        assert_eq!(outcome.state, RunState::Failed);
        assert_eq!(outcome.records_written, 0);
        assert!(outcome.last_error.is_some());
    }

    #[tokio::test]
    async fn failing_actuator_skips_every_step_but_completes() {
        let analyzer = Arc::new(MockAnalyzer::new().with_peak(80.0e6, -3.0));
        let sink = Arc::new(MemorySink::new());
        let mut actuators: HashMap<SweepAxis, Arc<dyn Actuator>> = HashMap::new();
        actuators.insert(
            SweepAxis::Temperature,
            Arc::new(MockActuator::new("temperature", 25.0).with_failing_sets()),
        );
        let runner = SweepRunner::new(actuators, analyzer, sink.clone());

        let plan = trace_plan(SweepSpec::new(1.0, 3.0, 1.0));
        let outcome = runner.run(&plan, &CancelToken::new()).await;

        // Actuation errors are per-step: the sweep walks on.
        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.records_written, 0);
        assert_eq!(outcome.steps_skipped, 3);
        assert_eq!(sink.messages().await.len(), 3);
    }
}
