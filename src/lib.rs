//! # Laser Sweep Core Library
//!
//! This crate is the core library for the `lasersweep` characterization
//! tool. It encapsulates the sweep-and-stabilize control loop used to map a
//! photonic device's behavior across temperature, drive current, or
//! wavelength, reducing each step to one scalar in an append-only summary.
//!
//! ## Crate Structure
//!
//! - **`analysis`**: peak detection on spectral traces and the metric
//!   reductions (peak frequency/power, parabolic refinement, integrated
//!   power) applied per step.
//! - **`cancel`**: the shared cooperative stop flag polled at every loop
//!   boundary and inside every bounded wait.
//! - **`config`**: TOML-backed `Settings` describing a whole session.
//! - **`error`**: the `SweepError` taxonomy, split into per-step and
//!   session-aborting failures.
//! - **`hardware`**: the `Actuator`/`Instrument` capability traits, mock
//!   devices, and SCPI transport helpers for real implementations.
//! - **`runner`**: the `SweepRunner` orchestrator and its session plan.
//! - **`sink`**: summary sinks, including the append-only CSV writer.
//! - **`stabilize`**: setpoint convergence polling.
//! - **`sweep`**: setpoint sequence generation with fine sub-ranges.
//! - **`trace`**: acquisition geometry and immutable trace data.

pub mod analysis;
pub mod cancel;
pub mod config;
pub mod error;
pub mod hardware;
pub mod runner;
pub mod sink;
pub mod stabilize;
pub mod sweep;
pub mod trace;
