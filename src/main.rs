//! CLI entry point for lasersweep.
//!
//! Provides a command-line interface for:
//! - Running a sweep session described by a config file
//! - Validating a config file without touching hardware
//!
//! Sessions run against mock hardware unless a real `Instrument`/`Actuator`
//! wiring is linked in; the mock path exercises the full control loop and
//! produces a real summary CSV, which is what the demo and CI use.
//!
//! # Usage
//!
//! ```bash
//! lasersweep run                  # config/default.toml
//! lasersweep run --config ct_w    # config/ct_w.toml
//! lasersweep validate --config ct_w
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lasersweep::cancel::CancelToken;
use lasersweep::config::Settings;
use lasersweep::hardware::mock::{MockActuator, MockAnalyzer};
use lasersweep::hardware::Actuator;
use lasersweep::runner::{RunState, SweepRunner};
use lasersweep::sink::CsvSummarySink;
use lasersweep::sweep::SweepAxis;

#[derive(Parser)]
#[command(name = "lasersweep")]
#[command(about = "Sweep-and-stabilize laser characterization", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the sweep session described by the config file
    Run {
        /// Config name under config/ (without extension)
        #[arg(long)]
        config: Option<String>,
    },

    /// Load and validate a config file, then exit
    Validate {
        /// Config name under config/ (without extension)
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_session(config.as_deref()).await,
        Commands::Validate { config } => validate_config(config.as_deref()),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn validate_config(name: Option<&str>) -> Result<()> {
    let settings = Settings::new(name)?;
    println!(
        "config ok: session '{}' sweeps {} from {} to {} ({} steps)",
        settings.session.name,
        settings.session.axis,
        settings.session.sweep.start,
        settings.session.sweep.stop,
        settings.session.sweep.setpoints().len()
    );
    Ok(())
}

async fn run_session(name: Option<&str>) -> Result<()> {
    let settings = Settings::new(name)?;
    init_logging(&settings.log_level);

    let sink = Arc::new(CsvSummarySink::open(
        &settings.storage.summary_path,
        settings.storage.columns.clone(),
    )?);

    // Mock hardware wiring: an analyzer with one injected line, and one
    // actuator per sweep axis.
    let instrument = Arc::new(
        MockAnalyzer::new()
            .with_noise(-80.0, 0.5)
            .with_peak(80.0e6, -3.0),
    );
    let mut actuators: HashMap<SweepAxis, Arc<dyn Actuator>> = HashMap::new();
    actuators.insert(
        SweepAxis::Temperature,
        Arc::new(MockActuator::new("temperature", 25.0)),
    );
    actuators.insert(
        SweepAxis::Current,
        Arc::new(MockActuator::new("current", 100.0)),
    );
    actuators.insert(
        SweepAxis::Wavelength,
        Arc::new(MockActuator::new("wavelength", 1550.0)),
    );

    // Ctrl+C raises the stop flag; the loop observes it within one poll.
    let cancel = CancelToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("stop requested, finishing current step");
            ctrl_c_token.cancel();
        }
    });

    let runner = SweepRunner::new(actuators, instrument, sink);
    let outcome = runner.run(&settings.session, &cancel).await;

    info!(
        state = %outcome.state,
        records = outcome.records_written,
        skipped = outcome.steps_skipped,
        "session finished"
    );
    if let Some(err) = &outcome.last_error {
        warn!("last error: {err}");
    }

    match outcome.state {
        RunState::Completed | RunState::Aborted => Ok(()),
        _ => anyhow::bail!(
            "session failed: {}",
            outcome.last_error.as_deref().unwrap_or("unknown error")
        ),
    }
}
