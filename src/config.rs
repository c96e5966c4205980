//! Configuration management.
use config::Config;
use serde::Deserialize;

use crate::error::{SweepError, SweepResult};
use crate::runner::SessionPlan;
use crate::sink::SummaryColumns;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub log_level: String,
    pub storage: StorageSettings,
    pub session: SessionPlan,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Summary CSV path; created (with parents) on first open.
    pub summary_path: String,
    pub columns: SummaryColumns,
}

impl Settings {
    /// Load `config/<name>.toml`, defaulting to `config/default.toml`.
    pub fn new(config_name: Option<&str>) -> SweepResult<Self> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path))
            .build()
            .map_err(SweepError::Config)?;

        let settings: Settings = s.try_deserialize().map_err(SweepError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation beyond what deserialization catches.
    pub fn validate(&self) -> SweepResult<()> {
        if self.storage.summary_path.is_empty() {
            return Err(SweepError::Configuration(
                "storage.summary_path must not be empty".into(),
            ));
        }
        self.session.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        log_level = "info"

        [storage]
        summary_path = "data/summary.csv"

        [storage.columns]
        primary = "temperature_c"
        metric = "peak_frequency_hz"

        [session]
        name = "linewidth-vs-temperature"
        axis = "temperature"
        metric = { trace = "peak_frequency" }

        [session.sweep]
        start = 36.0
        stop = 15.0
        step = 1.0

        [session.stabilization]
        tolerance = 0.05
        max_wait = "120s"
        poll_interval = "2s"
        settle_delay = "10s"

        [session.scan]
        fine_span_hz = 10e6

        [session.scan.band]
        start_hz = 0.0
        stop_hz = 500e6

        [session.scan.coarse.resolution]
        rbw_hz = 100e3
        trace_mode = "max_hold"

        [session.scan.coarse.detector]
        threshold_db = 10.0
        prominence_db = 10.0
        guard_points = 10
    "#;

    #[test]
    fn example_settings_deserialize_and_validate() {
        let settings: Settings = Config::builder()
            .add_source(config::File::from_str(EXAMPLE, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        settings.validate().unwrap();

        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.session.sweep.step, 1.0);
        assert_eq!(
            settings.session.stabilization.settle_delay,
            std::time::Duration::from_secs(10)
        );
        assert!(settings.session.scan.fine.is_none());
    }

    #[test]
    fn invalid_sweep_step_is_rejected() {
        let mut settings: Settings = Config::builder()
            .add_source(config::File::from_str(EXAMPLE, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        settings.session.sweep.step = 0.0;
        assert!(settings.validate().is_err());
    }
}
