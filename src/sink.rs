//! Summary sinks: where per-step results and operator-visible log lines go.
//!
//! A sweep session appends exactly one [`SweepRecord`] per completed step,
//! before the next step starts. The sink must make that append durable
//! immediately; a crash mid-sweep then loses at most the in-flight step.
//! Error messages also flow through the sink so an operator can audit
//! afterwards exactly where and why steps were skipped.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{SweepError, SweepResult};

/// One summary row: the setpoint(s) that were applied and the scalar that
/// came out.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRecord {
    /// Outer-axis setpoint in its native units.
    pub primary_setpoint: f64,
    /// Fixed or secondary-axis setpoint, when the session has one.
    pub secondary_setpoint: Option<f64>,
    /// The derived metric for this step (peak frequency, power, ...).
    pub metric: f64,
}

/// Column names for the summary file, fixed per test type at session start.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SummaryColumns {
    pub primary: String,
    #[serde(default)]
    pub secondary: Option<String>,
    pub metric: String,
}

/// Destination for per-step records and operator log lines.
///
/// Both methods are called from the session worker task and must be safe for
/// concurrent append when several sessions share one sink.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Append one record durably. A failure here aborts the session, since
    /// continuing to measure without recording is wasted instrument time.
    async fn append_record(&self, record: &SweepRecord) -> SweepResult<()>;

    /// Emit an operator-visible status or error line.
    async fn log(&self, message: &str);
}

/// Append-only CSV summary file.
///
/// The header is written once, on the first row ever written to the file;
/// reopening an existing non-empty file appends data rows only, so repeated
/// sessions against the same summary accumulate. Every append is flushed
/// before returning.
pub struct CsvSummarySink {
    path: PathBuf,
    columns: SummaryColumns,
    writer: Mutex<csv::Writer<std::fs::File>>,
}

impl CsvSummarySink {
    /// Open (or create) the summary file at `path`.
    pub fn open(path: impl AsRef<Path>, columns: SummaryColumns) -> SweepResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            let mut header = vec!["timestamp".to_string(), columns.primary.clone()];
            if let Some(secondary) = &columns.secondary {
                header.push(secondary.clone());
            }
            header.push(columns.metric.clone());
            writer.write_record(&header)?;
            writer.flush()?;
        }

        info!(path = %path.display(), "summary sink opened");
        Ok(Self {
            path,
            columns,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Sink for CsvSummarySink {
    async fn append_record(&self, record: &SweepRecord) -> SweepResult<()> {
        let mut row = vec![
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            record.primary_setpoint.to_string(),
        ];
        if self.columns.secondary.is_some() {
            row.push(
                record
                    .secondary_setpoint
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        row.push(record.metric.to_string());

        let mut writer = self.writer.lock().await;
        writer.write_record(&row)?;
        // Durable before the next step begins.
        writer
            .flush()
            .map_err(|e| SweepError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn log(&self, message: &str) {
        info!(target: "summary", "{message}");
    }
}

/// In-memory sink for tests: records and log lines are kept verbatim.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<SweepRecord>>,
    messages: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<SweepRecord> {
        self.records.lock().await.clone()
    }

    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn append_record(&self, record: &SweepRecord) -> SweepResult<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn log(&self, message: &str) {
        self.messages.lock().await.push(message.to_string());
    }
}
