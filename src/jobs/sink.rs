use std::fs::{File, OpenOptions};
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::error::SinkError;
use crate::jobs::record::{JobRecord, JobStatus};

/// Receives each job exactly once, after it reached a terminal state.
/// Implementations must be Thread-Safe (Sync); workers call them concurrently.
pub trait JobSink: Send + Sync {
    fn on_finalized(&self, record: &JobRecord) -> Result<(), SinkError>;
}

/// Flat CSV row describing one finalized job.
#[derive(Debug, Serialize)]
struct JobLogRow<'a> {
    job_id: &'a str,
    status: JobStatus,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    #[serde(rename = "O_F_ratio")]
    o_f_ratio: f64,
    pressure: f64,
    temp: f64,
    isp: f64,
    alpha: f64,
    max_temp: f64,
    iterations: Option<usize>,
    best_o_f_ratio: Option<f64>,
    best_pressure: Option<f64>,
    best_score: Option<f64>,
    best_predicted_temp: Option<f64>,
    error: Option<&'a str>,
}

impl<'a> From<&'a JobRecord> for JobLogRow<'a> {
    fn from(r: &'a JobRecord) -> Self {
        let p = &r.parameters;
        let best = r.result.as_ref().and_then(|res| res.best.as_ref());
        Self {
            job_id: &r.job_id,
            status: r.status,
            submitted_at: r.submitted_at,
            started_at: r.started_at,
            completed_at: r.completed_at,
            o_f_ratio: p.o_f_ratio(),
            pressure: p.pressure(),
            temp: p.temp(),
            isp: p.isp(),
            alpha: p.alpha(),
            max_temp: p.max_temp(),
            iterations: r.result.as_ref().map(|res| res.iterations),
            best_o_f_ratio: best.map(|c| c.parameters.o_f_ratio()),
            best_pressure: best.map(|c| c.parameters.pressure()),
            best_score: best.map(|c| c.blended_score),
            best_predicted_temp: best.map(|c| c.predicted_temp),
            error: r.error.as_deref(),
        }
    }
}

/// Appends one row per finalized job to a CSV file.
pub struct CsvJobLog {
    writer: Mutex<csv::Writer<File>>,
}

impl CsvJobLog {
    /// Opens (or creates) `path` for appending. The header row is written
    /// only when the file starts out empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;
        let writer = csv::WriterBuilder::new().has_headers(is_empty).from_writer(file);
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }
}

impl JobSink for CsvJobLog {
    fn on_finalized(&self, record: &JobRecord) -> Result<(), SinkError> {
        let mut w = self.writer.lock();
        w.serialize(JobLogRow::from(record))?;
        w.flush()?;
        Ok(())
    }
}
