use std::path::PathBuf;

use thiserror::Error;

use crate::jobs::record::JobStatus;

/// Rejected submission. Names the offending field and the bound it violated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing required field `{field}`")]
    Missing { field: &'static str },

    #[error("field `{field}` must be numeric")]
    NotNumeric { field: &'static str },

    #[error("field `{field}` must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("field `{field}` = {value} is outside {bound}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        bound: String,
    },

    #[error("`max_temp` ({max_temp}) must exceed `temp` ({temp})")]
    CeilingBelowReference { temp: f64, max_temp: f64 },
}

impl ValidationError {
    /// The request field this error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing { field }
            | Self::NotNumeric { field }
            | Self::NotFinite { field, .. }
            | Self::OutOfRange { field, .. } => field,
            Self::CeilingBelowReference { .. } => "max_temp",
        }
    }
}

/// Surrogate model failures. Always recoverable by the optimizer.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("no surrogate model is loaded")]
    ModelUnavailable,

    #[error("surrogate `{model}` failed to predict: {reason}")]
    PredictionFailed { model: String, reason: String },

    #[error("invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model artifact: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read dataset: {0}")]
    Dataset(#[from] csv::Error),
}

/// Unexpected internal failure inside one optimization run.
/// Captured into the job record as `FAILED`, never returned to the submitter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("objective produced a non-finite value at evaluation {sequence}: {detail}")]
    NonFiniteObjective { sequence: usize, detail: String },

    #[error("search invariant violated: {0}")]
    Invariant(String),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// Errors surfaced by the job scheduler API.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("invalid parameters: {0}")]
    Validation(#[from] ValidationError),

    #[error("no job with id `{0}`")]
    NotFound(String),

    #[error("scheduler is shutting down")]
    ShuttingDown,

    #[error("timed out waiting for job `{job_id}` (last status {status})")]
    WaitTimeout { job_id: String, status: JobStatus },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures writing finalized job records to a sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("job log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("job log encoding failed: {0}")]
    Csv(#[from] csv::Error),
}
