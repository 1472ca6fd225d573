use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::domain::{Candidate, ExperimentParameters, OptimizationResult, ScoringMode, TrajectorySummary};

/// Lifecycle of a job: `Queued -> Running -> {Completed | Failed | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running) | (Queued, Cancelled) | (Queued, Failed) | (Running, Completed) | (Running, Failed) | (Running, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// One optimization run's identity, lifecycle and outcome.
///
/// Transitions go through the methods below, which refuse anything the state
/// machine does not allow. Once terminal the record never changes again.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub parameters: ExperimentParameters,
    pub progress: f64,
    /// Set only when `Completed`.
    pub result: Option<Arc<OptimizationResult>>,
    /// Set only when `Failed`.
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(job_id: String, parameters: ExperimentParameters) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            parameters,
            progress: 0.0,
            result: None,
            error: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    pub fn start(&mut self) -> bool {
        if !self.transition(JobStatus::Running) {
            return false;
        }
        self.started_at = Some(Utc::now());
        true
    }

    /// Progress never moves backwards and only changes while running.
    pub fn set_progress(&mut self, progress: f64) {
        if self.status == JobStatus::Running && progress.is_finite() {
            self.progress = self.progress.max(progress.clamp(0.0, 1.0));
        }
    }

    pub fn complete(&mut self, result: Arc<OptimizationResult>) -> bool {
        if !self.transition(JobStatus::Completed) {
            return false;
        }
        self.progress = 1.0;
        self.result = Some(result);
        true
    }

    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if !self.transition(JobStatus::Failed) {
            return false;
        }
        self.error = Some(error.into());
        true
    }

    pub fn cancel(&mut self) -> bool {
        self.transition(JobStatus::Cancelled)
    }
}

// --- Views ---

/// Status query output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: f64,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&JobRecord> for StatusView {
    fn from(r: &JobRecord) -> Self {
        Self {
            job_id: r.job_id.clone(),
            status: r.status,
            progress: r.progress,
            submitted_at: r.submitted_at,
            started_at: r.started_at,
            completed_at: r.completed_at,
            error: r.error.clone(),
        }
    }
}

/// Result query output: what an explanation generator or UI consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    /// `None` is the explicit "no feasible design" marker.
    pub best_candidate: Option<Candidate>,
    pub trajectory_summary: TrajectorySummary,
    pub iterations: usize,
    pub duration: Duration,
    pub early_stopped: bool,
    pub scoring_mode: ScoringMode,
}

impl From<&OptimizationResult> for ResultSummary {
    fn from(r: &OptimizationResult) -> Self {
        Self {
            best_candidate: r.best.clone(),
            trajectory_summary: r.summary.clone(),
            iterations: r.iterations,
            duration: r.duration,
            early_stopped: r.early_stopped,
            scoring_mode: r.scoring_mode,
        }
    }
}

/// Outcome of a result query on a known job.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultView {
    Ready(Arc<OptimizationResult>),
    /// Still queued or running.
    NotReady { status: JobStatus },
    /// Terminal without a result (failed or cancelled).
    NotAvailable { status: JobStatus, error: Option<String> },
}

impl ResultView {
    pub fn from_record(r: &JobRecord) -> Self {
        match (r.status, &r.result) {
            (JobStatus::Completed, Some(result)) => ResultView::Ready(Arc::clone(result)),
            (status, _) if !status.is_terminal() => ResultView::NotReady { status },
            (status, _) => ResultView::NotAvailable {
                status,
                error: r.error.clone(),
            },
        }
    }

    pub fn summary(&self) -> Option<ResultSummary> {
        match self {
            ResultView::Ready(r) => Some(ResultSummary::from(r.as_ref())),
            _ => None,
        }
    }
}

/// Lifecycle notifications published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Queued { job_id: String },
    Started { job_id: String },
    Progress { job_id: String, progress: f64 },
    Finished { job_id: String, status: JobStatus },
}
