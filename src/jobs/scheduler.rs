use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex, RwLock};
use uuid::Uuid;

use crate::core::config::{EngineConfig, SchedulerConfig};
use crate::core::domain::{ExperimentParameters, RawParameters, SearchBudget};
use crate::core::error::{ExecutionError, SchedulerError};
use crate::core::validation::Validator;
use crate::engine::evaluator::CandidateEvaluator;
use crate::jobs::record::{JobEvent, JobRecord, JobStatus, ResultView, StatusView};
use crate::jobs::sink::JobSink;
use crate::solvers::local_search::LocalSearch;
use crate::solvers::{SearchControl, SearchOutcome, SolverEvent};

/// What `cancel` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Was queued; now `Cancelled` and will never run.
    Cancelled,
    /// Is running; the worker stops at the next iteration boundary.
    CancellationRequested,
    /// Already finished; nothing changed.
    AlreadyTerminal(JobStatus),
}

/// A job as shared between its owning worker and readers.
struct JobEntry {
    record: Mutex<JobRecord>,
    cancel_requested: AtomicBool,
    finished: Condvar,
}

impl JobEntry {
    fn new(record: JobRecord) -> Self {
        Self {
            record: Mutex::new(record),
            cancel_requested: AtomicBool::new(false),
            finished: Condvar::new(),
        }
    }
}

#[derive(Default)]
struct JobTable {
    by_id: HashMap<String, Arc<JobEntry>>,
    order: Vec<String>, // submission order
}

enum WorkerMessage {
    Run(Arc<JobEntry>),
    Shutdown,
}

/// State shared by the scheduler handle and every worker thread.
struct Shared {
    table: RwLock<JobTable>,
    search: LocalSearch,
    budget: SearchBudget,
    sinks: Vec<Arc<dyn JobSink>>,
    subscribers: Mutex<Vec<Sender<JobEvent>>>,
}

impl Shared {
    fn publish(&self, event: JobEvent) {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Wakes waiters and hands the final snapshot to the sinks.
    fn finalize(&self, entry: &JobEntry, snapshot: JobRecord) {
        entry.finished.notify_all();
        for sink in &self.sinks {
            // A misbehaving sink must not take the worker thread down with it.
            match panic::catch_unwind(AssertUnwindSafe(|| sink.on_finalized(&snapshot))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Job sink failed for {}: {}", snapshot.job_id, e),
                Err(payload) => error!(
                    "Job sink panicked for {}: {}",
                    snapshot.job_id,
                    panic_message(payload.as_ref())
                ),
            }
        }
        self.publish(JobEvent::Finished {
            job_id: snapshot.job_id,
            status: snapshot.status,
        });
    }
}

/// Bridges a running search to its job record.
struct JobControl<'a> {
    shared: &'a Shared,
    entry: &'a JobEntry,
    job_id: &'a str,
}

impl SearchControl for JobControl<'_> {
    fn report(&self, event: SolverEvent) {
        match event {
            SolverEvent::IterationUpdate(stats) => {
                let progress = {
                    let mut rec = self.entry.record.lock();
                    rec.set_progress(stats.progress());
                    rec.progress
                };
                self.shared.publish(JobEvent::Progress {
                    job_id: self.job_id.to_string(),
                    progress,
                });
            }
            SolverEvent::Log(msg) => debug!("[{}] {}", self.job_id, msg),
            SolverEvent::NewBest(_) | SolverEvent::Finished => {}
        }
    }

    fn is_cancelled(&self) -> bool {
        self.entry.cancel_requested.load(Ordering::Acquire)
    }
}

/// Bounded pool of optimizer workers fed by a FIFO queue.
///
/// `submit` only validates and enqueues; reads never wait on a running job.
/// Dropping the scheduler cancels outstanding work and joins the workers.
pub struct JobScheduler {
    shared: Arc<Shared>,
    validator: Validator,
    config: SchedulerConfig,
    queue: Sender<WorkerMessage>,
    workers: Vec<JoinHandle<()>>,
    shutting_down: AtomicBool,
}

impl JobScheduler {
    pub fn new(config: &EngineConfig, evaluator: Arc<CandidateEvaluator>) -> Result<Self, SchedulerError> {
        Self::with_sinks(config, evaluator, Vec::new())
    }

    pub fn with_sinks(
        config: &EngineConfig,
        evaluator: Arc<CandidateEvaluator>,
        sinks: Vec<Arc<dyn JobSink>>,
    ) -> Result<Self, SchedulerError> {
        let shared = Arc::new(Shared {
            table: RwLock::new(JobTable::default()),
            search: LocalSearch::new(evaluator, config.bounds.clone(), config.search.clone()),
            budget: SearchBudget::from(&config.search),
            sinks,
            subscribers: Mutex::new(Vec::new()),
        });

        let (tx, rx) = unbounded();
        let n = config.scheduler.workers.max(1);
        let mut workers = Vec::with_capacity(n);
        for i in 0..n {
            let shared = Arc::clone(&shared);
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("Optimizer-Worker-{}", i))
                .spawn(move || worker_loop(shared, rx))?;
            workers.push(handle);
        }
        info!("Scheduler started with {} workers", n);

        Ok(Self {
            shared,
            validator: Validator::new(config.bounds.clone()),
            config: config.scheduler.clone(),
            queue: tx,
            workers,
            shutting_down: AtomicBool::new(false),
        })
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Validates and enqueues. Invalid input creates no job record.
    pub fn submit(&self, raw: &RawParameters) -> Result<String, SchedulerError> {
        let params = self.validator.validate(raw)?;
        self.submit_validated(params)
    }

    pub fn submit_validated(&self, params: ExperimentParameters) -> Result<String, SchedulerError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(SchedulerError::ShuttingDown);
        }

        let job_id = Uuid::new_v4().to_string();
        let entry = Arc::new(JobEntry::new(JobRecord::new(job_id.clone(), params)));
        {
            let mut table = self.shared.table.write();
            table.by_id.insert(job_id.clone(), Arc::clone(&entry));
            table.order.push(job_id.clone());
        }

        // Announce before enqueueing so `Queued` always precedes `Started`.
        info!("Job {} queued", job_id);
        self.shared.publish(JobEvent::Queued { job_id: job_id.clone() });
        if self.queue.send(WorkerMessage::Run(entry)).is_err() {
            self.remove(&job_id);
            return Err(SchedulerError::ShuttingDown);
        }
        Ok(job_id)
    }

    pub fn get_status(&self, job_id: &str) -> Result<StatusView, SchedulerError> {
        let entry = self.lookup(job_id)?;
        let rec = entry.record.lock();
        Ok(StatusView::from(&*rec))
    }

    pub fn get_result(&self, job_id: &str) -> Result<ResultView, SchedulerError> {
        let entry = self.lookup(job_id)?;
        let rec = entry.record.lock();
        Ok(ResultView::from_record(&rec))
    }

    /// Full snapshot of one record.
    pub fn get_record(&self, job_id: &str) -> Result<JobRecord, SchedulerError> {
        let entry = self.lookup(job_id)?;
        let rec = entry.record.lock();
        Ok(rec.clone())
    }

    pub fn cancel(&self, job_id: &str) -> Result<CancelOutcome, SchedulerError> {
        let entry = self.lookup(job_id)?;
        Ok(self.cancel_entry(&entry))
    }

    fn cancel_entry(&self, entry: &JobEntry) -> CancelOutcome {
        let mut rec = entry.record.lock();
        match rec.status {
            JobStatus::Queued => {
                // No worker owns it yet, so the caller finalizes it.
                entry.cancel_requested.store(true, Ordering::Release);
                rec.cancel();
                let snapshot = rec.clone();
                drop(rec);
                info!("Job {} cancelled before start", snapshot.job_id);
                self.shared.finalize(entry, snapshot);
                CancelOutcome::Cancelled
            }
            JobStatus::Running => {
                entry.cancel_requested.store(true, Ordering::Release);
                info!("Cancellation requested for running job {}", rec.job_id);
                CancelOutcome::CancellationRequested
            }
            status => CancelOutcome::AlreadyTerminal(status),
        }
    }

    /// Blocks until the job is terminal or `timeout` elapses.
    pub fn wait(&self, job_id: &str, timeout: Duration) -> Result<StatusView, SchedulerError> {
        let entry = self.lookup(job_id)?;
        // `None` when the timeout is too large to represent: wait without a deadline.
        let deadline = Instant::now().checked_add(timeout);
        let mut rec = entry.record.lock();
        while !rec.status.is_terminal() {
            let Some(deadline) = deadline else {
                entry.finished.wait(&mut rec);
                continue;
            };
            if entry.finished.wait_until(&mut rec, deadline).timed_out() && !rec.status.is_terminal() {
                return Err(SchedulerError::WaitTimeout {
                    job_id: job_id.to_string(),
                    status: rec.status,
                });
            }
        }
        Ok(StatusView::from(&*rec))
    }

    /// Snapshots of every retained job, in submission order.
    pub fn list_jobs(&self) -> Vec<StatusView> {
        let table = self.shared.table.read();
        table
            .order
            .iter()
            .filter_map(|id| table.by_id.get(id))
            .map(|e| StatusView::from(&*e.record.lock()))
            .collect()
    }

    /// Lifecycle events for every job submitted from now on.
    pub fn subscribe(&self) -> Receiver<JobEvent> {
        let (tx, rx) = unbounded();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Drops terminal jobs that finished more than `older_than` ago.
    pub fn evict_finished(&self, older_than: chrono::Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut table = self.shared.table.write();
        let before = table.by_id.len();

        table.by_id.retain(|_, e| {
            let rec = e.record.lock();
            !(rec.status.is_terminal() && rec.completed_at.map_or(false, |t| t < cutoff))
        });
        let JobTable { by_id, order } = &mut *table;
        order.retain(|id| by_id.contains_key(id));

        let evicted = before - table.by_id.len();
        if evicted > 0 {
            debug!("Evicted {} finished jobs", evicted);
        }
        evicted
    }

    /// Applies the configured retention window.
    pub fn evict_expired(&self) -> usize {
        self.evict_finished(chrono::Duration::hours(self.config.retention_hours))
    }

    /// Stops intake, cancels outstanding jobs and joins every worker.
    pub fn shutdown(&mut self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let pending: Vec<Arc<JobEntry>> = self.shared.table.read().by_id.values().cloned().collect();
        for entry in &pending {
            self.cancel_entry(entry);
        }

        for _ in &self.workers {
            let _ = self.queue.send(WorkerMessage::Shutdown);
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread panicked during shutdown");
            }
        }
        info!("Scheduler stopped");
    }

    fn lookup(&self, job_id: &str) -> Result<Arc<JobEntry>, SchedulerError> {
        self.shared
            .table
            .read()
            .by_id
            .get(job_id)
            .cloned()
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))
    }

    fn remove(&self, job_id: &str) {
        let mut table = self.shared.table.write();
        table.by_id.remove(job_id);
        table.order.retain(|id| id != job_id);
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// --- Worker ---

fn worker_loop(shared: Arc<Shared>, rx: Receiver<WorkerMessage>) {
    for msg in rx.iter() {
        match msg {
            WorkerMessage::Run(entry) => run_job(&shared, &entry),
            WorkerMessage::Shutdown => break,
        }
    }
}

fn run_job(shared: &Shared, entry: &JobEntry) {
    let (job_id, params) = {
        let mut rec = entry.record.lock();
        if !rec.start() {
            // Cancelled while queued.
            return;
        }
        (rec.job_id.clone(), rec.parameters)
    };
    info!("Job {} started", job_id);
    shared.publish(JobEvent::Started { job_id: job_id.clone() });

    let control = JobControl {
        shared,
        entry,
        job_id: &job_id,
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        shared.search.optimize(&params, shared.budget, &control)
    }));

    let mut rec = entry.record.lock();
    let cancelled = entry.cancel_requested.load(Ordering::Acquire);
    match outcome {
        Ok(Ok(SearchOutcome::Finished(_))) | Ok(Ok(SearchOutcome::Cancelled { .. })) if cancelled => {
            rec.cancel();
        }
        Ok(Ok(SearchOutcome::Finished(result))) => {
            rec.complete(Arc::new(result));
        }
        Ok(Ok(SearchOutcome::Cancelled { .. })) => {
            rec.cancel();
        }
        Ok(Err(e)) => {
            error!("Job {} failed: {}", job_id, e);
            rec.fail(e.to_string());
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            error!("Job {} panicked: {}", job_id, msg);
            rec.fail(ExecutionError::Panicked(msg).to_string());
        }
    }
    let snapshot = rec.clone();
    drop(rec);

    info!("Job {} finished with status {}", job_id, snapshot.status);
    shared.finalize(entry, snapshot);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
