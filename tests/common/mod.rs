#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use propulse::core::config::EngineConfig;
use propulse::core::domain::{ExperimentParameters, RawParameters};
use propulse::core::error::{ModelError, SinkError};
use propulse::core::validation::Validator;
use propulse::engine::evaluator::CandidateEvaluator;
use propulse::engine::physics::PhysicsScorer;
use propulse::engine::surrogate::{SurrogateAdapter, SurrogateModel};
use propulse::jobs::record::JobRecord;
use propulse::jobs::sink::JobSink;

/// Predicts a fixed multiple of the physics thrust.
pub struct ScaledPhysicsSurrogate {
    pub factor: f64,
}

impl SurrogateModel for ScaledPhysicsSurrogate {
    fn predict(&self, p: &ExperimentParameters) -> Result<f64, ModelError> {
        Ok(self.factor * PhysicsScorer::default().thrust(p.o_f_ratio(), p.pressure(), p.isp()))
    }

    fn name(&self) -> &str {
        "Scaled Physics Mock"
    }
}

/// Claims enormous thrust everywhere, including at unsafe points.
pub struct OverconfidentSurrogate;

impl SurrogateModel for OverconfidentSurrogate {
    fn predict(&self, p: &ExperimentParameters) -> Result<f64, ModelError> {
        Ok(1.0e6 + p.o_f_ratio())
    }

    fn name(&self) -> &str {
        "Overconfident Mock"
    }
}

/// Works for `healthy_calls` predictions, then fails forever.
pub struct FailingSurrogate {
    pub healthy_calls: usize,
    pub calls: AtomicUsize,
}

impl FailingSurrogate {
    pub fn new(healthy_calls: usize) -> Self {
        Self {
            healthy_calls,
            calls: AtomicUsize::new(0),
        }
    }
}

impl SurrogateModel for FailingSurrogate {
    fn predict(&self, p: &ExperimentParameters) -> Result<f64, ModelError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n >= self.healthy_calls {
            return Err(ModelError::PredictionFailed {
                model: self.name().to_string(),
                reason: "backend went away".into(),
            });
        }
        Ok(p.pressure() * p.isp())
    }

    fn name(&self) -> &str {
        "Failing Mock"
    }
}

/// Slows every evaluation down so jobs stay RUNNING long enough to observe.
pub struct SlowSurrogate {
    pub delay: Duration,
}

impl SurrogateModel for SlowSurrogate {
    fn predict(&self, p: &ExperimentParameters) -> Result<f64, ModelError> {
        thread::sleep(self.delay);
        Ok(p.pressure() * p.isp())
    }

    fn name(&self) -> &str {
        "Slow Mock"
    }
}

/// Collects every finalized record.
#[derive(Default)]
pub struct MemorySink {
    pub records: Mutex<Vec<JobRecord>>,
}

impl JobSink for MemorySink {
    fn on_finalized(&self, record: &JobRecord) -> Result<(), SinkError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

// --- Fixtures ---

/// `{O_F_ratio:3.5, pressure:5.0, temp:3000.0, isp:300.0, alpha:0.5, max_temp:4000.0}`
pub fn scenario_params() -> RawParameters {
    RawParameters::new(3.5, 5.0, 3000.0, 300.0, 0.5, 4000.0)
}

/// Ceiling below the lowest reachable combustion temperature.
pub fn unreachable_ceiling_params() -> RawParameters {
    RawParameters::new(3.5, 5.0, 50.0, 300.0, 0.5, 100.0)
}

pub fn validated(raw: &RawParameters) -> ExperimentParameters {
    Validator::default().validate(raw).expect("fixture parameters must be valid")
}

pub fn fast_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.search.max_iterations = 150;
    cfg.search.patience = 60;
    cfg.search.seed = Some(7);
    cfg.scheduler.workers = 2;
    cfg
}

/// A config whose searches effectively never end on their own.
pub fn endless_config(workers: usize) -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.search.max_iterations = 1_000_000;
    cfg.search.patience = 1_000_000;
    cfg.search.seed = Some(11);
    cfg.scheduler.workers = workers;
    cfg
}

pub fn evaluator_with(model: Option<Arc<dyn SurrogateModel>>) -> Arc<CandidateEvaluator> {
    let surrogate = match model {
        Some(m) => SurrogateAdapter::new(m),
        None => SurrogateAdapter::unavailable(),
    };
    Arc::new(CandidateEvaluator::new(PhysicsScorer::default(), surrogate))
}

pub fn physics_only() -> Arc<CandidateEvaluator> {
    evaluator_with(None)
}

pub fn slow_evaluator() -> Arc<CandidateEvaluator> {
    evaluator_with(Some(Arc::new(SlowSurrogate {
        delay: Duration::from_millis(2),
    })))
}
