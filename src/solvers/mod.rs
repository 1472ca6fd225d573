use crossbeam_channel::Sender;

use crate::core::domain::{Candidate, OptimizationResult};

/// Statistics for a single search iteration.
/// Used for progress reporting and telemetry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationStats {
    pub iteration: usize,
    pub budget: usize,
    pub best_score: Option<f64>,
    pub walker_score: f64,
    pub feasible_count: usize,

    /// Current step multiplier. Spikes above 1.0 while escaping a plateau.
    pub step_scale: f64,
}

impl IterationStats {
    /// Fraction of the iteration budget consumed, in [0, 1].
    pub fn progress(&self) -> f64 {
        if self.budget == 0 {
            return 1.0;
        }
        (self.iteration as f64 / self.budget as f64).clamp(0.0, 1.0)
    }
}

/// Events emitted by solvers to whoever supervises them.
#[derive(Debug, Clone)]
pub enum SolverEvent {
    /// Diagnostic message.
    Log(String),

    /// A completed iteration with full statistics.
    IterationUpdate(IterationStats),

    /// A feasible candidate that beats the current best.
    NewBest(Candidate),

    /// Solver has finished its run (normally or by cancellation).
    Finished,
}

/// The seam between a running search and its supervisor:
/// progress flows out, cancellation flows in.
pub trait SearchControl {
    fn report(&self, _event: SolverEvent) {}

    /// Polled at iteration boundaries only.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// No supervision: run to completion, drop all events.
pub struct Unsupervised;

impl SearchControl for Unsupervised {}

impl SearchControl for Sender<SolverEvent> {
    fn report(&self, event: SolverEvent) {
        let _ = self.send(event);
    }
}

/// How a search ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Finished(OptimizationResult),
    /// Cancellation observed after `iterations` completed iterations.
    Cancelled { iterations: usize },
}

pub mod local_search;
