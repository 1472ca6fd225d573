use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::core::bounds::PhysicalBounds;
use crate::core::domain::{
    Candidate, ExperimentParameters, OptimizationResult, ScoringMode, SearchBudget, SearchConfig,
    TrajectorySummary,
};
use crate::core::error::ExecutionError;
use crate::engine::evaluator::CandidateEvaluator;
use crate::engine::operators::{Perturber, SearchWindow};
use crate::solvers::{IterationStats, SearchControl, SearchOutcome, SolverEvent};

/// Selection order among feasible candidates. `Greater` means `a` is preferred:
/// higher blended score, then lower predicted temperature, then earlier evaluation.
pub fn selection_order(a: &Candidate, b: &Candidate) -> Ordering {
    a.blended_score
        .total_cmp(&b.blended_score)
        .then_with(|| b.predicted_temp.total_cmp(&a.predicted_temp))
        .then_with(|| b.sequence.cmp(&a.sequence))
}

/// Best feasible candidate of a finished trajectory.
pub fn select_best(trajectory: &[Candidate]) -> Option<&Candidate> {
    trajectory
        .iter()
        .filter(|c| c.feasible)
        .max_by(|a, b| selection_order(a, b))
}

/// Whether the walker should move to `trial`. Feasible points beat infeasible
/// ones; infeasible points are ranked by how far they overshoot the ceiling.
fn walker_accepts(trial: &Candidate, walker: &Candidate) -> bool {
    match (trial.feasible, walker.feasible) {
        (true, true) => trial.blended_score >= walker.blended_score,
        (true, false) => true,
        (false, true) => false,
        (false, false) => trial.violation() <= walker.violation(),
    }
}

/// Bounded local search around a submitted parameter set.
///
/// A single walker explores O/F ratio and chamber pressure within the anchor's
/// neighbourhood; isp, temp, alpha and max_temp stay fixed.
pub struct LocalSearch {
    evaluator: Arc<CandidateEvaluator>,
    bounds: PhysicalBounds,
    config: SearchConfig,
}

impl LocalSearch {
    pub fn new(evaluator: Arc<CandidateEvaluator>, bounds: PhysicalBounds, config: SearchConfig) -> Self {
        Self {
            evaluator,
            bounds,
            config,
        }
    }

    /// Runs one search. `anchor` must already be validated.
    ///
    /// Cancellation is polled before every iteration; an infeasible outcome is
    /// a normal result with `best == None`.
    pub fn optimize(
        &self,
        anchor: &ExperimentParameters,
        budget: SearchBudget,
        control: &dyn SearchControl,
    ) -> Result<SearchOutcome, ExecutionError> {
        let start_time = Instant::now();
        let seed = self.config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let window = SearchWindow::around(anchor, &self.bounds, &self.config);

        if control.is_cancelled() {
            control.report(SolverEvent::Finished);
            return Ok(SearchOutcome::Cancelled { iterations: 0 });
        }

        let mut mode = self.evaluator.initial_mode();
        if mode == ScoringMode::PhysicsOnly {
            warn!("No surrogate model loaded; scoring with physics only");
        }

        // 1. Anchor
        let (first, _) = self.score(anchor, 0, &mut mode, control)?;
        let mut state = SearchState::new(first.clone());
        let mut trajectory = TrajectoryRecorder::new(self.config.trajectory_limit);
        trajectory.push(first);
        if let Some(best) = &state.best {
            control.report(SolverEvent::NewBest(best.clone()));
        }

        let mut stagnation_counter = 0;
        let mut iterations = 0;
        let mut early_stopped = false;

        // 2. Main Loop
        for i in 1..=budget.max_iterations {
            if control.is_cancelled() {
                info!("Search cancelled after {} iterations", iterations);
                control.report(SolverEvent::Finished);
                return Ok(SearchOutcome::Cancelled { iterations });
            }

            // A. Perturb (wider steps once the plateau lasts half the patience window)
            let step_scale = if stagnation_counter > budget.patience / 2 { 2.0 } else { 1.0 };
            let trial_params = Perturber::new()
                .of_ratio(self.config.of_ratio_step)
                .pressure(self.config.pressure_step)
                .widen(step_scale)
                .apply(&state.walker.parameters, &window, &mut rng);

            // B. Evaluate
            let (trial, degraded) = self.score(&trial_params, i, &mut mode, control)?;
            if degraded && state.rescore(&self.evaluator, &mut trajectory) {
                if let Some(best) = &state.best {
                    control.report(SolverEvent::NewBest(best.clone()));
                }
            }

            // C. Record
            match state.offer(&trial) {
                Offer::NewBest => {
                    stagnation_counter = 0;
                    debug!(
                        "New best at evaluation {}: score {:.3}, T_c {:.1} K",
                        trial.sequence, trial.blended_score, trial.predicted_temp
                    );
                    control.report(SolverEvent::NewBest(trial.clone()));
                }
                Offer::CloserToFeasible => stagnation_counter = 0,
                Offer::NoImprovement => stagnation_counter += 1,
            }

            // D. Move walker
            if walker_accepts(&trial, &state.walker) {
                state.walker = trial.clone();
            }
            trajectory.push(trial);
            iterations = i;

            control.report(SolverEvent::IterationUpdate(IterationStats {
                iteration: i,
                budget: budget.max_iterations,
                best_score: state.best.as_ref().map(|c| c.blended_score),
                walker_score: state.walker.blended_score,
                feasible_count: state.feasible_count,
                step_scale,
            }));

            if budget.patience > 0 && stagnation_counter >= budget.patience {
                early_stopped = true;
                debug!("Early stop: no improvement for {} iterations", stagnation_counter);
                break;
            }
        }

        // 3. Finalize
        if let Some(best) = &state.best {
            if !(best.predicted_temp <= best.parameters.max_temp()) {
                return Err(ExecutionError::Invariant(format!(
                    "selected candidate {} exceeds the temperature ceiling ({} > {})",
                    best.sequence,
                    best.predicted_temp,
                    best.parameters.max_temp()
                )));
            }
        }

        let evaluated = iterations + 1;
        let kept = trajectory.into_inner();
        let summary = TrajectorySummary::from_trajectory(&kept, evaluated, state.feasible_count, state.best.as_ref());

        let result = OptimizationResult {
            best: state.best,
            trajectory: kept,
            summary,
            iterations,
            duration: start_time.elapsed(),
            early_stopped,
            scoring_mode: mode,
            anchor: self.evaluator.simulate(anchor),
            seed,
        };

        info!(
            "Search finished: {} iterations, {} feasible, best {}",
            result.iterations,
            result.summary.feasible,
            result
                .best
                .as_ref()
                .map_or_else(|| "none".to_string(), |b| format!("{:.3}", b.blended_score))
        );
        control.report(SolverEvent::Finished);

        Ok(SearchOutcome::Finished(result))
    }

    /// Evaluates one point, switching the run to physics-only scoring if the
    /// surrogate fails. Returns whether that switch happened on this call.
    fn score(
        &self,
        p: &ExperimentParameters,
        sequence: usize,
        mode: &mut ScoringMode,
        control: &dyn SearchControl,
    ) -> Result<(Candidate, bool), ExecutionError> {
        let (candidate, degraded) = match self.evaluator.evaluate(p, sequence, *mode) {
            Ok(c) => (c, false),
            Err(e) => {
                warn!("Surrogate failed at evaluation {}: {}. Continuing with physics only", sequence, e);
                control.report(SolverEvent::Log(format!("Surrogate degraded: {}", e)));
                *mode = ScoringMode::PhysicsOnly;
                (self.evaluator.evaluate_physics_only(p, sequence), true)
            }
        };

        if !candidate.blended_score.is_finite() || !candidate.predicted_temp.is_finite() {
            return Err(ExecutionError::NonFiniteObjective {
                sequence,
                detail: format!(
                    "score {} / temperature {}",
                    candidate.blended_score, candidate.predicted_temp
                ),
            });
        }
        Ok((candidate, degraded))
    }
}

// --- Helpers ---

enum Offer {
    NewBest,
    CloserToFeasible,
    NoImprovement,
}

struct SearchState {
    walker: Candidate,
    best: Option<Candidate>,
    /// Smallest overshoot seen while nothing is feasible.
    min_violation: f64,
    feasible_count: usize,
}

impl SearchState {
    fn new(anchor: Candidate) -> Self {
        let mut state = Self {
            walker: anchor.clone(),
            best: None,
            min_violation: f64::INFINITY,
            feasible_count: 0,
        };
        state.offer(&anchor);
        state
    }

    fn offer(&mut self, c: &Candidate) -> Offer {
        if !c.feasible {
            if self.best.is_none() && c.violation() < self.min_violation {
                self.min_violation = c.violation();
                return Offer::CloserToFeasible;
            }
            return Offer::NoImprovement;
        }

        self.feasible_count += 1;
        let better = match &self.best {
            Some(b) => selection_order(c, b) == Ordering::Greater,
            None => true,
        };
        if better {
            self.best = Some(c.clone());
            Offer::NewBest
        } else {
            Offer::NoImprovement
        }
    }

    /// Moves the whole run onto physics-only scores: walker, retained
    /// trajectory and best. The best is re-selected under the new scores;
    /// returns whether a different candidate won.
    fn rescore(&mut self, evaluator: &CandidateEvaluator, trajectory: &mut TrajectoryRecorder) -> bool {
        self.walker = evaluator.rescore_physics_only(&self.walker);
        trajectory.rescore(evaluator);

        let previous = self.best.as_ref().map(|b| b.sequence);
        let carried = self.best.as_ref().map(|b| evaluator.rescore_physics_only(b));
        self.best = carried
            .into_iter()
            .chain(select_best(trajectory.retained()).cloned())
            .max_by(selection_order);
        self.best.as_ref().map(|b| b.sequence) != previous
    }
}

/// Keeps at most `limit` candidates in evaluation order by repeatedly
/// dropping every other entry and doubling the sampling stride.
struct TrajectoryRecorder {
    limit: usize,
    stride: usize,
    seen: usize,
    kept: Vec<Candidate>,
}

impl TrajectoryRecorder {
    fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(2),
            stride: 1,
            seen: 0,
            kept: Vec::new(),
        }
    }

    fn push(&mut self, c: Candidate) {
        if self.seen % self.stride == 0 {
            self.kept.push(c);
            if self.kept.len() > self.limit {
                self.kept = std::mem::take(&mut self.kept).into_iter().step_by(2).collect();
                self.stride *= 2;
            }
        }
        self.seen += 1;
    }

    fn retained(&self) -> &[Candidate] {
        &self.kept
    }

    fn rescore(&mut self, evaluator: &CandidateEvaluator) {
        for c in &mut self.kept {
            *c = evaluator.rescore_physics_only(c);
        }
    }

    fn into_inner(self) -> Vec<Candidate> {
        self.kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(sequence: usize, score: f64, temp: f64, feasible: bool) -> Candidate {
        let p = ExperimentParameters::new_unchecked(3.5, 5.0, 3000.0, 300.0, 0.5, 4000.0);
        Candidate {
            sequence,
            parameters: p,
            physics_thrust: score,
            ml_thrust: None,
            blended_score: score,
            predicted_temp: temp,
            feasible,
        }
    }

    #[test]
    fn recorder_keeps_order_and_limit() {
        let mut rec = TrajectoryRecorder::new(8);
        for i in 0..100 {
            rec.push(candidate(i, 1.0, 3000.0, true));
        }
        let kept = rec.into_inner();
        assert!(kept.len() <= 8);
        assert_eq!(kept[0].sequence, 0);
        assert!(kept.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[test]
    fn walker_prefers_smaller_violation() {
        let far = candidate(1, 10.0, 5000.0, false);
        let near = candidate(2, 5.0, 4100.0, false);
        assert!(walker_accepts(&near, &far));
        assert!(!walker_accepts(&far, &near));
    }

    #[test]
    fn state_counts_feasible_and_tracks_best() {
        let mut state = SearchState::new(candidate(0, 1.0, 4500.0, false));
        assert!(state.best.is_none());
        assert!(matches!(state.offer(&candidate(1, 2.0, 3900.0, true)), Offer::NewBest));
        assert!(matches!(state.offer(&candidate(2, 1.5, 3800.0, true)), Offer::NoImprovement));
        assert_eq!(state.feasible_count, 2);
        assert_eq!(state.best.as_ref().map(|b| b.sequence), Some(1));
    }

    #[test]
    fn degradation_reselects_best_under_physics_scores() {
        let blended = |sequence, ml, physics| Candidate {
            ml_thrust: Some(ml),
            blended_score: 0.5 * ml + 0.5 * physics,
            ..candidate(sequence, physics, 3900.0, true)
        };
        // The model favoured 1; physics alone favours 2.
        let mut trajectory = TrajectoryRecorder::new(16);
        trajectory.push(candidate(0, 1.0, 4500.0, false));
        trajectory.push(blended(1, 900.0, 100.0));
        trajectory.push(blended(2, 100.0, 300.0));

        let mut state = SearchState::new(candidate(0, 1.0, 4500.0, false));
        state.offer(&trajectory.retained()[1]);
        state.offer(&trajectory.retained()[2]);
        assert_eq!(state.best.as_ref().map(|b| b.sequence), Some(1));

        let changed = state.rescore(&CandidateEvaluator::default(), &mut trajectory);
        assert!(changed);

        let best = state.best.as_ref().unwrap();
        assert_eq!(best.sequence, 2);
        assert_eq!(best.blended_score, 300.0);
        assert!(trajectory.retained().iter().all(|c| c.ml_thrust.is_none()));
        assert_eq!(select_best(trajectory.retained()).map(|c| c.sequence), Some(2));
    }
}
