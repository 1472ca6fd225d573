use crate::core::domain::{Candidate, ExperimentParameters, ScoringMode, SimulationReport, REFERENCE_TEMP};
use crate::core::error::ModelError;
use crate::engine::physics::PhysicsScorer;
use crate::engine::surrogate::SurrogateAdapter;

/// Typed weighted sum of the two thrust producers.
#[inline]
pub fn blend(alpha: f64, ml_thrust: f64, physics_thrust: f64) -> f64 {
    alpha * ml_thrust + (1.0 - alpha) * physics_thrust
}

/// Turns parameter sets into scored `Candidate`s.
/// Feasibility always comes from the physics model.
#[derive(Debug, Clone, Default)]
pub struct CandidateEvaluator {
    physics: PhysicsScorer,
    surrogate: SurrogateAdapter,
}

impl CandidateEvaluator {
    pub fn new(physics: PhysicsScorer, surrogate: SurrogateAdapter) -> Self {
        Self { physics, surrogate }
    }

    /// Scoring mode a fresh run starts in.
    pub fn initial_mode(&self) -> ScoringMode {
        if self.surrogate.is_available() {
            ScoringMode::Blended
        } else {
            ScoringMode::PhysicsOnly
        }
    }

    pub fn evaluate(
        &self,
        p: &ExperimentParameters,
        sequence: usize,
        mode: ScoringMode,
    ) -> Result<Candidate, ModelError> {
        match mode {
            ScoringMode::PhysicsOnly => Ok(self.evaluate_physics_only(p, sequence)),
            ScoringMode::Blended => {
                let ml = self.surrogate.predict(p)?;
                Ok(self.build(p, sequence, Some(ml)))
            }
        }
    }

    pub fn evaluate_physics_only(&self, p: &ExperimentParameters, sequence: usize) -> Candidate {
        self.build(p, sequence, None)
    }

    /// Drops the surrogate contribution from an already evaluated candidate.
    pub fn rescore_physics_only(&self, c: &Candidate) -> Candidate {
        Candidate {
            ml_thrust: None,
            blended_score: c.physics_thrust,
            ..c.clone()
        }
    }

    /// Baseline report for a single point; the surrogate figure is best-effort.
    pub fn simulate(&self, p: &ExperimentParameters) -> SimulationReport {
        let est = self.physics.score(p);
        SimulationReport {
            thrust: est.thrust,
            ml_thrust: self.surrogate.predict(p).ok(),
            predicted_temp: est.combustion_temp,
            efficiency: est.thrust / (p.pressure() * p.isp()),
            temperature_ratio: p.temp() / REFERENCE_TEMP,
        }
    }

    fn build(&self, p: &ExperimentParameters, sequence: usize, ml_thrust: Option<f64>) -> Candidate {
        let est = self.physics.score(p);
        let blended_score = match ml_thrust {
            Some(ml) => blend(p.alpha(), ml, est.thrust),
            None => est.thrust,
        };

        Candidate {
            sequence,
            parameters: *p,
            physics_thrust: est.thrust,
            ml_thrust,
            blended_score,
            predicted_temp: est.combustion_temp,
            feasible: est.combustion_temp <= p.max_temp(),
        }
    }
}
