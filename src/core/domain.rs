use std::time::Duration;

use serde::{Deserialize, Serialize};

// --- Constants ---

/// Standard gravity (m/s^2).
pub const G0: f64 = 9.80665;

/// Reference chamber temperature used to normalize reports (K).
pub const REFERENCE_TEMP: f64 = 3000.0;

// --- Request Types ---

/// An unchecked submission as it arrives from a caller.
/// Every field is optional so the validator can name what is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawParameters {
    #[serde(rename = "O_F_ratio")]
    pub o_f_ratio: Option<f64>,
    pub pressure: Option<f64>,
    pub temp: Option<f64>,
    pub isp: Option<f64>,
    pub alpha: Option<f64>,
    pub max_temp: Option<f64>,
}

impl RawParameters {
    pub fn new(o_f_ratio: f64, pressure: f64, temp: f64, isp: f64, alpha: f64, max_temp: f64) -> Self {
        Self {
            o_f_ratio: Some(o_f_ratio),
            pressure: Some(pressure),
            temp: Some(temp),
            isp: Some(isp),
            alpha: Some(alpha),
            max_temp: Some(max_temp),
        }
    }
}

/// A validated, immutable parameter set.
///
/// Only the validator (and the optimizer, when deriving neighbours of an
/// already validated point) can construct one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExperimentParameters {
    #[serde(rename = "O_F_ratio")]
    o_f_ratio: f64,
    pressure: f64,
    temp: f64,
    isp: f64,
    alpha: f64,
    max_temp: f64,
}

impl ExperimentParameters {
    pub(crate) fn new_unchecked(
        o_f_ratio: f64,
        pressure: f64,
        temp: f64,
        isp: f64,
        alpha: f64,
        max_temp: f64,
    ) -> Self {
        Self { o_f_ratio, pressure, temp, isp, alpha, max_temp }
    }

    /// Same operator targets, different mixture ratio and chamber pressure.
    pub(crate) fn with_mixture(&self, o_f_ratio: f64, pressure: f64) -> Self {
        Self { o_f_ratio, pressure, ..*self }
    }

    pub fn o_f_ratio(&self) -> f64 { self.o_f_ratio }
    pub fn pressure(&self) -> f64 { self.pressure }
    pub fn temp(&self) -> f64 { self.temp }
    pub fn isp(&self) -> f64 { self.isp }
    pub fn alpha(&self) -> f64 { self.alpha }
    pub fn max_temp(&self) -> f64 { self.max_temp }

    pub fn to_raw(&self) -> RawParameters {
        RawParameters::new(self.o_f_ratio, self.pressure, self.temp, self.isp, self.alpha, self.max_temp)
    }
}

// --- Search Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringMode {
    /// alpha * ml + (1 - alpha) * physics
    Blended,
    /// Surrogate missing or failed; physics thrust only.
    PhysicsOnly,
}

/// One evaluated point of a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Evaluation order within the run. The anchor is 0.
    pub sequence: usize,
    pub parameters: ExperimentParameters,
    pub physics_thrust: f64,
    pub ml_thrust: Option<f64>,
    pub blended_score: f64,
    pub predicted_temp: f64,
    pub feasible: bool,
}

impl Candidate {
    /// Degrees above the ceiling; 0 when feasible.
    pub fn violation(&self) -> f64 {
        (self.predicted_temp - self.parameters.max_temp()).max(0.0)
    }

    pub fn temp_margin(&self) -> f64 {
        self.parameters.max_temp() - self.predicted_temp
    }
}

/// Baseline performance of a single parameter set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub thrust: f64,
    pub ml_thrust: Option<f64>,
    pub predicted_temp: f64,
    /// thrust / (pressure * isp)
    pub efficiency: f64,
    /// temp / REFERENCE_TEMP
    pub temperature_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrajectorySummary {
    pub evaluated: usize,
    pub retained: usize,
    pub feasible: usize,
    pub best_score: Option<f64>,
    pub mean_score: f64,
    pub min_predicted_temp: f64,
    pub max_predicted_temp: f64,
}

impl TrajectorySummary {
    /// Summarizes `trajectory`; `evaluated` may exceed its length when sampled.
    /// `best_score` comes from the selected candidate, which sampling may have
    /// dropped from the retained entries.
    pub fn from_trajectory(
        trajectory: &[Candidate],
        evaluated: usize,
        feasible: usize,
        best: Option<&Candidate>,
    ) -> Self {
        let best_score = best.map(|c| c.blended_score);
        if trajectory.is_empty() {
            return Self { evaluated, feasible, best_score, ..Default::default() };
        }

        let n = trajectory.len() as f64;
        let mean_score = trajectory.iter().map(|c| c.blended_score).sum::<f64>() / n;
        let (min_t, max_t) = trajectory.iter().fold((f64::MAX, f64::MIN), |(lo, hi), c| {
            (lo.min(c.predicted_temp), hi.max(c.predicted_temp))
        });
        Self {
            evaluated,
            retained: trajectory.len(),
            feasible,
            best_score,
            mean_score,
            min_predicted_temp: min_t,
            max_predicted_temp: max_t,
        }
    }
}

/// Terminal output of one optimizer run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    /// `None` when no evaluated candidate met the temperature ceiling.
    pub best: Option<Candidate>,
    /// Evaluated candidates in evaluation order (stride-sampled past the limit).
    pub trajectory: Vec<Candidate>,
    pub summary: TrajectorySummary,
    pub iterations: usize,
    pub duration: Duration,
    pub early_stopped: bool,
    pub scoring_mode: ScoringMode,
    /// The submitted point as evaluated before searching.
    pub anchor: SimulationReport,
    pub seed: u64,
}

impl OptimizationResult {
    pub fn is_infeasible(&self) -> bool {
        self.best.is_none()
    }
}

// --- Configuration Types ---

/// Knobs of the local search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_iterations: usize,
    /// Consecutive non-improving iterations before stopping early.
    pub patience: usize,
    pub of_ratio_step: f64,
    pub pressure_step: f64,
    /// Half-width of the O/F window around the anchor (absolute).
    pub of_ratio_radius: f64,
    /// Half-width of the pressure window around the anchor (fraction of anchor).
    pub pressure_radius: f64,
    pub trajectory_limit: usize,
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            patience: 60,
            of_ratio_step: 0.25,
            pressure_step: 0.5,
            of_ratio_radius: 2.5,
            pressure_radius: 0.5,
            trajectory_limit: 2000,
            seed: None,
        }
    }
}

/// Iteration budget handed to a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBudget {
    pub max_iterations: usize,
    pub patience: usize,
}

impl SearchBudget {
    pub fn new(max_iterations: usize, patience: usize) -> Self {
        Self { max_iterations, patience }
    }
}

impl From<&SearchConfig> for SearchBudget {
    fn from(cfg: &SearchConfig) -> Self {
        Self::new(cfg.max_iterations, cfg.patience)
    }
}
