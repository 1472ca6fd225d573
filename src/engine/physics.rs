use serde::{Deserialize, Serialize};

use crate::core::domain::{ExperimentParameters, G0};

/// Thrust and combustion temperature from the analytic model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsEstimate {
    pub thrust: f64,          // kN (relative)
    pub combustion_temp: f64, // K
}

/// Closed-form performance model. Pure and deterministic.
///
/// Thrust follows `F ~ Isp * g0 * mdot`, with the mass-flow proxy growing with
/// chamber pressure and the oxidizer share `of / (1 + of)`. Combustion
/// temperature is the reference temperature plus a baseline rise and a
/// Gaussian bump centred on the stoichiometric mixture ratio, so it is
/// unimodal in O/F.
///
/// This model is the feasibility authority: the surrogate never decides
/// whether a point is thermally safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsScorer {
    pub flow_coefficient: f64,
    pub stoichiometric_ratio: f64,
    pub base_rise: f64,
    pub peak_rise: f64,
    pub mixture_width: f64,
}

impl Default for PhysicsScorer {
    fn default() -> Self {
        Self {
            flow_coefficient: 0.125,
            stoichiometric_ratio: 3.4,
            base_rise: 400.0,
            peak_rise: 1500.0,
            mixture_width: 1.2,
        }
    }
}

impl PhysicsScorer {
    pub fn score(&self, p: &ExperimentParameters) -> PhysicsEstimate {
        PhysicsEstimate {
            thrust: self.thrust(p.o_f_ratio(), p.pressure(), p.isp()),
            combustion_temp: self.combustion_temp(p.o_f_ratio(), p.temp()),
        }
    }

    #[inline]
    pub fn thrust(&self, of_ratio: f64, pressure: f64, isp: f64) -> f64 {
        let oxidizer_share = of_ratio / (1.0 + of_ratio);
        let mass_flow = pressure * self.flow_coefficient * oxidizer_share;
        isp * G0 * mass_flow
    }

    #[inline]
    pub fn combustion_temp(&self, of_ratio: f64, temp: f64) -> f64 {
        let x = (of_ratio - self.stoichiometric_ratio) / self.mixture_width;
        temp + self.base_rise + self.peak_rise * (-x * x).exp()
    }

    /// Lowest combustion temperature reachable for a given reference temperature.
    pub fn temp_floor(&self, temp: f64) -> f64 {
        temp + self.base_rise
    }
}
