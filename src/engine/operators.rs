use rand::Rng;

use crate::core::bounds::{Bound, PhysicalBounds};
use crate::core::domain::{ExperimentParameters, SearchConfig};

/// The region a search may explore: the anchor's neighbourhood,
/// intersected with the physical bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchWindow {
    pub of_ratio: Bound,
    pub pressure: Bound,
}

impl SearchWindow {
    pub fn around(anchor: &ExperimentParameters, bounds: &PhysicalBounds, cfg: &SearchConfig) -> Self {
        let of = anchor.o_f_ratio();
        let p = anchor.pressure();
        let dp = p * cfg.pressure_radius;

        Self {
            of_ratio: bounds.of_ratio.narrowed(of - cfg.of_ratio_radius, of + cfg.of_ratio_radius),
            pressure: bounds.pressure.narrowed(p - dp, p + dp),
        }
    }

    pub fn contains(&self, p: &ExperimentParameters) -> bool {
        self.of_ratio.contains(p.o_f_ratio()) && self.pressure.contains(p.pressure())
    }
}

/// A composable perturbation builder for the mutable dimensions
/// (mixture ratio and chamber pressure). Everything else is an operator
/// target and is carried through untouched.
#[derive(Clone, Debug)]
pub struct Perturber {
    of_ratio_step: Option<f64>, // Max |delta O/F|
    pressure_step: Option<f64>, // Max |delta p|
    scale: f64,                 // Step multiplier
}

impl Default for Perturber {
    fn default() -> Self {
        Self::new()
    }
}

impl Perturber {
    pub fn new() -> Self {
        Self {
            of_ratio_step: None,
            pressure_step: None,
            scale: 1.0,
        }
    }

    pub fn of_ratio(mut self, max_step: f64) -> Self {
        self.of_ratio_step = Some(max_step);
        self
    }

    pub fn pressure(mut self, max_step: f64) -> Self {
        self.pressure_step = Some(max_step);
        self
    }

    pub fn widen(mut self, factor: f64) -> Self {
        self.scale = factor;
        self
    }

    pub fn apply(&self, p: &ExperimentParameters, window: &SearchWindow, rng: &mut impl Rng) -> ExperimentParameters {
        let mut of = p.o_f_ratio();
        let mut pressure = p.pressure();

        if let Some(step) = self.of_ratio_step {
            of += uniform_step(step * self.scale, rng);
        }
        if let Some(step) = self.pressure_step {
            pressure += uniform_step(step * self.scale, rng);
        }

        p.with_mixture(window.of_ratio.clamp(of), window.pressure.clamp(pressure))
    }
}

fn uniform_step(mag: f64, rng: &mut impl Rng) -> f64 {
    if mag > 0.0 {
        rng.gen_range(-mag..=mag)
    } else {
        0.0
    }
}
