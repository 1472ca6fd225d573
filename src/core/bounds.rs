use std::fmt;

use serde::{Deserialize, Serialize};

/// A closed or left-open interval on the real line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
    /// `true` renders the interval as `(min, max]`.
    #[serde(default)]
    pub min_exclusive: bool,
}

impl Bound {
    pub const fn closed(min: f64, max: f64) -> Self {
        Self { min, max, min_exclusive: false }
    }

    pub const fn left_open(min: f64, max: f64) -> Self {
        Self { min, max, min_exclusive: true }
    }

    pub fn contains(&self, value: f64) -> bool {
        let above = if self.min_exclusive { value > self.min } else { value >= self.min };
        above && value <= self.max
    }

    /// Smallest value the interval admits for clamping purposes.
    /// For an open lower end this sits a hair above `min`.
    pub fn floor(&self) -> f64 {
        if self.min_exclusive {
            let span = (self.max - self.min).abs().max(1.0);
            self.min + span * 1e-6
        } else {
            self.min
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.floor()).min(self.max)
    }

    /// Intersection with `[lo, hi]`. Falls back to `self` when they do not overlap.
    pub fn narrowed(&self, lo: f64, hi: f64) -> Bound {
        let min = self.floor().max(lo);
        let max = self.max.min(hi);
        if min <= max {
            Bound::closed(min, max)
        } else {
            *self
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.min_exclusive { '(' } else { '[' };
        write!(f, "{}{}, {}]", open, self.min, self.max)
    }
}

/// Absolute physical ranges accepted for each request field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalBounds {
    pub of_ratio: Bound,
    pub pressure: Bound, // relative chamber pressure units (MPa)
    pub temp: Bound,     // K
    pub isp: Bound,      // s
    pub alpha: Bound,
    pub max_temp: Bound, // K
}

impl Default for PhysicalBounds {
    fn default() -> Self {
        Self {
            of_ratio: Bound::left_open(0.0, 10.0),
            pressure: Bound::left_open(0.0, 50.0),
            temp: Bound::left_open(0.0, 6000.0),
            isp: Bound::left_open(0.0, 500.0),
            alpha: Bound::closed(0.0, 1.0),
            max_temp: Bound::left_open(0.0, 8000.0),
        }
    }
}

impl PhysicalBounds {
    pub(crate) fn is_well_formed(&self) -> bool {
        [
            self.of_ratio,
            self.pressure,
            self.temp,
            self.isp,
            self.alpha,
            self.max_temp,
        ]
        .iter()
        .all(|b| b.min.is_finite() && b.max.is_finite() && b.min < b.max)
    }
}
