use serde_json::Value;

use crate::core::bounds::{Bound, PhysicalBounds};
use crate::core::domain::{ExperimentParameters, RawParameters};
use crate::core::error::ValidationError;

/// Request field names, in canonical order.
pub const FIELDS: [&str; 6] = ["O_F_ratio", "pressure", "temp", "isp", "alpha", "max_temp"];

/// Normalizes and range-checks submissions. Pure; holds only the bound table.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    bounds: PhysicalBounds,
}

impl Validator {
    pub fn new(bounds: PhysicalBounds) -> Self {
        Self { bounds }
    }

    pub fn validate(&self, raw: &RawParameters) -> Result<ExperimentParameters, ValidationError> {
        let b = &self.bounds;
        let o_f_ratio = check("O_F_ratio", raw.o_f_ratio, &b.of_ratio)?;
        let pressure = check("pressure", raw.pressure, &b.pressure)?;
        let temp = check("temp", raw.temp, &b.temp)?;
        let isp = check("isp", raw.isp, &b.isp)?;
        let alpha = check("alpha", raw.alpha, &b.alpha)?;
        let max_temp = check("max_temp", raw.max_temp, &b.max_temp)?;

        if max_temp <= temp {
            return Err(ValidationError::CeilingBelowReference { temp, max_temp });
        }

        Ok(ExperimentParameters::new_unchecked(o_f_ratio, pressure, temp, isp, alpha, max_temp))
    }

    /// Validates a loosely typed JSON object (e.g. straight from an HTTP body).
    pub fn validate_json(&self, value: &Value) -> Result<ExperimentParameters, ValidationError> {
        self.validate(&raw_from_json(value)?)
    }
}

/// Extracts the six fields, distinguishing "absent" from "not a number".
pub fn raw_from_json(value: &Value) -> Result<RawParameters, ValidationError> {
    let mut out = [0.0; 6];
    for (slot, field) in out.iter_mut().zip(FIELDS) {
        *slot = match value.get(field) {
            None | Some(Value::Null) => return Err(ValidationError::Missing { field }),
            Some(v) => v.as_f64().ok_or(ValidationError::NotNumeric { field })?,
        };
    }
    let [o_f_ratio, pressure, temp, isp, alpha, max_temp] = out;
    Ok(RawParameters::new(o_f_ratio, pressure, temp, isp, alpha, max_temp))
}

fn check(field: &'static str, value: Option<f64>, bound: &Bound) -> Result<f64, ValidationError> {
    let value = value.ok_or(ValidationError::Missing { field })?;
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { field, value });
    }
    if !bound.contains(value) {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            bound: bound.to_string(),
        });
    }
    Ok(value)
}
