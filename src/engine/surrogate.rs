use std::fs;
use std::path::Path;
use std::sync::Arc;

use nalgebra::DVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::domain::ExperimentParameters;
use crate::core::error::ModelError;

/// A trained thrust regressor.
/// Implementations must be Thread-Safe (Sync) and immutable after load.
pub trait SurrogateModel: Send + Sync {
    /// Predicted thrust for the given parameter set.
    fn predict(&self, params: &ExperimentParameters) -> Result<f64, ModelError>;

    /// Returns the name of the model (e.g., "rf-2024-05").
    fn name(&self) -> &str;
}

// --- Linear artifact ---

/// Input features a persisted model may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    OfRatio,
    Pressure,
    Temp,
    Isp,
    PressureIsp,
}

impl Feature {
    fn extract(self, p: &ExperimentParameters) -> f64 {
        match self {
            Feature::OfRatio => p.o_f_ratio(),
            Feature::Pressure => p.pressure(),
            Feature::Temp => p.temp(),
            Feature::Isp => p.isp(),
            Feature::PressureIsp => p.pressure() * p.isp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub feature: Feature,
    pub weight: f64,
}

/// On-disk form of a linear regression model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub intercept: f64,
    pub terms: Vec<Term>,
}

/// `thrust = intercept + w . x(features)`
#[derive(Debug, Clone)]
pub struct LinearSurrogate {
    name: String,
    intercept: f64,
    features: Vec<Feature>,
    weights: DVector<f64>,
}

impl LinearSurrogate {
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelError> {
        if artifact.terms.is_empty() {
            return Err(ModelError::InvalidArtifact(format!("model `{}` has no terms", artifact.name)));
        }
        if !artifact.intercept.is_finite() || artifact.terms.iter().any(|t| !t.weight.is_finite()) {
            return Err(ModelError::InvalidArtifact(format!(
                "model `{}` has non-finite coefficients",
                artifact.name
            )));
        }

        let features = artifact.terms.iter().map(|t| t.feature).collect();
        let weights = DVector::from_iterator(artifact.terms.len(), artifact.terms.iter().map(|t| t.weight));

        Ok(Self {
            name: artifact.name,
            intercept: artifact.intercept,
            features,
            weights,
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_artifact(serde_json::from_str(&text)?)
    }

    fn feature_vector(&self, p: &ExperimentParameters) -> DVector<f64> {
        DVector::from_iterator(self.features.len(), self.features.iter().map(|f| f.extract(p)))
    }
}

impl SurrogateModel for LinearSurrogate {
    fn predict(&self, params: &ExperimentParameters) -> Result<f64, ModelError> {
        let x = self.feature_vector(params);
        Ok(self.intercept + self.weights.dot(&x))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// --- Adapter ---

/// Shared, read-only handle to the loaded model (if any).
///
/// Cloning shares the same model; nothing can mutate it after load.
#[derive(Clone, Default)]
pub struct SurrogateAdapter {
    model: Option<Arc<dyn SurrogateModel>>,
}

impl SurrogateAdapter {
    pub fn new(model: Arc<dyn SurrogateModel>) -> Self {
        Self { model: Some(model) }
    }

    pub fn unavailable() -> Self {
        Self { model: None }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(|m| m.name())
    }

    /// Fails with `ModelUnavailable` when nothing is loaded, and treats a
    /// non-finite prediction as a failed call.
    pub fn predict(&self, params: &ExperimentParameters) -> Result<f64, ModelError> {
        let model = self.model.as_deref().ok_or(ModelError::ModelUnavailable)?;
        let y = model.predict(params)?;
        if !y.is_finite() {
            return Err(ModelError::PredictionFailed {
                model: model.name().to_string(),
                reason: format!("non-finite prediction {}", y),
            });
        }
        Ok(y)
    }
}

impl std::fmt::Debug for SurrogateAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurrogateAdapter")
            .field("model", &self.model_name())
            .finish()
    }
}

// --- Model checking ---

/// One labeled row of a reference dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    #[serde(rename = "O_F_ratio")]
    pub o_f_ratio: f64,
    pub pressure: f64,
    pub temp: f64,
    pub isp: f64,
    pub thrust: f64,
}

impl LabeledSample {
    fn parameters(&self) -> ExperimentParameters {
        // Blend weight and ceiling are irrelevant to the regressor.
        ExperimentParameters::new_unchecked(self.o_f_ratio, self.pressure, self.temp, self.isp, 0.0, f64::INFINITY)
    }
}

pub fn read_dataset(path: impl AsRef<Path>) -> Result<Vec<LabeledSample>, ModelError> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<Result<Vec<LabeledSample>, _>>()?;
    Ok(rows)
}

/// Goodness of fit of a loaded model against labeled data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub samples: usize,
}

impl ModelMetrics {
    /// Returns `None` for empty or mismatched inputs.
    pub fn compute(predictions: &[f64], actuals: &[f64]) -> Option<Self> {
        if predictions.is_empty() || predictions.len() != actuals.len() {
            return None;
        }
        let n = actuals.len() as f64;
        let mean = actuals.iter().sum::<f64>() / n;

        let (abs_sum, sq_sum) = predictions
            .iter()
            .zip(actuals)
            .fold((0.0, 0.0), |(a, s), (p, y)| (a + (p - y).abs(), s + (p - y).powi(2)));
        let ss_tot: f64 = actuals.iter().map(|y| (y - mean).powi(2)).sum();

        let r2 = if ss_tot > 0.0 {
            1.0 - sq_sum / ss_tot
        } else if sq_sum == 0.0 {
            1.0
        } else {
            0.0
        };

        Some(Self {
            mae: abs_sum / n,
            rmse: (sq_sum / n).sqrt(),
            r2,
            samples: actuals.len(),
        })
    }
}

/// Scores `model` on every sample in parallel.
pub fn evaluate_model(model: &dyn SurrogateModel, samples: &[LabeledSample]) -> Result<ModelMetrics, ModelError> {
    let predictions = samples
        .par_iter()
        .map(|s| model.predict(&s.parameters()))
        .collect::<Result<Vec<f64>, _>>()?;
    let actuals: Vec<f64> = samples.iter().map(|s| s.thrust).collect();

    ModelMetrics::compute(&predictions, &actuals)
        .ok_or_else(|| ModelError::InvalidArtifact("dataset is empty".into()))
}
