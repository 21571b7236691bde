//! Serving side: a prediction capability and a pass-through request handler.
//!
//! The model itself lives outside this crate. Anything that can classify a
//! piece of text implements [`Predictor`]; [`PredictionHandler`] owns one and
//! turns JSON requests into JSON responses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PredictError;

const DISTRIBUTION_TOLERANCE: f64 = 1e-6;

/// The outcome of classifying one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
    pub distribution: BTreeMap<String, f64>,
}

impl Prediction {
    /// Validate a label→probability map and pick its most likely label.
    ///
    /// Ties resolve to the first label in name order.
    pub fn from_distribution(distribution: BTreeMap<String, f64>) -> Result<Self, PredictError> {
        if distribution.is_empty() {
            return Err(PredictError::InvalidDistribution(
                "no labels".to_string(),
            ));
        }
        if let Some((label, p)) = distribution
            .iter()
            .find(|(_, p)| !p.is_finite() || !(0.0..=1.0).contains(*p))
        {
            return Err(PredictError::InvalidDistribution(format!(
                "probability {} for {:?} is outside [0, 1]",
                p, label
            )));
        }
        let total: f64 = distribution.values().sum();
        if (total - 1.0).abs() > DISTRIBUTION_TOLERANCE {
            return Err(PredictError::InvalidDistribution(format!(
                "probabilities sum to {}",
                total
            )));
        }

        let (label, confidence) = distribution
            .iter()
            .fold(None::<(&String, f64)>, |best, (label, &p)| match best {
                Some((_, best_p)) if best_p >= p => best,
                _ => Some((label, p)),
            })
            .map(|(label, p)| (label.clone(), p))
            .ok_or_else(|| PredictError::InvalidDistribution("no labels".to_string()))?;

        Ok(Self {
            label,
            confidence,
            distribution,
        })
    }
}

/// A pre-trained classifier.
pub trait Predictor: Send + Sync {
    fn predict(&self, text: &str) -> Result<Prediction, PredictError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub sentiment: String,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
}

impl From<Prediction> for PredictResponse {
    fn from(prediction: Prediction) -> Self {
        Self {
            sentiment: prediction.label,
            confidence: prediction.confidence,
            probabilities: prediction.distribution,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Forwards requests to the injected predictor.
pub struct PredictionHandler<P> {
    predictor: P,
}

impl<P: Predictor> PredictionHandler<P> {
    pub fn new(predictor: P) -> Self {
        Self { predictor }
    }

    pub fn handle(&self, request: &PredictRequest) -> Result<PredictResponse, PredictError> {
        if request.text.trim().is_empty() {
            return Err(PredictError::EmptyText);
        }
        let prediction = self.predictor.predict(&request.text)?;
        Ok(prediction.into())
    }

    /// JSON in, `(status, JSON body)` out.
    pub fn handle_json(&self, body: &str) -> (u16, String) {
        let request: PredictRequest = match serde_json::from_str(body) {
            Ok(request) => request,
            Err(e) => return error_response(400, format!("invalid request body: {}", e)),
        };

        match self.handle(&request) {
            Ok(response) => match serde_json::to_string(&response) {
                Ok(body) => (200, body),
                Err(e) => error_response(500, e.to_string()),
            },
            Err(e @ PredictError::EmptyText) => error_response(400, e.to_string()),
            Err(e) => {
                log::error!("Prediction failed: {}", e);
                error_response(500, e.to_string())
            }
        }
    }
}

fn error_response(status: u16, message: String) -> (u16, String) {
    let body = serde_json::to_string(&ErrorBody { error: message })
        .unwrap_or_else(|_| "{\"error\":\"internal error\"}".to_string());
    (status, body)
}
