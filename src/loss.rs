//! Loss functions and their gradients with respect to the prediction.
//!
//! The gradient of the loss is the error handed to the last layer's
//! backward pass. Inputs to the cross-entropy losses are expected to be
//! probabilities already clipped away from 0 and 1.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    #[default]
    MeanSquaredError,
    CategoricalCrossentropy,
    BinaryCrossentropy,
}

impl LossType {
    /// Scalar loss of `predicted` against `truth`.
    pub fn loss(self, truth: &[f64], predicted: &[f64]) -> Result<f64> {
        ensure_len("loss", truth.len(), predicted.len())?;
        let n = truth.len().max(1) as f64;
        let pairs = truth.iter().zip(predicted);
        Ok(match self {
            LossType::MeanSquaredError => pairs.map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n,
            LossType::CategoricalCrossentropy => -pairs.map(|(t, p)| t * p.ln()).sum::<f64>(),
            LossType::BinaryCrossentropy => {
                -pairs
                    .map(|(t, p)| t * p.ln() + (1.0 - t) * (1.0 - p).ln())
                    .sum::<f64>()
                    / n
            }
        })
    }

    /// ∂loss/∂predicted.
    pub fn gradient(self, truth: &[f64], predicted: &[f64]) -> Result<Vec<f64>> {
        ensure_len("loss", truth.len(), predicted.len())?;
        let n = truth.len().max(1) as f64;
        let pairs = truth.iter().zip(predicted);
        Ok(match self {
            LossType::MeanSquaredError => pairs.map(|(t, p)| 2.0 * (p - t) / n).collect(),
            LossType::CategoricalCrossentropy => pairs.map(|(t, p)| -t / p).collect(),
            LossType::BinaryCrossentropy => pairs
                .map(|(t, p)| -(t / p - (1.0 - t) / (1.0 - p)) / n)
                .collect(),
        })
    }
}
