//! Configuration structures for training
//!
//! This module provides the training configuration read from JSON files:
//! epochs, learning rate, optimizer choice and its hyper-parameters, and how
//! samples are grouped into updates.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{NetworkError, Result};
use crate::optimizers::{AdamConfig, Optimizer, OptimizerType};

/// How samples are grouped into optimizer steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    /// One update per sample, in data order.
    #[default]
    Sgd,
    /// Gradients summed over a shuffled batch, one update per batch.
    Minibatch,
}

fn default_batch_size() -> usize {
    64
}

fn default_beta1() -> f64 {
    AdamConfig::default().beta1
}

fn default_beta2() -> f64 {
    AdamConfig::default().beta2
}

fn default_epsilon() -> f64 {
    AdamConfig::default().epsilon
}

/// Training configuration.
///
/// Only `epochs`, `learning_rate` and `optimizer` are required; everything
/// else falls back to a default:
///
/// - `mode`: `"sgd"`
/// - `batch_size`: 64 (minibatch mode only)
/// - `beta1` / `beta2` / `epsilon`: 0.9 / 0.999 / 1e-8 (Adam only)
/// - `seed`: none
///
/// # Example
///
/// ```json
/// {
///   "epochs": 20,
///   "learning_rate": 0.001,
///   "optimizer": "adam",
///   "mode": "minibatch",
///   "batch_size": 32
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub optimizer: OptimizerType,
    #[serde(default)]
    pub mode: TrainingMode,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_beta1")]
    pub beta1: f64,
    #[serde(default = "default_beta2")]
    pub beta2: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl TrainingConfig {
    /// Per-sample training with default Adam hyper-parameters.
    pub fn new(epochs: usize, learning_rate: f64, optimizer: OptimizerType) -> Self {
        let adam = AdamConfig::default();
        Self {
            epochs,
            learning_rate,
            optimizer,
            mode: TrainingMode::Sgd,
            batch_size: default_batch_size(),
            beta1: adam.beta1,
            beta2: adam.beta2,
            epsilon: adam.epsilon,
            seed: None,
        }
    }

    /// Switches to minibatch mode with the given batch size.
    pub fn minibatch(mut self, batch_size: usize) -> Self {
        self.mode = TrainingMode::Minibatch;
        self.batch_size = batch_size;
        self
    }

    /// Fixes the shuffling order used by [`crate::Network::train`].
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) {
            return Err(NetworkError::config("learning_rate must be positive"));
        }
        if self.batch_size == 0 {
            return Err(NetworkError::config("batch_size must be positive"));
        }
        self.adam_config().map(|_| ())
    }

    pub fn adam_config(&self) -> Result<AdamConfig> {
        AdamConfig::new(self.beta1, self.beta2, self.epsilon)
    }

    /// The optimizer this configuration describes.
    pub fn optimizer(&self) -> Result<Optimizer> {
        Ok(Optimizer::new(self.optimizer, self.learning_rate).with_adam_config(self.adam_config()?))
    }
}

/// Loads a training configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it into a [`TrainingConfig`] and
/// validates it.
///
/// # Examples
///
/// ```no_run
/// use neural_layers::config::load_config;
///
/// let cfg = load_config("config/xor_adam.json").unwrap();
/// assert!(cfg.epochs > 0);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_optional_fields() {
        let config: TrainingConfig =
            serde_json::from_str(r#"{"epochs": 3, "learning_rate": 0.01, "optimizer": "adam"}"#)
                .unwrap();
        assert_eq!(config.mode, TrainingMode::Sgd);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.beta1, 0.9);
        assert_eq!(config.beta2, 0.999);
        assert_eq!(config.epsilon, 1e-8);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_validation() {
        let config = TrainingConfig::new(1, 0.1, OptimizerType::Adam);
        assert!(config.validate().is_ok());

        let mut bad = config.clone();
        bad.learning_rate = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.beta2 = 1.0;
        assert!(bad.validate().is_err());

        assert!(config.minibatch(0).validate().is_err());
    }

    #[test]
    fn test_optimizer_carries_hyper_parameters() {
        let mut config = TrainingConfig::new(1, 0.5, OptimizerType::Adam);
        config.beta1 = 0.8;
        let optimizer = config.optimizer().unwrap();
        assert_eq!(optimizer.learning_rate(), 0.5);
        assert_eq!(optimizer.adam_config().beta1, 0.8);
    }
}
