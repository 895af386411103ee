//! Optimizer abstractions for neural network parameter updates
//!
//! This module provides the update rules applied to every weight and bias
//! array of a parameterized layer.
//!
//! # Overview
//!
//! The basic gradient descent update is `weight = weight - learning_rate * gradient`.
//! Adam additionally keeps first/second moment estimates per parameter array;
//! those live next to the parameters inside each layer (see
//! [`crate::layers::Parameter`]) so that the optimizer itself stays a small,
//! copyable description of *how* to update.
//!
//! # Available Optimizers
//!
//! - Gradient descent: in-place `param -= lr * grad`
//! - Adam: bias-corrected adaptive moment estimation
//!
//! # Example
//!
//! ```
//! use neural_layers::optimizers::{AdamState, Optimizer};
//!
//! let optimizer = Optimizer::adam(0.001);
//! let mut weights = vec![1.0, 2.0, 3.0];
//! let mut state = AdamState::new(weights.len());
//!
//! optimizer.apply(&mut weights, &[0.1, 0.2, 0.3], &mut state, 0);
//! assert!(weights[0] < 1.0);
//! ```

pub mod adam;
pub mod sgd;

use serde::{Deserialize, Serialize};

pub use adam::{AdamConfig, AdamState};
pub use sgd::gradient_descent_step;

/// Which update rule a training run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerType {
    GradientDescent,
    Adam,
}

/// Update rule plus its hyper-parameters.
///
/// Passed by reference to [`crate::layers::ParameterizedLayer::update_parameters`];
/// all mutable optimizer state is owned by the layer being updated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Optimizer {
    kind: OptimizerType,
    learning_rate: f64,
    adam: AdamConfig,
}

impl Optimizer {
    pub fn new(kind: OptimizerType, learning_rate: f64) -> Self {
        Self {
            kind,
            learning_rate,
            adam: AdamConfig::default(),
        }
    }

    pub fn gradient_descent(learning_rate: f64) -> Self {
        Self::new(OptimizerType::GradientDescent, learning_rate)
    }

    /// Adam with the default `β1 = 0.9, β2 = 0.999, ε = 1e-8`.
    pub fn adam(learning_rate: f64) -> Self {
        Self::new(OptimizerType::Adam, learning_rate)
    }

    /// Replaces the Adam hyper-parameters.
    pub fn with_adam_config(mut self, adam: AdamConfig) -> Self {
        self.adam = adam;
        self
    }

    pub fn kind(&self) -> OptimizerType {
        self.kind
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    pub fn adam_config(&self) -> &AdamConfig {
        &self.adam
    }

    /// Updates one parameter array in place.
    ///
    /// `sample_index` is 0-based; Adam's bias correction uses `sample_index + 1`.
    /// `state` is only touched by Adam.
    pub fn apply(
        &self,
        parameters: &mut [f64],
        gradients: &[f64],
        state: &mut AdamState,
        sample_index: usize,
    ) {
        match self.kind {
            OptimizerType::GradientDescent => {
                gradient_descent_step(parameters, gradients, self.learning_rate)
            }
            OptimizerType::Adam => state.step(
                &self.adam,
                parameters,
                gradients,
                sample_index + 1,
                self.learning_rate,
            ),
        }
    }
}
