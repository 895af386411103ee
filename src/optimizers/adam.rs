//! Adam (Adaptive Moment Estimation) optimizer implementation
//!
//! This module provides the moment accumulators Adam keeps for one parameter
//! array, and the bias-corrected update that consumes them.

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};

/// Adam hyper-parameters.
///
/// The update rule is:
///
/// ```text
/// m_t = β1 * m_{t-1} + (1 - β1) * gradient
/// v_t = β2 * v_{t-1} + (1 - β2) * gradient²
/// m_hat = m_t / (1 - β1^t)
/// v_hat = v_t / (1 - β2^t)
/// parameter = parameter - α * m_hat / (√v_hat + ε)
/// ```
///
/// # Reference
///
/// Kingma, D. P., & Ba, J. (2014). Adam: A method for stochastic optimization.
/// arXiv preprint arXiv:1412.6980.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdamConfig {
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl AdamConfig {
    /// Creates a configuration, rejecting decay rates outside `(0, 1)` and a
    /// non-positive epsilon.
    pub fn new(beta1: f64, beta2: f64, epsilon: f64) -> Result<Self> {
        let config = Self {
            beta1,
            beta2,
            epsilon,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.beta1 > 0.0 && self.beta1 < 1.0) {
            return Err(NetworkError::config("beta1 must be in (0, 1)"));
        }
        if !(self.beta2 > 0.0 && self.beta2 < 1.0) {
            return Err(NetworkError::config("beta2 must be in (0, 1)"));
        }
        if self.epsilon <= 0.0 {
            return Err(NetworkError::config("epsilon must be positive"));
        }
        Ok(())
    }
}

/// First and second moment estimates for one weight or bias array.
///
/// Created zeroed alongside the parameters it tracks and updated on every
/// optimizer step. It is never reset implicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdamState {
    /// First moment estimates (momentum)
    m: Vec<f64>,
    /// Second moment estimates (adaptive learning rate)
    v: Vec<f64>,
}

impl AdamState {
    /// Zeroed moments for a parameter array of `len` values.
    pub fn new(len: usize) -> Self {
        Self {
            m: vec![0.0; len],
            v: vec![0.0; len],
        }
    }

    pub fn first_moment(&self) -> &[f64] {
        &self.m
    }

    pub fn second_moment(&self) -> &[f64] {
        &self.v
    }

    /// Zeroes both moments. Only called on explicit reinitialization.
    pub fn reset(&mut self) {
        self.m.iter_mut().for_each(|x| *x = 0.0);
        self.v.iter_mut().for_each(|x| *x = 0.0);
    }

    /// Applies one bias-corrected Adam update with 1-indexed step `t`.
    ///
    /// # Panics
    ///
    /// Panics if `parameters`, `gradients` and the moment buffers differ in length.
    pub fn step(
        &mut self,
        config: &AdamConfig,
        parameters: &mut [f64],
        gradients: &[f64],
        t: usize,
        learning_rate: f64,
    ) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );
        assert_eq!(
            parameters.len(),
            self.m.len(),
            "Adam moments must match the parameter length"
        );

        let t = t.max(1) as i32;
        let bias_correction1 = 1.0 - config.beta1.powi(t);
        let bias_correction2 = 1.0 - config.beta2.powi(t);

        for i in 0..parameters.len() {
            let g = gradients[i];
            self.m[i] = config.beta1 * self.m[i] + (1.0 - config.beta1) * g;
            self.v[i] = config.beta2 * self.v[i] + (1.0 - config.beta2) * g * g;

            let m_hat = self.m[i] / bias_correction1;
            let v_hat = self.v[i] / bias_correction2;

            parameters[i] -= learning_rate * m_hat / (v_hat.sqrt() + config.epsilon);
        }
    }
}
