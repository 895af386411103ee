//! A trainable array together with its gradient and Adam moments.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::optimizers::{AdamState, Optimizer};
use crate::utils::rng::{fill_scaled_normal, symmetric_uniform};
use crate::utils::Matrix;

/// Weights (or biases) of one layer, the gradient accumulated for them and the
/// Adam state that tracks them. All three always share the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    values: Matrix,
    gradient: Matrix,
    adam: AdamState,
}

impl Parameter {
    /// Zero values, zero gradient.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::from_values(Matrix::zeros(rows, cols))
    }

    /// Wraps existing values with a zeroed gradient and fresh Adam state.
    pub fn from_values(values: Matrix) -> Self {
        let (rows, cols) = (values.rows(), values.cols());
        Self {
            adam: AdamState::new(values.len()),
            gradient: Matrix::zeros(rows, cols),
            values,
        }
    }

    /// Values drawn from `N(0, 1/sqrt(fan_in))`.
    pub fn scaled_normal(rows: usize, cols: usize, fan_in: usize, rng: &mut StdRng) -> Self {
        let mut values = Matrix::zeros(rows, cols);
        fill_scaled_normal(rng, values.as_mut_slice(), fan_in);
        Self::from_values(values)
    }

    /// Values drawn uniformly from `[-limit, limit)`.
    pub fn uniform(rows: usize, cols: usize, limit: f64, rng: &mut StdRng) -> Self {
        let values = Matrix::from_fn(rows, cols, |_, _| symmetric_uniform(rng, limit));
        Self::from_values(values)
    }

    pub fn values(&self) -> &Matrix {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Matrix {
        &mut self.values
    }

    pub fn gradient(&self) -> &Matrix {
        &self.gradient
    }

    pub fn gradient_mut(&mut self) -> &mut Matrix {
        &mut self.gradient
    }

    pub fn adam(&self) -> &AdamState {
        &self.adam
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `gradient += delta` element-wise.
    pub fn accumulate(&mut self, delta: &[f64]) {
        crate::utils::matrix::add_in_place(self.gradient.as_mut_slice(), delta);
    }

    pub fn drain(&mut self) {
        self.gradient.fill_zero();
    }

    /// One optimizer step on the values using the current gradient.
    pub fn update(&mut self, optimizer: &Optimizer, sample_index: usize) {
        optimizer.apply(
            self.values.as_mut_slice(),
            self.gradient.as_slice(),
            &mut self.adam,
            sample_index,
        );
    }
}
