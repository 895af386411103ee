//! Activation functions for neural networks
//!
//! Scalar nonlinearities and their derivatives, plus the vector-valued softmax
//! and its Jacobian. All derivatives are evaluated at the pre-activation input.

use serde::{Deserialize, Serialize};

use crate::utils::Matrix;

/// Element-wise nonlinearities supported by [`crate::layers::ActivationLayer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationType {
    Relu,
    Tanh,
    Sigmoid,
}

impl ActivationType {
    /// Applies the activation to a single value.
    pub fn apply(self, x: f64) -> f64 {
        match self {
            ActivationType::Relu => relu(x),
            ActivationType::Tanh => tanh(x),
            ActivationType::Sigmoid => sigmoid(x),
        }
    }

    /// Derivative of the activation evaluated at the pre-activation `x`.
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            ActivationType::Relu => relu_prime(x),
            ActivationType::Tanh => tanh_prime(x),
            ActivationType::Sigmoid => sigmoid_prime(x),
        }
    }

    /// Applies the activation to every element of `xs`.
    pub fn apply_all(self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.apply(x)).collect()
    }

    /// `error[i] * f'(xs[i])` for every element.
    pub fn backprop(self, xs: &[f64], error: &[f64]) -> Vec<f64> {
        xs.iter()
            .zip(error)
            .map(|(&x, &e)| e * self.derivative(x))
            .collect()
    }
}

/// ReLU: `max(0, x)`.
pub fn relu(x: f64) -> f64 {
    x.max(0.0)
}

/// ReLU derivative: 0 for `x <= 0`, otherwise 1.
pub fn relu_prime(x: f64) -> f64 {
    if x <= 0.0 {
        0.0
    } else {
        1.0
    }
}

pub fn tanh(x: f64) -> f64 {
    x.tanh()
}

/// `1 - tanh(x)^2`
pub fn tanh_prime(x: f64) -> f64 {
    let t = x.tanh();
    1.0 - t * t
}

/// Sigmoid: `1 / (1 + exp(-x))`.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// `sigmoid(x) * (1 - sigmoid(x))`
pub fn sigmoid_prime(x: f64) -> f64 {
    let s = sigmoid(x);
    s * (1.0 - s)
}

/// Softmax over a whole vector.
///
/// Subtracts the maximum before exponentiating; the result is mathematically
/// identical to `exp(x_i) / Σ exp(x_j)`.
pub fn softmax(xs: &[f64]) -> Vec<f64> {
    if xs.is_empty() {
        return Vec::new();
    }
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = xs.iter().map(|&x| (x - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Jacobian of softmax at `xs`.
///
/// `J[i][i] = s_i (1 - s_i)` and `J[i][j] = -s_i s_j` for `i != j`.
pub fn softmax_jacobian(xs: &[f64]) -> Matrix {
    let s = softmax(xs);
    Matrix::from_fn(s.len(), s.len(), |i, j| {
        if i == j {
            s[i] * (1.0 - s[i])
        } else {
            -s[i] * s[j]
        }
    })
}
