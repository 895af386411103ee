//! Dense (fully connected) layer implementation
//!
//! This module provides a DenseLayer (also known as Linear or Fully Connected layer)
//! that performs the transformation: output = input × weights + biases

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, NetworkError, Result};
use crate::layers::{Layer, Parameter, ParameterizedLayer, SizeContext};
use crate::optimizers::Optimizer;
use crate::utils::Matrix;

/// Dense (fully connected) layer with weights and biases.
///
/// Performs the affine transformation `y = xW + b` where `x` is a row vector
/// (input_size), `W` is `input_size × output_size` and `b` has `output_size`
/// entries.
///
/// Backward, given `e = ∂L/∂y`:
///
/// ```text
/// ∂L/∂x = e · Wᵗ
/// ∂L/∂W = x ⊗ e
/// ∂L/∂b = e
/// ```
///
/// # Example
///
/// ```
/// use neural_layers::layers::{DenseLayer, Layer};
/// use neural_layers::utils::rng::seeded_rng;
///
/// let mut rng = seeded_rng(Some(42));
/// let layer = DenseLayer::new(784, 512, &mut rng);
/// assert_eq!(layer.input_size(), 784);
/// assert_eq!(layer.output_size(), 512);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    input_size: usize,
    output_size: usize,
    weights: Parameter,
    biases: Parameter,
    accumulate_gradients: bool,
    #[serde(skip)]
    input: Vec<f64>,
}

impl DenseLayer {
    /// Create a new DenseLayer with weights drawn from `N(0, 1/sqrt(input_size))`
    /// and zero biases.
    pub fn new(input_size: usize, output_size: usize, rng: &mut StdRng) -> Self {
        let mut layer = Self::with_output_size(output_size);
        layer.input_size = input_size;
        layer.initialize_parameters(rng);
        layer
    }

    /// A layer whose input size is taken from the previous layer when it is
    /// added to a network.
    pub fn with_output_size(output_size: usize) -> Self {
        Self {
            input_size: 0,
            output_size,
            weights: Parameter::zeros(0, 0),
            biases: Parameter::zeros(0, 0),
            accumulate_gradients: false,
            input: Vec::new(),
        }
    }

    /// Builds a layer from explicit weights (`input_size × output_size`) and biases.
    pub fn from_parameters(weights: Matrix, biases: Vec<f64>) -> Result<Self> {
        ensure_len("dense", weights.cols(), biases.len())?;
        let output_size = biases.len();
        Ok(Self {
            input_size: weights.rows(),
            output_size,
            weights: Parameter::from_values(weights),
            biases: Parameter::from_values(Matrix::from_vec(1, output_size, biases)?),
            accumulate_gradients: false,
            input: Vec::new(),
        })
    }

    pub fn weights(&self) -> &Matrix {
        self.weights.values()
    }

    pub fn weights_mut(&mut self) -> &mut Matrix {
        self.weights.values_mut()
    }

    pub fn biases(&self) -> &[f64] {
        self.biases.values().as_slice()
    }

    pub fn biases_mut(&mut self) -> &mut [f64] {
        self.biases.values_mut().as_mut_slice()
    }

    pub fn weight_gradient(&self) -> &Matrix {
        self.weights.gradient()
    }

    pub fn bias_gradient(&self) -> &[f64] {
        self.biases.gradient().as_slice()
    }

    pub fn weight_parameter(&self) -> &Parameter {
        &self.weights
    }

    pub fn bias_parameter(&self) -> &Parameter {
        &self.biases
    }

    /// Backward pass against an explicit input rather than the cached one.
    ///
    /// Used by layers that reuse one dense sublayer across several time steps.
    pub(crate) fn backward_with_input(
        &mut self,
        input: &[f64],
        output_error: &[f64],
    ) -> Result<Vec<f64>> {
        if !self.is_initialized() {
            return Err(NetworkError::NotInitialized {
                layer: "dense",
                reason: "parameters have not been initialized",
            });
        }
        ensure_len("dense", self.input_size, input.len())?;
        ensure_len("dense", self.output_size, output_error.len())?;

        let input_error = self.weights.values().mul_vec(output_error);

        if !self.accumulate_gradients {
            self.drain_gradients();
        }
        self.weights.gradient_mut().add_outer(input, output_error);
        self.biases.accumulate(output_error);

        Ok(input_error)
    }
}

impl Layer for DenseLayer {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn forward(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        if !self.is_initialized() {
            return Err(NetworkError::NotInitialized {
                layer: "dense",
                reason: "parameters have not been initialized",
            });
        }
        ensure_len("dense", self.input_size, input.len())?;

        let mut output = self.weights.values().vec_mul(input);
        crate::utils::matrix::add_in_place(&mut output, self.biases.values().as_slice());

        self.input.clear();
        self.input.extend_from_slice(input);
        Ok(output)
    }

    fn backward(&mut self, output_error: &[f64]) -> Result<Vec<f64>> {
        if self.input.is_empty() && self.input_size > 0 {
            return Err(NetworkError::NotInitialized {
                layer: "dense",
                reason: "backward called before forward",
            });
        }
        let input = std::mem::take(&mut self.input);
        let result = self.backward_with_input(&input, output_error);
        self.input = input;
        result
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn set_size_io(&mut self, context: SizeContext) -> Result<()> {
        if self.output_size == 0 {
            return Err(NetworkError::config("dense layer needs a positive output size"));
        }
        if self.input_size == 0 {
            self.input_size = context.input_size;
        }
        ensure_len("dense", self.input_size, context.input_size)
    }

    fn initialize_parameters(&mut self, rng: &mut StdRng) {
        self.weights =
            Parameter::scaled_normal(self.input_size, self.output_size, self.input_size, rng);
        self.biases = Parameter::zeros(1, self.output_size);
    }

    fn is_initialized(&self) -> bool {
        self.input_size > 0
            && self.weights.values().rows() == self.input_size
            && self.weights.values().cols() == self.output_size
            && self.biases.len() == self.output_size
    }

    fn as_parameterized(&self) -> Option<&dyn ParameterizedLayer> {
        Some(self)
    }

    fn as_parameterized_mut(&mut self) -> Option<&mut dyn ParameterizedLayer> {
        Some(self)
    }
}

impl ParameterizedLayer for DenseLayer {
    fn update_parameters(&mut self, optimizer: &Optimizer, sample_index: usize) {
        self.weights.update(optimizer, sample_index);
        self.biases.update(optimizer, sample_index);
        self.drain_gradients();
    }

    fn drain_gradients(&mut self) {
        self.weights.drain();
        self.biases.drain();
    }

    fn set_gradient_accumulation(&mut self, accumulate: bool) {
        self.accumulate_gradients = accumulate;
    }

    fn accumulates_gradients(&self) -> bool {
        self.accumulate_gradients
    }

    /// Returns input_size × output_size (weights) + output_size (biases).
    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}
