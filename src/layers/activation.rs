//! Parameter-free activation layers: element-wise nonlinearities and softmax.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, NetworkError, Result};
use crate::layers::{Layer, SizeContext};
use crate::utils::activations::{softmax, softmax_jacobian};
use crate::utils::ActivationType;

/// Applies a scalar nonlinearity independently to every element.
///
/// The backward pass multiplies the incoming error by the derivative evaluated
/// at the cached forward input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationLayer {
    activation: ActivationType,
    size: usize,
    #[serde(skip)]
    input: Vec<f64>,
}

impl ActivationLayer {
    /// An activation layer whose size is set when it joins a network.
    pub fn new(activation: ActivationType) -> Self {
        Self {
            activation,
            size: 0,
            input: Vec::new(),
        }
    }

    /// An activation layer with a known size, for standalone use.
    pub fn with_size(activation: ActivationType, size: usize) -> Self {
        Self {
            size,
            ..Self::new(activation)
        }
    }

    pub fn activation(&self) -> ActivationType {
        self.activation
    }
}

impl Layer for ActivationLayer {
    fn name(&self) -> &'static str {
        "activation"
    }

    fn forward(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        if self.size != 0 {
            ensure_len("activation", self.size, input.len())?;
        }
        self.input.clear();
        self.input.extend_from_slice(input);
        Ok(self.activation.apply_all(input))
    }

    fn backward(&mut self, output_error: &[f64]) -> Result<Vec<f64>> {
        if self.input.is_empty() && !output_error.is_empty() {
            return Err(NetworkError::NotInitialized {
                layer: "activation",
                reason: "backward called before forward",
            });
        }
        ensure_len("activation", self.input.len(), output_error.len())?;
        Ok(self.activation.backprop(&self.input, output_error))
    }

    fn input_size(&self) -> usize {
        self.size
    }

    fn output_size(&self) -> usize {
        self.size
    }

    fn set_size_io(&mut self, context: SizeContext) -> Result<()> {
        self.size = context.input_size;
        Ok(())
    }
}

/// Softmax over the whole input vector.
///
/// Backward right-multiplies the error row vector by the full softmax Jacobian.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxLayer {
    size: usize,
    #[serde(skip)]
    input: Vec<f64>,
}

impl SoftmaxLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            input: Vec::new(),
        }
    }
}

impl Layer for SoftmaxLayer {
    fn name(&self) -> &'static str {
        "softmax"
    }

    fn forward(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        if self.size != 0 {
            ensure_len("softmax", self.size, input.len())?;
        }
        self.input.clear();
        self.input.extend_from_slice(input);
        Ok(softmax(input))
    }

    fn backward(&mut self, output_error: &[f64]) -> Result<Vec<f64>> {
        if self.input.is_empty() && !output_error.is_empty() {
            return Err(NetworkError::NotInitialized {
                layer: "softmax",
                reason: "backward called before forward",
            });
        }
        ensure_len("softmax", self.input.len(), output_error.len())?;
        Ok(softmax_jacobian(&self.input).vec_mul(output_error))
    }

    fn input_size(&self) -> usize {
        self.size
    }

    fn output_size(&self) -> usize {
        self.size
    }

    fn set_size_io(&mut self, context: SizeContext) -> Result<()> {
        self.size = context.input_size;
        Ok(())
    }
}
