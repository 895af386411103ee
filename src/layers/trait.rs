//! Layer trait definitions for neural network layers
//!
//! This module defines the core [`Layer`] trait that all layer types implement,
//! and the optional [`ParameterizedLayer`] capability for layers that own
//! trainable weights.

use rand::rngs::StdRng;

use crate::error::Result;
use crate::optimizers::Optimizer;

/// Sizing information handed to a layer when it joins a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeContext {
    /// Output size of the previous layer, or the network entry size.
    pub input_size: usize,
    /// Filter count of the nearest preceding convolution/pooling layer.
    pub feature_maps: Option<usize>,
}

impl SizeContext {
    pub fn new(input_size: usize) -> Self {
        Self {
            input_size,
            feature_maps: None,
        }
    }

    pub fn with_feature_maps(mut self, feature_maps: Option<usize>) -> Self {
        self.feature_maps = feature_maps;
        self
    }
}

/// Core trait for neural network layers.
///
/// All layers consume and produce flattened `f64` buffers; any 2D/3D structure
/// is reconstructed internally by index arithmetic.
///
/// A layer caches whatever its backward pass needs during `forward`, so
/// `backward` must follow the `forward` call it differentiates. Layers are not
/// reentrant.
///
/// # Example
///
/// ```ignore
/// let output = layer.forward(&input)?;
/// let input_error = layer.backward(&output_error)?;
/// ```
pub trait Layer {
    /// Short name used in error messages and logs.
    fn name(&self) -> &'static str;

    /// Forward propagation through the layer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NetworkError::ShapeMismatch`] when `input` does not have
    /// `input_size()` elements.
    fn forward(&mut self, input: &[f64]) -> Result<Vec<f64>>;

    /// Backward propagation through the layer.
    ///
    /// Given ∂Loss/∂output, returns ∂Loss/∂input and stores (or accumulates,
    /// when accumulation is enabled) the gradients of any owned parameters.
    /// Parameters themselves are left untouched; see
    /// [`ParameterizedLayer::update_parameters`].
    fn backward(&mut self, output_error: &[f64]) -> Result<Vec<f64>>;

    /// Expected number of input values.
    fn input_size(&self) -> usize;

    /// Number of output values.
    fn output_size(&self) -> usize;

    /// Derives input/output sizes from the previous layer.
    ///
    /// Shape and configuration errors that can be detected without data are
    /// reported here.
    fn set_size_io(&mut self, context: SizeContext) -> Result<()>;

    /// Draws fresh parameters. A no-op for layers without parameters.
    fn initialize_parameters(&mut self, _rng: &mut StdRng) {}

    /// Whether parameters exist yet.
    fn is_initialized(&self) -> bool {
        true
    }

    /// Number of feature maps this layer emits, for layers with spatial output.
    fn feature_maps(&self) -> Option<usize> {
        None
    }

    fn as_parameterized(&self) -> Option<&dyn ParameterizedLayer> {
        None
    }

    fn as_parameterized_mut(&mut self) -> Option<&mut dyn ParameterizedLayer> {
        None
    }
}

/// Capability of layers that own weights, gradients and optimizer state.
pub trait ParameterizedLayer {
    /// Applies one optimizer step using the stored gradients, then drains them.
    ///
    /// `sample_index` is the 0-based index Adam turns into its step count.
    fn update_parameters(&mut self, optimizer: &Optimizer, sample_index: usize);

    /// Zeroes every gradient accumulator.
    fn drain_gradients(&mut self);

    /// When enabled, `backward` adds to the existing gradients instead of
    /// overwriting them.
    fn set_gradient_accumulation(&mut self, accumulate: bool);

    fn accumulates_gradients(&self) -> bool;

    /// Total number of trainable values.
    fn parameter_count(&self) -> usize;
}
