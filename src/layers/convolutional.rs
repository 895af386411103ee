//! Multi-channel convolutional layer
//!
//! Splits a flattened `channels × n × n` input into its channels, runs one
//! [`ConvolutionalOperator`] per channel on the rayon pool and sums the
//! channel outputs filter by filter.

use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, NetworkError, Result};
use crate::layers::{ConvolutionalOperator, Layer, ParameterizedLayer, SizeContext};
use crate::optimizers::Optimizer;
use crate::utils::matrix::add_in_place;
use crate::utils::Matrix;

/// Convolutional layer over `channels` square input maps.
///
/// Every channel owns an independent set of `filters` kernels of side
/// `kernel_size`. The output holds `filters` maps of side
/// `floor((n - kernel_size) / stride) + 1`, each the sum over channels of
/// that channel's response to the filter.
///
/// # Example
///
/// ```
/// use neural_layers::layers::{ConvolutionalLayer, Layer};
/// use neural_layers::utils::rng::seeded_rng;
///
/// let mut rng = seeded_rng(Some(7));
/// // 3 channels of 28x28, 8 filters of 3x3, stride 1
/// let layer = ConvolutionalLayer::with_input_size(3 * 28 * 28, 3, 8, 1, 3, &mut rng).unwrap();
/// assert_eq!(layer.output_size(), 8 * 26 * 26);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvolutionalLayer {
    kernel_size: usize,
    filters: usize,
    stride: usize,
    channels: usize,
    input_size: usize,
    output_size: usize,
    operators: Vec<ConvolutionalOperator>,
    accumulate_gradients: bool,
}

impl ConvolutionalLayer {
    /// A layer whose input size is set when it joins a network.
    pub fn new(kernel_size: usize, filters: usize, stride: usize, channels: usize) -> Self {
        Self {
            kernel_size,
            filters,
            stride,
            channels,
            input_size: 0,
            output_size: 0,
            operators: Vec::new(),
            accumulate_gradients: false,
        }
    }

    /// A sized and initialized layer for standalone use.
    pub fn with_input_size(
        input_size: usize,
        kernel_size: usize,
        filters: usize,
        stride: usize,
        channels: usize,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let mut layer = Self::new(kernel_size, filters, stride, channels);
        layer.set_size_io(SizeContext::new(input_size))?;
        layer.initialize_parameters(rng);
        Ok(layer)
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn filters(&self) -> usize {
        self.filters
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn operators(&self) -> &[ConvolutionalOperator] {
        &self.operators
    }

    pub fn kernel(&self, channel: usize, filter: usize) -> &Matrix {
        self.operators[channel].kernel(filter)
    }

    pub fn kernel_mut(&mut self, channel: usize, filter: usize) -> &mut Matrix {
        self.operators[channel].kernel_mut(filter)
    }

    pub fn kernel_gradient(&self, channel: usize, filter: usize) -> &Matrix {
        self.operators[channel].kernel_gradient(filter)
    }

    fn channel_size(&self) -> usize {
        self.input_size / self.channels.max(1)
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(NetworkError::NotInitialized {
                layer: "convolutional",
                reason: "kernels have not been initialized",
            });
        }
        Ok(())
    }
}

impl Layer for ConvolutionalLayer {
    fn name(&self) -> &'static str {
        "convolutional"
    }

    fn forward(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.ensure_ready()?;
        ensure_len("convolutional", self.input_size, input.len())?;
        let channel_size = self.channel_size();

        let channel_outputs = self
            .operators
            .par_iter_mut()
            .zip(input.par_chunks(channel_size))
            .map(|(operator, channel)| operator.forward(channel))
            .collect::<Result<Vec<_>>>()?;

        let mut output = vec![0.0; self.output_size];
        for channel_output in &channel_outputs {
            add_in_place(&mut output, channel_output);
        }
        Ok(output)
    }

    fn backward(&mut self, output_error: &[f64]) -> Result<Vec<f64>> {
        self.ensure_ready()?;
        ensure_len("convolutional", self.output_size, output_error.len())?;

        // The output is a plain sum over channels, so each channel sees the
        // full output error.
        let channel_errors = self
            .operators
            .par_iter_mut()
            .map(|operator| operator.backward(output_error))
            .collect::<Result<Vec<_>>>()?;

        Ok(channel_errors.into_iter().flatten().collect())
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn set_size_io(&mut self, context: SizeContext) -> Result<()> {
        if self.channels == 0 {
            return Err(NetworkError::config("convolutional layer needs at least one channel"));
        }
        if context.input_size % self.channels != 0 {
            return Err(NetworkError::config(format!(
                "convolutional input of {} values cannot be split into {} channels",
                context.input_size, self.channels
            )));
        }
        let channel_context = SizeContext::new(context.input_size / self.channels);

        if self.operators.len() != self.channels {
            self.operators = (0..self.channels)
                .map(|_| ConvolutionalOperator::new(self.kernel_size, self.filters, self.stride))
                .collect();
        }
        for operator in &mut self.operators {
            operator.set_size_io(channel_context)?;
            operator.set_gradient_accumulation(self.accumulate_gradients);
        }

        self.input_size = context.input_size;
        self.output_size = self.operators[0].output_size();
        Ok(())
    }

    fn initialize_parameters(&mut self, rng: &mut StdRng) {
        for operator in &mut self.operators {
            operator.initialize_parameters(rng);
        }
    }

    fn is_initialized(&self) -> bool {
        self.operators.len() == self.channels
            && self.channels > 0
            && self.operators.iter().all(Layer::is_initialized)
    }

    fn feature_maps(&self) -> Option<usize> {
        Some(self.filters)
    }

    fn as_parameterized(&self) -> Option<&dyn ParameterizedLayer> {
        Some(self)
    }

    fn as_parameterized_mut(&mut self) -> Option<&mut dyn ParameterizedLayer> {
        Some(self)
    }
}

impl ParameterizedLayer for ConvolutionalLayer {
    fn update_parameters(&mut self, optimizer: &Optimizer, sample_index: usize) {
        self.operators
            .par_iter_mut()
            .for_each(|operator| operator.update_parameters(optimizer, sample_index));
    }

    fn drain_gradients(&mut self) {
        for operator in &mut self.operators {
            operator.drain_gradients();
        }
    }

    fn set_gradient_accumulation(&mut self, accumulate: bool) {
        self.accumulate_gradients = accumulate;
        for operator in &mut self.operators {
            operator.set_gradient_accumulation(accumulate);
        }
    }

    fn accumulates_gradients(&self) -> bool {
        self.accumulate_gradients
    }

    fn parameter_count(&self) -> usize {
        self.operators
            .iter()
            .map(ParameterizedLayer::parameter_count)
            .sum()
    }
}
