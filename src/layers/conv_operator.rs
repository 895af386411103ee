//! Single-channel convolution: the 2D primitives and a bank of filters over one
//! input channel.
//!
//! Feature maps are square and stored row-major. For an input of side `n`, a
//! kernel of side `k` and stride `s`, every filter produces a map of side
//! `floor((n - k) / s) + 1`; trailing windows that do not fit are dropped.

use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, NetworkError, Result};
use crate::layers::{Layer, Parameter, ParameterizedLayer, SizeContext};
use crate::optimizers::Optimizer;
use crate::utils::matrix::{add_in_place, square_dim};
use crate::utils::Matrix;

/// Side length of a valid (unpadded) convolution or pooling output.
pub fn output_dim(input_dim: usize, kernel: usize, stride: usize) -> usize {
    debug_assert!(kernel <= input_dim && stride > 0);
    (input_dim - kernel) / stride + 1
}

/// Checks that a kernel/stride pair fits an input of side `dim` exactly.
pub fn validate_geometry(layer: &'static str, dim: usize, kernel: usize, stride: usize) -> Result<()> {
    if kernel == 0 || stride == 0 {
        return Err(NetworkError::config(format!(
            "{}: kernel and stride must be positive (kernel {}, stride {})",
            layer, kernel, stride
        )));
    }
    if kernel > dim || (dim - kernel) % stride != 0 {
        return Err(NetworkError::InvalidStride {
            layer,
            dim,
            kernel,
            stride,
        });
    }
    Ok(())
}

/// 2D cross-correlation of `image` with `kernel`, advancing by `stride`.
///
/// ```
/// use neural_layers::layers::conv_operator::convolve;
/// use neural_layers::utils::Matrix;
///
/// let image = Matrix::from_vec(3, 3, (1..=9).map(f64::from).collect()).unwrap();
/// let kernel = Matrix::from_vec(2, 2, vec![4.0, 3.0, 2.0, 1.0]).unwrap();
/// assert_eq!(convolve(&image, &kernel, 1).as_slice(), &[23.0, 33.0, 53.0, 63.0]);
/// ```
pub fn convolve(image: &Matrix, kernel: &Matrix, stride: usize) -> Matrix {
    let k = kernel.rows();
    let out = output_dim(image.rows(), k, stride);
    Matrix::from_fn(out, out, |i, j| {
        let mut sum = 0.0;
        for a in 0..k {
            for b in 0..k {
                sum += image.get(i * stride + a, j * stride + b) * kernel.get(a, b);
            }
        }
        sum
    })
}

/// Inserts `stride - 1` zero rows/columns between neighbouring entries.
pub fn dilate(m: &Matrix, stride: usize) -> Matrix {
    let dim = m.rows();
    if dim == 0 {
        return Matrix::zeros(0, 0);
    }
    let out = dim + (stride - 1) * (dim - 1);
    let mut dilated = Matrix::zeros(out, out);
    for i in 0..dim {
        for j in 0..dim {
            dilated.set(i * stride, j * stride, m.get(i, j));
        }
    }
    dilated
}

/// Dilates by `stride` and surrounds the result with `kernel - 1` zeros on
/// each side, ready for a full convolution.
pub fn pad_and_dilate(m: &Matrix, stride: usize, kernel: usize) -> Matrix {
    let dilated = dilate(m, stride);
    let pad = kernel - 1;
    let out = dilated.rows() + 2 * pad;
    let mut padded = Matrix::zeros(out, out);
    for i in 0..dilated.rows() {
        for j in 0..dilated.cols() {
            padded.set(i + pad, j + pad, dilated.get(i, j));
        }
    }
    padded
}

/// ∂L/∂W for one filter: the input correlated with the dilated output error.
///
/// When the stride leaves trailing input rows unused the correlation is larger
/// than the kernel; only its leading `kernel × kernel` block is a gradient.
pub fn weight_gradient(input: &Matrix, output_error: &Matrix, stride: usize, kernel: usize) -> Matrix {
    let full = convolve(input, &dilate(output_error, stride), 1);
    Matrix::from_fn(kernel, kernel, |a, b| full.get(a, b))
}

/// ∂L/∂X for one filter: full convolution of the rotated kernel against the
/// padded, dilated output error.
///
/// Input cells never covered by a window receive zero gradient.
pub fn input_gradient(kernel: &Matrix, output_error: &Matrix, stride: usize, input_dim: usize) -> Matrix {
    let k = kernel.rows();
    let covered = convolve(&pad_and_dilate(output_error, stride, k), &kernel.rotate180(), 1);
    let mut grad = Matrix::zeros(input_dim, input_dim);
    for i in 0..covered.rows().min(input_dim) {
        for j in 0..covered.cols().min(input_dim) {
            grad.set(i, j, covered.get(i, j));
        }
    }
    grad
}

/// A bank of `filters` square kernels applied to one input channel.
///
/// Each filter keeps its own weight gradient and Adam moments. Output maps
/// are concatenated filter by filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvolutionalOperator {
    kernel_size: usize,
    filters: usize,
    stride: usize,
    input_dim: usize,
    output_dim: usize,
    weights: Vec<Parameter>,
    accumulate_gradients: bool,
    #[serde(skip)]
    input: Option<Matrix>,
}

impl ConvolutionalOperator {
    pub fn new(kernel_size: usize, filters: usize, stride: usize) -> Self {
        Self {
            kernel_size,
            filters,
            stride,
            input_dim: 0,
            output_dim: 0,
            weights: Vec::new(),
            accumulate_gradients: false,
            input: None,
        }
    }

    /// Builds an operator from explicit square kernels.
    pub fn from_kernels(kernels: Vec<Matrix>, stride: usize, input_size: usize) -> Result<Self> {
        let kernel_size = kernels.first().map(Matrix::rows).unwrap_or(0);
        for kernel in &kernels {
            if kernel.rows() != kernel_size || kernel.cols() != kernel_size {
                return Err(NetworkError::config("convolution kernels must share one square shape"));
            }
        }
        let mut op = Self::new(kernel_size, kernels.len(), stride);
        op.set_size_io(SizeContext::new(input_size))?;
        op.weights = kernels.into_iter().map(Parameter::from_values).collect();
        Ok(op)
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

    /// Side of each output feature map.
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn kernel(&self, filter: usize) -> &Matrix {
        self.weights[filter].values()
    }

    pub fn kernel_mut(&mut self, filter: usize) -> &mut Matrix {
        self.weights[filter].values_mut()
    }

    pub fn kernel_gradient(&self, filter: usize) -> &Matrix {
        self.weights[filter].gradient()
    }

    pub fn kernel_parameter(&self, filter: usize) -> &Parameter {
        &self.weights[filter]
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(NetworkError::NotInitialized {
                layer: "convolution",
                reason: "kernels have not been initialized",
            });
        }
        Ok(())
    }
}

impl Layer for ConvolutionalOperator {
    fn name(&self) -> &'static str {
        "convolution"
    }

    fn forward(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.ensure_ready()?;
        ensure_len("convolution", self.input_size(), input.len())?;
        let image = Matrix::square_from_slice(input)?;
        let stride = self.stride;

        let maps: Vec<Matrix> = self
            .weights
            .par_iter()
            .map(|kernel| convolve(&image, kernel.values(), stride))
            .collect();

        self.input = Some(image);
        Ok(maps.into_iter().flat_map(Matrix::into_vec).collect())
    }

    fn backward(&mut self, output_error: &[f64]) -> Result<Vec<f64>> {
        self.ensure_ready()?;
        ensure_len("convolution", self.output_size(), output_error.len())?;
        let input = self.input.as_ref().ok_or(NetworkError::NotInitialized {
            layer: "convolution",
            reason: "backward called before forward",
        })?;

        let (stride, kernel, input_dim) = (self.stride, self.kernel_size, self.input_dim);
        let map_len = self.output_dim * self.output_dim;

        let per_filter: Vec<(Matrix, Matrix)> = self
            .weights
            .par_iter()
            .zip(output_error.par_chunks(map_len))
            .map(|(weights, error)| {
                let error = Matrix::square_from_slice(error)?;
                Ok((
                    weight_gradient(input, &error, stride, kernel),
                    input_gradient(weights.values(), &error, stride, input_dim),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        if !self.accumulate_gradients {
            self.drain_gradients();
        }

        let mut input_error = vec![0.0; input_dim * input_dim];
        for (param, (dw, dx)) in self.weights.iter_mut().zip(per_filter) {
            param.accumulate(dw.as_slice());
            add_in_place(&mut input_error, dx.as_slice());
        }
        Ok(input_error)
    }

    fn input_size(&self) -> usize {
        self.input_dim * self.input_dim
    }

    fn output_size(&self) -> usize {
        self.filters * self.output_dim * self.output_dim
    }

    fn set_size_io(&mut self, context: SizeContext) -> Result<()> {
        if self.filters == 0 {
            return Err(NetworkError::config("convolution needs at least one filter"));
        }
        let dim = square_dim(context.input_size).ok_or(NetworkError::NonSquareInput {
            layer: "convolution",
            len: context.input_size,
        })?;
        validate_geometry("convolution", dim, self.kernel_size, self.stride)?;
        self.input_dim = dim;
        self.output_dim = output_dim(dim, self.kernel_size, self.stride);
        Ok(())
    }

    fn initialize_parameters(&mut self, rng: &mut StdRng) {
        let k = self.kernel_size;
        self.weights = (0..self.filters)
            .map(|_| Parameter::scaled_normal(k, k, k * k, rng))
            .collect();
    }

    fn is_initialized(&self) -> bool {
        self.input_dim > 0 && self.weights.len() == self.filters
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

impl ParameterizedLayer for ConvolutionalOperator {
    fn update_parameters(&mut self, optimizer: &Optimizer, sample_index: usize) {
        for kernel in &mut self.weights {
            kernel.update(optimizer, sample_index);
        }
        self.drain_gradients();
    }

    fn drain_gradients(&mut self) {
        for kernel in &mut self.weights {
            kernel.drain();
        }
    }

    fn set_gradient_accumulation(&mut self, accumulate: bool) {
        self.accumulate_gradients = accumulate;
    }

    fn accumulates_gradients(&self) -> bool {
        self.accumulate_gradients
    }

    fn parameter_count(&self) -> usize {
        self.weights.iter().map(Parameter::len).sum()
    }
}
