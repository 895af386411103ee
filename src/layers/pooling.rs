//! Max pooling over a stack of square feature maps.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, NetworkError, Result};
use crate::layers::conv_operator::output_dim;
use crate::layers::{Layer, SizeContext};
use crate::utils::matrix::square_dim;
use crate::utils::Matrix;

/// 2D max pooling of one map. Returns the pooled map together with the
/// `(row, col)` of every window's maximum, in output row-major order.
///
/// Windows are scanned row-major with a strict `>`, so the first of several
/// equal maxima wins.
///
/// ```
/// use neural_layers::layers::pooling::max_pool;
/// use neural_layers::utils::Matrix;
///
/// let map = Matrix::from_vec(3, 3, vec![1.0, 2.0, 3.0, 5.0, 6.0, 7.0, 9.0, 5.0, 1.0]).unwrap();
/// let (pooled, positions) = max_pool(&map, 2, 1);
/// assert_eq!(pooled.as_slice(), &[6.0, 7.0, 9.0, 7.0]);
/// assert_eq!(positions, vec![(1, 1), (1, 2), (2, 0), (1, 2)]);
/// ```
pub fn max_pool(map: &Matrix, pool_size: usize, stride: usize) -> (Matrix, Vec<(usize, usize)>) {
    let out = output_dim(map.rows(), pool_size, stride);
    let mut positions = Vec::with_capacity(out * out);
    let pooled = Matrix::from_fn(out, out, |i, j| {
        let (top, left) = (i * stride, j * stride);
        let mut best = (top, left);
        let mut max = map.get(top, left);
        for r in top..top + pool_size {
            for c in left..left + pool_size {
                let value = map.get(r, c);
                if value > max {
                    max = value;
                    best = (r, c);
                }
            }
        }
        positions.push(best);
        max
    });
    (pooled, positions)
}

/// Max pooling layer.
///
/// The input is `filters` square maps laid end to end. When the filter count
/// is not given explicitly it is taken from the preceding convolution or
/// pooling layer (looking back through activations), falling back to a
/// single map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxPoolingLayer {
    pool_size: usize,
    stride: usize,
    filters: usize,
    input_dim: usize,
    output_dim: usize,
    #[serde(skip)]
    positions: Vec<Vec<(usize, usize)>>,
}

impl MaxPoolingLayer {
    /// Filter count inferred when the layer joins a network.
    pub fn new(pool_size: usize, stride: usize) -> Self {
        Self {
            pool_size,
            stride,
            filters: 0,
            input_dim: 0,
            output_dim: 0,
            positions: Vec::new(),
        }
    }

    pub fn with_filters(pool_size: usize, stride: usize, filters: usize) -> Self {
        Self {
            filters,
            ..Self::new(pool_size, stride)
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn filters(&self) -> usize {
        self.filters
    }

    /// Argmax coordinates recorded by the last forward pass, one list per map.
    pub fn positions(&self) -> &[Vec<(usize, usize)>] {
        &self.positions
    }
}

impl Layer for MaxPoolingLayer {
    fn name(&self) -> &'static str {
        "max_pooling"
    }

    fn forward(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        if self.input_dim == 0 {
            return Err(NetworkError::NotInitialized {
                layer: "max_pooling",
                reason: "input size has not been set",
            });
        }
        ensure_len("max_pooling", self.input_size(), input.len())?;

        let map_len = self.input_dim * self.input_dim;
        let mut output = Vec::with_capacity(self.output_size());
        self.positions.clear();
        for map in input.chunks(map_len) {
            let (pooled, positions) =
                max_pool(&Matrix::square_from_slice(map)?, self.pool_size, self.stride);
            output.extend_from_slice(pooled.as_slice());
            self.positions.push(positions);
        }
        Ok(output)
    }

    fn backward(&mut self, output_error: &[f64]) -> Result<Vec<f64>> {
        if self.positions.len() != self.filters {
            return Err(NetworkError::NotInitialized {
                layer: "max_pooling",
                reason: "backward called without a matching forward",
            });
        }
        ensure_len("max_pooling", self.output_size(), output_error.len())?;

        let map_len = self.input_dim * self.input_dim;
        let out_len = self.output_dim * self.output_dim;
        let mut input_error = vec![0.0; self.input_size()];
        for (filter, positions) in self.positions.iter().enumerate() {
            let errors = &output_error[filter * out_len..(filter + 1) * out_len];
            for (&(row, col), &error) in positions.iter().zip(errors) {
                // Overlapping windows can share an argmax.
                input_error[filter * map_len + row * self.input_dim + col] += error;
            }
        }
        self.positions.clear();
        Ok(input_error)
    }

    fn input_size(&self) -> usize {
        self.filters * self.input_dim * self.input_dim
    }

    fn output_size(&self) -> usize {
        self.filters * self.output_dim * self.output_dim
    }

    fn set_size_io(&mut self, context: SizeContext) -> Result<()> {
        if self.pool_size == 0 || self.stride == 0 {
            return Err(NetworkError::config(format!(
                "max pooling needs a positive pool size and stride (pool {}, stride {})",
                self.pool_size, self.stride
            )));
        }
        if self.filters == 0 {
            self.filters = context.feature_maps.unwrap_or(1);
        }
        if context.input_size % self.filters != 0 {
            return Err(NetworkError::config(format!(
                "max pooling input of {} values cannot be split into {} maps",
                context.input_size, self.filters
            )));
        }
        let map_len = context.input_size / self.filters;
        let dim = square_dim(map_len).ok_or(NetworkError::NonSquareInput {
            layer: "max_pooling",
            len: map_len,
        })?;
        if self.pool_size > dim {
            return Err(NetworkError::InvalidStride {
                layer: "max_pooling",
                dim,
                kernel: self.pool_size,
                stride: self.stride,
            });
        }
        self.input_dim = dim;
        self.output_dim = output_dim(dim, self.pool_size, self.stride);
        Ok(())
    }

    fn feature_maps(&self) -> Option<usize> {
        Some(self.filters)
    }
}
