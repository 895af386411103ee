//! Row-major dense matrix used for weight storage
//!
//! Layers keep their activations as flat `Vec<f64>` buffers and only reach for
//! [`Matrix`] where a 2D view is needed: weight matrices, convolution filters and
//! the softmax Jacobian.

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};

/// Dense row-major matrix of `f64`.
///
/// Element `(r, c)` lives at `data[r * cols + c]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Zero-filled `rows × cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Wraps row-major `data`, checking that it holds `rows × cols` values.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(NetworkError::ShapeMismatch {
                layer: "matrix",
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Reshapes a flattened square map of side `sqrt(len)`.
    pub fn square_from_slice(values: &[f64]) -> Result<Self> {
        let dim = square_dim(values.len()).ok_or(NetworkError::NonSquareInput {
            layer: "matrix",
            len: values.len(),
        })?;
        Ok(Self {
            rows: dim,
            cols: dim,
            data: values.to_vec(),
        })
    }

    /// Builds a matrix by evaluating `f(row, col)` for every cell.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// Row `r` as a slice.
    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Sets every element to zero, keeping the shape.
    pub fn fill_zero(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Row vector times matrix: `x · M`, with `x.len() == rows`.
    pub fn vec_mul(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.rows);
        let mut out = vec![0.0; self.cols];
        for (r, &xr) in x.iter().enumerate() {
            if xr == 0.0 {
                continue;
            }
            for (o, &w) in out.iter_mut().zip(self.row(r)) {
                *o += xr * w;
            }
        }
        out
    }

    /// Matrix times column vector: `M · x`, with `x.len() == cols`.
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.cols);
        (0..self.rows)
            .map(|r| self.row(r).iter().zip(x).map(|(w, v)| w * v).sum())
            .collect()
    }

    /// Accumulates the outer product: `M[i][j] += a[i] * b[j]`.
    pub fn add_outer(&mut self, a: &[f64], b: &[f64]) {
        debug_assert_eq!(a.len(), self.rows);
        debug_assert_eq!(b.len(), self.cols);
        for (i, &ai) in a.iter().enumerate() {
            let row = &mut self.data[i * self.cols..(i + 1) * self.cols];
            for (m, &bj) in row.iter_mut().zip(b) {
                *m += ai * bj;
            }
        }
    }

    /// Element-wise `self += other`.
    pub fn add_assign(&mut self, other: &Matrix) {
        debug_assert_eq!(self.data.len(), other.data.len());
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    pub fn transpose(&self) -> Matrix {
        Matrix::from_fn(self.cols, self.rows, |r, c| self.get(c, r))
    }

    /// Rotates the matrix by 180 degrees (flip both axes).
    pub fn rotate180(&self) -> Matrix {
        Matrix::from_fn(self.rows, self.cols, |r, c| {
            self.get(self.rows - 1 - r, self.cols - 1 - c)
        })
    }
}

/// Side length of a flattened square map, if `len` is a perfect square.
pub fn square_dim(len: usize) -> Option<usize> {
    let dim = (len as f64).sqrt().round() as usize;
    (dim * dim == len).then_some(dim)
}

/// Element-wise `a += b`.
pub fn add_in_place(a: &mut [f64], b: &[f64]) {
    debug_assert_eq!(a.len(), b.len());
    for (x, y) in a.iter_mut().zip(b) {
        *x += y;
    }
}

/// Element-wise product of two equal-length buffers.
pub fn hadamard(a: &[f64], b: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).collect()
}
