//! Error types for layer construction, sizing and propagation.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors raised by layers, the network and the configuration loaders.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// A buffer length disagrees with the size the layer was configured for.
    #[error("{layer}: expected length {expected}, got {actual}")]
    ShapeMismatch {
        layer: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Spatial layers only accept flattened square maps.
    #[error("{layer}: input of length {len} is not a square feature map")]
    NonSquareInput { layer: &'static str, len: usize },

    /// The kernel/stride pair does not tile the input dimension exactly.
    #[error("{layer}: kernel {kernel} with stride {stride} does not tile input dimension {dim}")]
    InvalidStride {
        layer: &'static str,
        dim: usize,
        kernel: usize,
        stride: usize,
    },

    /// Hyper-parameters or configuration values that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Recurrent layers unroll over a fixed number of steps.
    #[error("{layer}: sequence of {actual} values does not match fixed length {sequence_length} x {vocab_size}")]
    UnsupportedSequence {
        layer: &'static str,
        sequence_length: usize,
        vocab_size: usize,
        actual: usize,
    },

    /// Forward/backward called before sizes or parameters exist.
    #[error("{layer}: {reason}")]
    NotInitialized {
        layer: &'static str,
        reason: &'static str,
    },

    /// A layer of an architecture config failed to build.
    #[error("Layer {index}: {source}")]
    Layer {
        index: usize,
        #[source]
        source: Box<NetworkError>,
    },

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File system failure while loading or saving.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetworkError {
    /// Shorthand for [`NetworkError::InvalidConfig`].
    pub fn config(message: impl Into<String>) -> Self {
        NetworkError::InvalidConfig(message.into())
    }

    /// Attaches the position of the failing layer.
    pub fn at_layer(self, index: usize) -> Self {
        NetworkError::Layer {
            index,
            source: Box::new(self),
        }
    }
}

/// Fails with [`NetworkError::ShapeMismatch`] unless `actual == expected`.
pub(crate) fn ensure_len(layer: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(NetworkError::ShapeMismatch {
            layer,
            expected,
            actual,
        });
    }
    Ok(())
}
