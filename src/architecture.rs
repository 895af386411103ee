//! Architecture configuration structures
//!
//! This module describes a network as JSON: an entry size, a loss, an
//! optional seed and the ordered layer list. Sizes between layers are
//! inferred, so each layer only states its own hyper-parameters.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ensure_len, NetworkError, Result};
use crate::layers::{
    ActivationLayer, ConvolutionalLayer, DenseLayer, LstmLayer, MaxPoolingLayer, NetworkLayer,
    RecurrentLayer, SoftmaxLayer,
};
use crate::loss::LossType;
use crate::network::Network;
use crate::utils::ActivationType;

fn one() -> usize {
    1
}

/// Configuration for a single layer, tagged by `layer_type`.
///
/// # Examples
///
/// ```json
/// { "layer_type": "dense", "output_size": 128 }
/// ```
///
/// ```json
/// { "layer_type": "convolutional", "kernel_size": 3, "filters": 8, "stride": 1, "channels": 1 }
/// ```
///
/// ```json
/// { "layer_type": "max_pooling", "pool_size": 2 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer_type", rename_all = "snake_case")]
pub enum LayerConfig {
    Dense {
        output_size: usize,
        /// Optional; checked against the previous layer when present.
        #[serde(default)]
        input_size: Option<usize>,
    },
    Activation {
        activation: ActivationType,
    },
    Softmax,
    Convolutional {
        kernel_size: usize,
        filters: usize,
        #[serde(default = "one")]
        stride: usize,
        #[serde(default = "one")]
        channels: usize,
    },
    MaxPooling {
        pool_size: usize,
        /// Defaults to `pool_size` (non-overlapping windows).
        #[serde(default)]
        stride: Option<usize>,
        /// Defaults to the filter count of the preceding convolution.
        #[serde(default)]
        filters: Option<usize>,
    },
    Recurrent {
        vocab_size: usize,
        hidden_size: usize,
        sequence_length: usize,
        #[serde(default)]
        activation: Option<ActivationType>,
    },
    Lstm {
        vocab_size: usize,
        hidden_units: usize,
        sequence_length: usize,
    },
}

impl LayerConfig {
    fn validate(&self, index: usize) -> Result<()> {
        let positive = |name: &str, value: usize| {
            if value == 0 {
                Err(NetworkError::config(format!(
                    "Layer {}: {} must be greater than 0",
                    index, name
                )))
            } else {
                Ok(())
            }
        };
        match *self {
            LayerConfig::Dense { output_size, input_size } => {
                positive("output_size", output_size)?;
                if let Some(input_size) = input_size {
                    positive("input_size", input_size)?;
                }
            }
            LayerConfig::Activation { .. } | LayerConfig::Softmax => {}
            LayerConfig::Convolutional {
                kernel_size,
                filters,
                stride,
                channels,
            } => {
                positive("kernel_size", kernel_size)?;
                positive("filters", filters)?;
                positive("stride", stride)?;
                positive("channels", channels)?;
            }
            LayerConfig::MaxPooling {
                pool_size,
                stride,
                filters,
            } => {
                positive("pool_size", pool_size)?;
                positive("stride", stride.unwrap_or(pool_size))?;
                if let Some(filters) = filters {
                    positive("filters", filters)?;
                }
            }
            LayerConfig::Recurrent {
                vocab_size,
                hidden_size,
                sequence_length,
                ..
            } => {
                positive("vocab_size", vocab_size)?;
                positive("hidden_size", hidden_size)?;
                positive("sequence_length", sequence_length)?;
            }
            LayerConfig::Lstm {
                vocab_size,
                hidden_units,
                sequence_length,
            } => {
                positive("vocab_size", vocab_size)?;
                positive("hidden_units", hidden_units)?;
                positive("sequence_length", sequence_length)?;
            }
        }
        Ok(())
    }

    /// The uninitialized layer this entry describes.
    pub fn to_layer(&self) -> NetworkLayer {
        match *self {
            LayerConfig::Dense { output_size, .. } => DenseLayer::with_output_size(output_size).into(),
            LayerConfig::Activation { activation } => ActivationLayer::new(activation).into(),
            LayerConfig::Softmax => SoftmaxLayer::new().into(),
            LayerConfig::Convolutional {
                kernel_size,
                filters,
                stride,
                channels,
            } => ConvolutionalLayer::new(kernel_size, filters, stride, channels).into(),
            LayerConfig::MaxPooling {
                pool_size,
                stride,
                filters,
            } => {
                let stride = stride.unwrap_or(pool_size);
                match filters {
                    Some(filters) => MaxPoolingLayer::with_filters(pool_size, stride, filters),
                    None => MaxPoolingLayer::new(pool_size, stride),
                }
                .into()
            }
            LayerConfig::Recurrent {
                vocab_size,
                hidden_size,
                sequence_length,
                activation,
            } => RecurrentLayer::new(vocab_size, hidden_size, sequence_length)
                .with_activation(activation.unwrap_or(ActivationType::Tanh))
                .into(),
            LayerConfig::Lstm {
                vocab_size,
                hidden_units,
                sequence_length,
            } => LstmLayer::new(vocab_size, hidden_units, sequence_length).into(),
        }
    }
}

/// Configuration for the entire network.
///
/// # Example
///
/// ```json
/// {
///   "entry_size": 784,
///   "loss": "categorical_crossentropy",
///   "seed": 42,
///   "layers": [
///     { "layer_type": "convolutional", "kernel_size": 3, "filters": 4 },
///     { "layer_type": "activation", "activation": "relu" },
///     { "layer_type": "max_pooling", "pool_size": 2 },
///     { "layer_type": "dense", "output_size": 10 },
///     { "layer_type": "softmax" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    pub entry_size: usize,
    #[serde(default)]
    pub loss: LossType,
    #[serde(default)]
    pub seed: Option<u64>,
    pub layers: Vec<LayerConfig>,
}

impl ArchitectureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.entry_size == 0 {
            return Err(NetworkError::config("entry_size must be greater than 0"));
        }
        if self.layers.is_empty() {
            return Err(NetworkError::config("Architecture must have at least one layer"));
        }
        for (index, layer) in self.layers.iter().enumerate() {
            layer.validate(index)?;
        }
        Ok(())
    }
}

/// Loads and validates an architecture configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use neural_layers::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/cnn_small.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture<P: AsRef<Path>>(path: P) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Builds a sized, initialized network from an architecture configuration.
///
/// Size errors are reported with the index of the layer that caused them.
pub fn build_network(config: &ArchitectureConfig) -> Result<Network> {
    config.validate()?;
    let mut network = match config.seed {
        Some(seed) => Network::with_seed(config.entry_size, seed),
        None => Network::new(config.entry_size),
    };
    network.use_loss(config.loss);

    for (index, layer_config) in config.layers.iter().enumerate() {
        if let LayerConfig::Dense {
            input_size: Some(declared),
            ..
        } = *layer_config
        {
            ensure_len("dense", network.output_size(), declared)
                .map_err(|err| err.at_layer(index))?;
        }
        network
            .add(layer_config.to_layer())
            .map_err(|err| err.at_layer(index))?;
    }
    Ok(network)
}
