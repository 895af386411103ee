//! Layer abstractions for neural networks
//!
//! This module provides the [`Layer`] and [`ParameterizedLayer`] traits, every
//! concrete layer type, and [`NetworkLayer`], the tagged union a network
//! stores and serializes.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::Result;

mod r#trait;
pub mod activation;
pub mod conv_operator;
pub mod convolutional;
pub mod dense;
pub mod lstm;
pub mod parameter;
pub mod pooling;
pub mod recurrent;

pub use activation::{ActivationLayer, SoftmaxLayer};
pub use conv_operator::ConvolutionalOperator;
pub use convolutional::ConvolutionalLayer;
pub use dense::DenseLayer;
pub use lstm::{LstmGate, LstmLayer};
pub use parameter::Parameter;
pub use pooling::MaxPoolingLayer;
pub use r#trait::{Layer, ParameterizedLayer, SizeContext};
pub use recurrent::RecurrentLayer;

/// Any layer a [`crate::Network`] can hold.
///
/// Serialized with a `layer_type` tag so a saved model can be rebuilt
/// without knowing its layout in advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer_type", rename_all = "snake_case")]
pub enum NetworkLayer {
    Dense(DenseLayer),
    Activation(ActivationLayer),
    Softmax(SoftmaxLayer),
    Convolutional(ConvolutionalLayer),
    MaxPooling(MaxPoolingLayer),
    Recurrent(RecurrentLayer),
    Lstm(LstmLayer),
}

macro_rules! dispatch {
    ($self:expr, $layer:ident => $body:expr) => {
        match $self {
            NetworkLayer::Dense($layer) => $body,
            NetworkLayer::Activation($layer) => $body,
            NetworkLayer::Softmax($layer) => $body,
            NetworkLayer::Convolutional($layer) => $body,
            NetworkLayer::MaxPooling($layer) => $body,
            NetworkLayer::Recurrent($layer) => $body,
            NetworkLayer::Lstm($layer) => $body,
        }
    };
}

impl Layer for NetworkLayer {
    fn name(&self) -> &'static str {
        dispatch!(self, layer => layer.name())
    }

    fn forward(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        dispatch!(self, layer => layer.forward(input))
    }

    fn backward(&mut self, output_error: &[f64]) -> Result<Vec<f64>> {
        dispatch!(self, layer => layer.backward(output_error))
    }

    fn input_size(&self) -> usize {
        dispatch!(self, layer => layer.input_size())
    }

    fn output_size(&self) -> usize {
        dispatch!(self, layer => layer.output_size())
    }

    fn set_size_io(&mut self, context: SizeContext) -> Result<()> {
        dispatch!(self, layer => layer.set_size_io(context))
    }

    fn initialize_parameters(&mut self, rng: &mut StdRng) {
        dispatch!(self, layer => layer.initialize_parameters(rng))
    }

    fn is_initialized(&self) -> bool {
        dispatch!(self, layer => layer.is_initialized())
    }

    fn feature_maps(&self) -> Option<usize> {
        dispatch!(self, layer => layer.feature_maps())
    }

    fn as_parameterized(&self) -> Option<&dyn ParameterizedLayer> {
        dispatch!(self, layer => layer.as_parameterized())
    }

    fn as_parameterized_mut(&mut self) -> Option<&mut dyn ParameterizedLayer> {
        dispatch!(self, layer => layer.as_parameterized_mut())
    }
}

macro_rules! impl_from_layer {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for NetworkLayer {
                fn from(layer: $ty) -> Self {
                    NetworkLayer::$variant(layer)
                }
            }
        )*
    };
}

impl_from_layer!(
    Dense(DenseLayer),
    Activation(ActivationLayer),
    Softmax(SoftmaxLayer),
    Convolutional(ConvolutionalLayer),
    MaxPooling(MaxPoolingLayer),
    Recurrent(RecurrentLayer),
    Lstm(LstmLayer),
);
