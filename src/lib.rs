//! Neural network layers and backpropagation
//!
//! This library provides hand-derived forward and backward passes for the
//! layer types a small sequential network needs, the optimizers that update
//! them, and the plumbing to train, configure and persist such a network.
//!
//! # Modules
//!
//! - `layers`: Layer traits and implementations (dense, activation, softmax,
//!   convolutional, max pooling, recurrent, LSTM)
//! - `optimizers`: gradient descent and Adam
//! - `network`: sequential network, training loops and JSON persistence
//! - `loss`: loss functions and their gradients
//! - `utils`: matrix type, activation functions, RNG, gradient checking
//! - `config`: training configuration
//! - `architecture`: architecture configuration and network building
//! - `error`: the crate error type

pub mod architecture;
pub mod config;
pub mod error;
pub mod layers;
pub mod loss;
pub mod network;
pub mod optimizers;
pub mod utils;

pub use error::{NetworkError, Result};
pub use loss::LossType;
pub use network::Network;
