//! Shared utilities for layer implementations
//!
//! This module provides the dense matrix type, activation functions, seeded
//! random number generation and the finite-difference gradient oracle.

pub mod activations;
pub mod gradient_check;
pub mod matrix;
pub mod rng;

pub use activations::ActivationType;
pub use matrix::Matrix;
