//! Seeded random number generation for reproducible initialization.
//!
//! Every random draw in the crate (weight initialization, minibatch shuffling)
//! goes through a [`StdRng`] so that a fixed seed reproduces a run exactly.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Creates an RNG from an explicit seed, or from OS entropy when `None`.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Draws a weight from `N(0, 1/sqrt(fan_in))`.
pub fn scaled_normal(rng: &mut StdRng, fan_in: usize) -> f64 {
    let sigma = 1.0 / (fan_in.max(1) as f64).sqrt();
    // sigma is finite and positive for any fan_in >= 1
    match Normal::new(0.0, sigma) {
        Ok(normal) => normal.sample(rng),
        Err(_) => 0.0,
    }
}

/// Uniform sample in `[-limit, limit)`.
pub fn symmetric_uniform(rng: &mut StdRng, limit: f64) -> f64 {
    if limit <= 0.0 {
        return 0.0;
    }
    rng.gen_range(-limit..limit)
}

/// Fills `values` with draws from `N(0, 1/sqrt(fan_in))`.
pub fn fill_scaled_normal(rng: &mut StdRng, values: &mut [f64], fan_in: usize) {
    for value in values.iter_mut() {
        *value = scaled_normal(rng, fan_in);
    }
}

/// A shuffled permutation of `0..n`.
pub fn shuffled_indices(rng: &mut StdRng, n: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices
}
