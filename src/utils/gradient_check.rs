//! Finite-difference gradients used to verify hand-derived backpropagation.

/// Centered finite-difference gradient of `f` at `x`.
///
/// `grad[i] = (f(x + h e_i) - f(x - h e_i)) / 2h`
pub fn finite_difference_gradient<F>(mut f: F, x: &[f64], h: f64) -> Vec<f64>
where
    F: FnMut(&[f64]) -> f64,
{
    let mut probe = x.to_vec();
    let mut grad = vec![0.0; x.len()];
    for i in 0..x.len() {
        let original = probe[i];
        probe[i] = original + h;
        let plus = f(&probe);
        probe[i] = original - h;
        let minus = f(&probe);
        probe[i] = original;
        grad[i] = (plus - minus) / (2.0 * h);
    }
    grad
}

/// Euclidean distance between two equal-length vectors.
pub fn l2_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
