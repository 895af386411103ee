//! Gradient descent update rule
//!
//! Performs the basic in-place update: `parameter = parameter - learning_rate * gradient`

/// Applies `parameters[i] -= learning_rate * gradients[i]`.
///
/// # Panics
///
/// Panics if `parameters` and `gradients` have different lengths.
///
/// # Examples
///
/// ```
/// use neural_layers::optimizers::sgd::gradient_descent_step;
///
/// let mut params = vec![1.0, 2.0, 3.0];
/// gradient_descent_step(&mut params, &[0.1, 0.2, 0.3], 0.1);
/// assert!((params[0] - 0.99).abs() < 1e-12);
/// ```
pub fn gradient_descent_step(parameters: &mut [f64], gradients: &[f64], learning_rate: f64) {
    assert_eq!(
        parameters.len(),
        gradients.len(),
        "Parameters and gradients must have the same length"
    );

    for (param, grad) in parameters.iter_mut().zip(gradients.iter()) {
        *param -= learning_rate * grad;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_multiple_updates() {
        let mut params = vec![1.0, 1.0];
        let grads = vec![1.0, -1.0];

        gradient_descent_step(&mut params, &grads, 0.01);
        assert!((params[0] - 0.99).abs() < 1e-12);
        assert!((params[1] - 1.01).abs() < 1e-12);

        gradient_descent_step(&mut params, &grads, 0.01);
        assert!((params[0] - 0.98).abs() < 1e-12);
        assert!((params[1] - 1.02).abs() < 1e-12);
    }

    #[test]
    fn test_sgd_zero_learning_rate() {
        let mut params = vec![1.0, 2.0, 3.0];
        let original = params.clone();
        gradient_descent_step(&mut params, &[0.1, 0.2, 0.3], 0.0);
        assert_eq!(params, original);
    }

    #[test]
    #[should_panic(expected = "Parameters and gradients must have the same length")]
    fn test_sgd_mismatched_lengths() {
        let mut params = vec![1.0, 2.0];
        gradient_descent_step(&mut params, &[0.1, 0.2, 0.3], 0.01);
    }
}
