//! Numerical gradient checking for every layer type
//!
//! Each test builds a small network, runs one analytic backward pass and
//! compares the stored gradients (and the gradient reaching the network
//! input) against centered finite differences of the end-to-end loss.

use neural_layers::layers::{
    ActivationLayer, ConvolutionalLayer, DenseLayer, LstmGate, LstmLayer, MaxPoolingLayer,
    NetworkLayer, RecurrentLayer, SoftmaxLayer,
};
use neural_layers::utils::gradient_check::{finite_difference_gradient, l2_distance};
use neural_layers::utils::rng::{seeded_rng, symmetric_uniform};
use neural_layers::utils::ActivationType;
use neural_layers::{LossType, Network};

const H: f64 = 1e-5;
const TOLERANCE: f64 = 1e-5;

// ============================================================================
// Helpers
// ============================================================================

fn random_vec(len: usize, seed: u64) -> Vec<f64> {
    let mut rng = seeded_rng(Some(seed));
    (0..len).map(|_| symmetric_uniform(&mut rng, 1.0)).collect()
}

fn one_hot(len: usize, index: usize) -> Vec<f64> {
    let mut v = vec![0.0; len];
    v[index] = 1.0;
    v
}

fn network_loss(network: &mut Network, input: &[f64], truth: &[f64]) -> f64 {
    let predicted = network.predict(input).unwrap();
    network.loss().loss(truth, &predicted).unwrap()
}

/// Runs forward + backward once, leaving parameter gradients stored, and
/// returns the analytic gradient with respect to the input.
fn analytic_pass(network: &mut Network, input: &[f64], truth: &[f64]) -> Vec<f64> {
    let predicted = network.predict(input).unwrap();
    let error = network.loss().gradient(truth, &predicted).unwrap();
    network.backward(&error).unwrap()
}

fn assert_input_gradient(network: &mut Network, input: &[f64], truth: &[f64]) {
    let analytic = analytic_pass(network, input, truth);
    let numeric = finite_difference_gradient(|x| network_loss(network, x, truth), input, H);
    let distance = l2_distance(&analytic, &numeric);
    assert!(
        distance < TOLERANCE,
        "input gradient mismatch: L2 distance {distance}\nanalytic {analytic:?}\nnumeric {numeric:?}"
    );
}

/// Compares the stored gradient of one parameter array with finite
/// differences obtained by perturbing that array in place.
fn assert_parameter_gradient<P, G>(
    network: &mut Network,
    input: &[f64],
    truth: &[f64],
    parameter: P,
    gradient: G,
) where
    P: for<'a> Fn(&'a mut Network) -> &'a mut [f64],
    G: Fn(&Network) -> Vec<f64>,
{
    analytic_pass(network, input, truth);
    let analytic = gradient(network);

    let len = parameter(network).len();
    let mut numeric = vec![0.0; len];
    for i in 0..len {
        let original = parameter(network)[i];
        parameter(network)[i] = original + H;
        let plus = network_loss(network, input, truth);
        parameter(network)[i] = original - H;
        let minus = network_loss(network, input, truth);
        parameter(network)[i] = original;
        numeric[i] = (plus - minus) / (2.0 * H);
    }

    let distance = l2_distance(&analytic, &numeric);
    assert!(
        distance < TOLERANCE,
        "parameter gradient mismatch: L2 distance {distance}\nanalytic {analytic:?}\nnumeric {numeric:?}"
    );
}

fn dense_mut(network: &mut Network, index: usize) -> &mut DenseLayer {
    match &mut network.layers_mut()[index] {
        NetworkLayer::Dense(layer) => layer,
        other => panic!("layer {index} is not dense: {other:?}"),
    }
}

fn dense(network: &Network, index: usize) -> &DenseLayer {
    match &network.layers()[index] {
        NetworkLayer::Dense(layer) => layer,
        other => panic!("layer {index} is not dense: {other:?}"),
    }
}

fn conv_mut(network: &mut Network, index: usize) -> &mut ConvolutionalLayer {
    match &mut network.layers_mut()[index] {
        NetworkLayer::Convolutional(layer) => layer,
        other => panic!("layer {index} is not convolutional: {other:?}"),
    }
}

fn conv(network: &Network, index: usize) -> &ConvolutionalLayer {
    match &network.layers()[index] {
        NetworkLayer::Convolutional(layer) => layer,
        other => panic!("layer {index} is not convolutional: {other:?}"),
    }
}

fn recurrent_mut(network: &mut Network, index: usize) -> &mut RecurrentLayer {
    match &mut network.layers_mut()[index] {
        NetworkLayer::Recurrent(layer) => layer,
        other => panic!("layer {index} is not recurrent: {other:?}"),
    }
}

/// Values of the `k`-th recurrent parameter (`U, W, V, b, c` order) of
/// the first layer.
fn recurrent_values(network: &mut Network, k: usize) -> &mut [f64] {
    let parameter = recurrent_mut(network, 0)
        .parameters_mut()
        .into_iter()
        .nth(k)
        .expect("recurrent layers have five parameters");
    parameter.values_mut().as_mut_slice()
}

fn recurrent(network: &Network, index: usize) -> &RecurrentLayer {
    match &network.layers()[index] {
        NetworkLayer::Recurrent(layer) => layer,
        other => panic!("layer {index} is not recurrent: {other:?}"),
    }
}

fn lstm_mut(network: &mut Network, index: usize) -> &mut LstmLayer {
    match &mut network.layers_mut()[index] {
        NetworkLayer::Lstm(layer) => layer,
        other => panic!("layer {index} is not lstm: {other:?}"),
    }
}

fn lstm(network: &Network, index: usize) -> &LstmLayer {
    match &network.layers()[index] {
        NetworkLayer::Lstm(layer) => layer,
        other => panic!("layer {index} is not lstm: {other:?}"),
    }
}

fn check_conv_kernels(network: &mut Network, index: usize, input: &[f64], truth: &[f64]) {
    let (channels, filters) = {
        let layer = conv(network, index);
        (layer.channels(), layer.filters())
    };
    for channel in 0..channels {
        for filter in 0..filters {
            assert_parameter_gradient(
                network,
                input,
                truth,
                |n| conv_mut(n, index).kernel_mut(channel, filter).as_mut_slice(),
                |n| {
                    conv(n, index)
                        .kernel_gradient(channel, filter)
                        .as_slice()
                        .to_vec()
                },
            );
        }
    }
}

// ============================================================================
// Dense, activation and softmax
// ============================================================================

mod dense_tests {
    use super::*;

    fn mlp(activation: ActivationType) -> Network {
        let mut network = Network::with_seed(4, 11);
        network.add(DenseLayer::with_output_size(5)).unwrap();
        network.add(ActivationLayer::new(activation)).unwrap();
        network.add(DenseLayer::with_output_size(3)).unwrap();
        network
    }

    #[test]
    fn test_dense_input_gradient() {
        let mut network = mlp(ActivationType::Tanh);
        assert_input_gradient(&mut network, &random_vec(4, 1), &random_vec(3, 2));
    }

    #[test]
    fn test_dense_weight_and_bias_gradients() {
        let mut network = mlp(ActivationType::Sigmoid);
        let (input, truth) = (random_vec(4, 3), random_vec(3, 4));
        for index in [0, 2] {
            assert_parameter_gradient(
                &mut network,
                &input,
                &truth,
                |n| dense_mut(n, index).weights_mut().as_mut_slice(),
                |n| dense(n, index).weight_gradient().as_slice().to_vec(),
            );
            assert_parameter_gradient(
                &mut network,
                &input,
                &truth,
                |n| dense_mut(n, index).biases_mut(),
                |n| dense(n, index).bias_gradient().to_vec(),
            );
        }
    }

    #[test]
    fn test_relu_gradient_away_from_kink() {
        let mut network = mlp(ActivationType::Relu);
        assert_input_gradient(&mut network, &random_vec(4, 5), &random_vec(3, 6));
    }

    #[test]
    fn test_softmax_with_crossentropy() {
        let mut network = mlp(ActivationType::Tanh);
        network.add(SoftmaxLayer::new()).unwrap();
        network.use_loss(LossType::CategoricalCrossentropy);
        let (input, truth) = (random_vec(4, 7), one_hot(3, 1));

        assert_input_gradient(&mut network, &input, &truth);
        assert_parameter_gradient(
            &mut network,
            &input,
            &truth,
            |n| dense_mut(n, 2).weights_mut().as_mut_slice(),
            |n| dense(n, 2).weight_gradient().as_slice().to_vec(),
        );
    }
}

// ============================================================================
// Convolution
// ============================================================================

mod convolution_tests {
    use super::*;

    fn conv_network(
        dim: usize,
        channels: usize,
        kernel: usize,
        filters: usize,
        stride: usize,
    ) -> Network {
        let mut network = Network::with_seed(channels * dim * dim, 21);
        network
            .add(ConvolutionalLayer::new(kernel, filters, stride, channels))
            .unwrap();
        network.add(ActivationLayer::new(ActivationType::Tanh)).unwrap();
        network.add(DenseLayer::with_output_size(2)).unwrap();
        network
    }

    #[test]
    fn test_single_filter_stride_one() {
        let mut network = conv_network(5, 1, 3, 1, 1);
        let (input, truth) = (random_vec(25, 1), random_vec(2, 2));
        assert_input_gradient(&mut network, &input, &truth);
        check_conv_kernels(&mut network, 0, &input, &truth);
    }

    #[test]
    fn test_multiple_filters_stride_two() {
        let mut network = conv_network(7, 1, 3, 3, 2);
        let (input, truth) = (random_vec(49, 3), random_vec(2, 4));
        assert_input_gradient(&mut network, &input, &truth);
        check_conv_kernels(&mut network, 0, &input, &truth);
    }

    #[test]
    fn test_kernel_two_stride_two() {
        let mut network = conv_network(6, 1, 2, 2, 2);
        let (input, truth) = (random_vec(36, 5), random_vec(2, 6));
        assert_input_gradient(&mut network, &input, &truth);
        check_conv_kernels(&mut network, 0, &input, &truth);
    }

    #[test]
    fn test_multi_channel() {
        let mut network = conv_network(6, 3, 3, 2, 1);
        let (input, truth) = (random_vec(3 * 36, 7), random_vec(2, 8));
        assert_input_gradient(&mut network, &input, &truth);
        check_conv_kernels(&mut network, 0, &input, &truth);
    }

    #[test]
    fn test_multi_channel_strided() {
        let mut network = conv_network(7, 2, 3, 2, 2);
        let (input, truth) = (random_vec(2 * 49, 9), random_vec(2, 10));
        assert_input_gradient(&mut network, &input, &truth);
        check_conv_kernels(&mut network, 0, &input, &truth);
    }

    #[test]
    fn test_stacked_convolutions() {
        let mut network = Network::with_seed(2 * 36, 31);
        network.add(ConvolutionalLayer::new(3, 2, 1, 2)).unwrap();
        network.add(ActivationLayer::new(ActivationType::Sigmoid)).unwrap();
        network.add(ConvolutionalLayer::new(2, 2, 1, 2)).unwrap();
        network.add(DenseLayer::with_output_size(2)).unwrap();
        let (input, truth) = (random_vec(72, 11), random_vec(2, 12));

        assert_input_gradient(&mut network, &input, &truth);
        check_conv_kernels(&mut network, 0, &input, &truth);
        check_conv_kernels(&mut network, 2, &input, &truth);
    }
}

// ============================================================================
// Max pooling
// ============================================================================

mod pooling_tests {
    use super::*;

    #[test]
    fn test_pooling_after_convolution() {
        let mut network = Network::with_seed(36, 41);
        network.add(ConvolutionalLayer::new(3, 2, 1, 1)).unwrap();
        network.add(MaxPoolingLayer::new(2, 2)).unwrap();
        network.add(DenseLayer::with_output_size(2)).unwrap();
        let (input, truth) = (random_vec(36, 13), random_vec(2, 14));

        assert_input_gradient(&mut network, &input, &truth);
        check_conv_kernels(&mut network, 0, &input, &truth);
    }

    #[test]
    fn test_overlapping_pooling() {
        let mut network = Network::with_seed(25, 43);
        network.add(MaxPoolingLayer::new(2, 1)).unwrap();
        network.add(DenseLayer::with_output_size(3)).unwrap();
        assert_input_gradient(&mut network, &random_vec(25, 15), &random_vec(3, 16));
    }
}

// ============================================================================
// Recurrent and LSTM
// ============================================================================

mod recurrent_tests {
    use super::*;

    fn rnn(activation: ActivationType) -> Network {
        let mut network = Network::with_seed(3 * 4, 51);
        network
            .add(RecurrentLayer::new(3, 5, 4).with_activation(activation))
            .unwrap();
        network
    }

    #[test]
    fn test_recurrent_input_gradient() {
        let mut network = rnn(ActivationType::Tanh);
        assert_input_gradient(&mut network, &random_vec(12, 17), &random_vec(12, 18));
    }

    #[test]
    fn test_recurrent_parameter_gradients() {
        let mut network = rnn(ActivationType::Tanh);
        let (input, truth) = (random_vec(12, 19), random_vec(12, 20));
        for k in 0..5 {
            assert_parameter_gradient(
                &mut network,
                &input,
                &truth,
                |n| recurrent_values(n, k),
                |n| recurrent(n, 0).parameters()[k].gradient().as_slice().to_vec(),
            );
        }
    }

    #[test]
    fn test_recurrent_sigmoid_cell() {
        let mut network = rnn(ActivationType::Sigmoid);
        let (input, truth) = (random_vec(12, 21), random_vec(12, 22));
        assert_input_gradient(&mut network, &input, &truth);
        assert_parameter_gradient(
            &mut network,
            &input,
            &truth,
            |n| recurrent_values(n, 1),
            |n| recurrent(n, 0).parameters()[1].gradient().as_slice().to_vec(),
        );
    }

    fn lstm_network() -> Network {
        let mut network = Network::with_seed(3 * 4, 61);
        network.add(LstmLayer::new(3, 4, 4)).unwrap();
        network.add(SoftmaxLayer::new()).unwrap();
        network.use_loss(LossType::CategoricalCrossentropy);
        network
    }

    #[test]
    fn test_lstm_input_gradient() {
        let mut network = lstm_network();
        assert_input_gradient(&mut network, &random_vec(12, 23), &one_hot(3, 2));
    }

    #[test]
    fn test_lstm_gate_gradients() {
        let mut network = lstm_network();
        let (input, truth) = (random_vec(12, 25), one_hot(3, 0));
        for gate in [
            LstmGate::Forget,
            LstmGate::Input,
            LstmGate::Candidate,
            LstmGate::Output,
            LstmGate::Projection,
        ] {
            assert_parameter_gradient(
                &mut network,
                &input,
                &truth,
                |n| lstm_mut(n, 0).gate_weights_mut(gate).as_mut_slice(),
                |n| lstm(n, 0).gate(gate).weight_gradient().as_slice().to_vec(),
            );
            assert_parameter_gradient(
                &mut network,
                &input,
                &truth,
                |n| lstm_mut(n, 0).gate_biases_mut(gate),
                |n| lstm(n, 0).gate(gate).bias_gradient().to_vec(),
            );
        }
    }

    #[test]
    fn test_lstm_followed_by_dense() {
        let mut network = Network::with_seed(2 * 3, 63);
        network.add(LstmLayer::new(2, 3, 3)).unwrap();
        network.add(ActivationLayer::new(ActivationType::Tanh)).unwrap();
        network.add(DenseLayer::with_output_size(2)).unwrap();
        assert_input_gradient(&mut network, &random_vec(6, 27), &random_vec(2, 28));
    }
}
