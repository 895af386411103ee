//! Comprehensive tests for architecture parsing and building
//!
//! This file tests the architecture module including:
//! - Loading the bundled JSON architecture configs
//! - Parsing every layer type
//! - Building networks from configs
//! - Handling invalid JSON and missing files
//! - Validating layer connections

use neural_layers::architecture::{build_network, load_architecture, ArchitectureConfig, LayerConfig};
use neural_layers::layers::{Layer, NetworkLayer};
use neural_layers::utils::ActivationType;
use neural_layers::{LossType, NetworkError};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("failed to write temp config");
    file
}

fn parse(json: &str) -> ArchitectureConfig {
    serde_json::from_str(json).expect("architecture should parse")
}

// ============================================================================
// Bundled Architecture Tests
// ============================================================================

mod bundled_architecture_tests {
    use super::*;

    #[test]
    fn test_xor_mlp() {
        let config = load_architecture("config/architectures/xor_mlp.json").unwrap();
        assert_eq!(config.entry_size, 2);
        assert_eq!(config.loss, LossType::MeanSquaredError);
        assert_eq!(config.layers.len(), 4);

        let network = build_network(&config).unwrap();
        assert_eq!(network.output_size(), 1);
        assert_eq!(network.parameter_count(), 2 * 4 + 4 + 4 + 1);
    }

    #[test]
    fn test_cnn_small() {
        let config = load_architecture("config/architectures/cnn_small.json").unwrap();
        let network = build_network(&config).unwrap();

        // 28x28 -> conv k3 (4 maps of 26x26) -> pool 2 (4 maps of 13x13) -> 10
        assert_eq!(network.layers()[0].output_size(), 4 * 26 * 26);
        assert_eq!(network.layers()[2].output_size(), 4 * 13 * 13);
        assert_eq!(network.output_size(), 10);
        assert_eq!(network.loss(), LossType::CategoricalCrossentropy);
    }

    #[test]
    fn test_lstm_sequence() {
        let config = load_architecture("config/architectures/lstm_sequence.json").unwrap();
        let mut network = build_network(&config).unwrap();
        assert_eq!(network.output_size(), 4);

        let output = network.predict(&[0.0; 12]).unwrap();
        assert!((output.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_seeded_builds_are_identical() {
        let config = load_architecture("config/architectures/cnn_small.json").unwrap();
        let a = build_network(&config).unwrap();
        let b = build_network(&config).unwrap();
        assert_eq!(a.layers(), b.layers());
    }
}

// ============================================================================
// Layer Parsing Tests
// ============================================================================

mod layer_parsing_tests {
    use super::*;

    #[test]
    fn test_parse_every_layer_type() {
        let config = parse(
            r#"{
  "entry_size": 12,
  "layers": [
    { "layer_type": "dense", "output_size": 12 },
    { "layer_type": "activation", "activation": "sigmoid" },
    { "layer_type": "softmax" },
    { "layer_type": "convolutional", "kernel_size": 2, "filters": 3, "stride": 2, "channels": 1 },
    { "layer_type": "max_pooling", "pool_size": 2, "stride": 1, "filters": 3 },
    { "layer_type": "recurrent", "vocab_size": 3, "hidden_size": 5, "sequence_length": 4, "activation": "relu" },
    { "layer_type": "lstm", "vocab_size": 3, "hidden_units": 2, "sequence_length": 4 }
  ]
}"#,
        );

        assert_eq!(
            config.layers,
            vec![
                LayerConfig::Dense {
                    output_size: 12,
                    input_size: None
                },
                LayerConfig::Activation {
                    activation: ActivationType::Sigmoid
                },
                LayerConfig::Softmax,
                LayerConfig::Convolutional {
                    kernel_size: 2,
                    filters: 3,
                    stride: 2,
                    channels: 1
                },
                LayerConfig::MaxPooling {
                    pool_size: 2,
                    stride: Some(1),
                    filters: Some(3)
                },
                LayerConfig::Recurrent {
                    vocab_size: 3,
                    hidden_size: 5,
                    sequence_length: 4,
                    activation: Some(ActivationType::Relu)
                },
                LayerConfig::Lstm {
                    vocab_size: 3,
                    hidden_units: 2,
                    sequence_length: 4
                },
            ]
        );
    }

    #[test]
    fn test_convolution_defaults() {
        let config = parse(
            r#"{ "entry_size": 25, "layers": [ { "layer_type": "convolutional", "kernel_size": 3, "filters": 2 } ] }"#,
        );
        assert_eq!(
            config.layers[0],
            LayerConfig::Convolutional {
                kernel_size: 3,
                filters: 2,
                stride: 1,
                channels: 1
            }
        );
    }

    #[test]
    fn test_to_layer_kinds() {
        let pooling = LayerConfig::MaxPooling {
            pool_size: 3,
            stride: None,
            filters: None,
        };
        match pooling.to_layer() {
            NetworkLayer::MaxPooling(layer) => {
                assert_eq!(layer.pool_size(), 3);
                assert_eq!(layer.stride(), 3);
            }
            other => panic!("unexpected layer {other:?}"),
        }

        let recurrent = LayerConfig::Recurrent {
            vocab_size: 2,
            hidden_size: 3,
            sequence_length: 4,
            activation: None,
        };
        match recurrent.to_layer() {
            NetworkLayer::Recurrent(layer) => assert_eq!(layer.activation(), ActivationType::Tanh),
            other => panic!("unexpected layer {other:?}"),
        }
    }

    #[test]
    fn test_unknown_layer_type() {
        let result: Result<ArchitectureConfig, _> = serde_json::from_str(
            r#"{ "entry_size": 4, "layers": [ { "layer_type": "batch_norm" } ] }"#,
        );
        assert!(result.is_err());
    }
}

// ============================================================================
// Building Tests
// ============================================================================

mod build_tests {
    use super::*;

    #[test]
    fn test_multi_channel_convolution_stack() {
        let config = parse(
            r#"{
  "entry_size": 72,
  "seed": 5,
  "layers": [
    { "layer_type": "convolutional", "kernel_size": 3, "filters": 4, "channels": 2 },
    { "layer_type": "activation", "activation": "relu" },
    { "layer_type": "max_pooling", "pool_size": 2 },
    { "layer_type": "dense", "output_size": 3 }
  ]
}"#,
        );
        let mut network = build_network(&config).unwrap();

        // channel outputs are summed, so 2 channels x 4 filters still emit 4 maps
        assert_eq!(network.layers()[0].output_size(), 4 * 4 * 4);
        assert_eq!(network.layers()[2].output_size(), 4 * 2 * 2);
        assert_eq!(network.predict(&[0.5; 72]).unwrap().len(), 3);
    }

    #[test]
    fn test_recurrent_network() {
        let config = parse(
            r#"{
  "entry_size": 9,
  "layers": [ { "layer_type": "recurrent", "vocab_size": 3, "hidden_size": 4, "sequence_length": 3 } ]
}"#,
        );
        let network = build_network(&config).unwrap();
        assert_eq!(network.output_size(), 9);
        assert_eq!(network.parameter_count(), 4 * 3 + 4 * 4 + 3 * 4 + 4 + 3);
    }
}

// ============================================================================
// Error Handling Tests
// ============================================================================

mod error_handling_tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_architecture("nonexistent_architecture.json"),
            Err(NetworkError::Io(_))
        ));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_temp_config(r#"{ "entry_size": 4, "layers": [ "#);
        assert!(matches!(
            load_architecture(file.path()),
            Err(NetworkError::Json(_))
        ));
    }

    #[test]
    fn test_empty_layer_list() {
        let file = write_temp_config(r#"{ "entry_size": 4, "layers": [] }"#);
        let err = load_architecture(file.path()).unwrap_err();
        assert!(err.to_string().contains("at least one layer"));
    }

    #[test]
    fn test_zero_entry_size() {
        let file = write_temp_config(
            r#"{ "entry_size": 0, "layers": [ { "layer_type": "softmax" } ] }"#,
        );
        assert!(matches!(
            load_architecture(file.path()),
            Err(NetworkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_hyper_parameter_names_layer() {
        let file = write_temp_config(
            r#"{
  "entry_size": 16,
  "layers": [
    { "layer_type": "softmax" },
    { "layer_type": "convolutional", "kernel_size": 0, "filters": 2 }
  ]
}"#,
        );
        let err = load_architecture(file.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Layer 1"), "{message}");
        assert!(message.contains("kernel_size"), "{message}");
    }

    #[test]
    fn test_dense_input_size_mismatch() {
        let config = parse(
            r#"{
  "entry_size": 3,
  "layers": [
    { "layer_type": "dense", "output_size": 4 },
    { "layer_type": "dense", "input_size": 5, "output_size": 2 }
  ]
}"#,
        );
        let err = build_network(&config).unwrap_err();
        assert!(err.to_string().contains("Layer 1"));
        match err {
            NetworkError::Layer { index, source } => {
                assert_eq!(index, 1);
                assert!(matches!(
                    *source,
                    NetworkError::ShapeMismatch { expected: 4, actual: 5, .. }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stride_that_does_not_tile() {
        let config = parse(
            r#"{
  "entry_size": 36,
  "layers": [ { "layer_type": "convolutional", "kernel_size": 3, "filters": 1, "stride": 2 } ]
}"#,
        );
        let err = build_network(&config).unwrap_err();
        assert!(err.to_string().contains("Layer 0"));
        assert!(err.to_string().contains("does not tile"));
        assert!(matches!(
            err,
            NetworkError::Layer { index: 0, ref source }
                if matches!(**source, NetworkError::InvalidStride { dim: 6, kernel: 3, stride: 2, .. })
        ));
    }

    #[test]
    fn test_non_square_convolution_input() {
        let config = parse(
            r#"{
  "entry_size": 10,
  "layers": [ { "layer_type": "convolutional", "kernel_size": 2, "filters": 1 } ]
}"#,
        );
        assert!(matches!(
            build_network(&config),
            Err(NetworkError::Layer { index: 0, source })
                if matches!(*source, NetworkError::NonSquareInput { len: 10, .. })
        ));
    }

    #[test]
    fn test_sequence_length_mismatch() {
        let config = parse(
            r#"{
  "entry_size": 10,
  "layers": [ { "layer_type": "lstm", "vocab_size": 3, "hidden_units": 2, "sequence_length": 3 } ]
}"#,
        );
        assert!(build_network(&config).is_err());
    }
}
