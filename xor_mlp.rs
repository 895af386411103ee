use std::env;
use std::error::Error;

use neural_layers::architecture::{build_network, load_architecture};
use neural_layers::config::load_config;
use neural_layers::Network;
use tracing::{info, Level};

// Small MLP to learn XOR (educational example).
const DEFAULT_CONFIG: &str = "config/xor_adam.json";
const DEFAULT_ARCHITECTURE: &str = "config/architectures/xor_mlp.json";
const MODEL_PATH: &str = "xor_mlp_model.json";

// XOR dataset (binary inputs and expected outputs).
fn xor_dataset() -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let inputs = vec![
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ];
    let targets = vec![vec![0.0], vec![1.0], vec![1.0], vec![0.0]];
    (inputs, targets)
}

// Print predictions against the expected outputs.
fn test(network: &mut Network, inputs: &[Vec<f64>], targets: &[Vec<f64>]) -> Result<(), Box<dyn Error>> {
    println!("\nTesting the trained network:");
    for (input, target) in inputs.iter().zip(targets) {
        let output = network.predict(input)?;
        println!(
            "Input: {:.1}, {:.1}  Expected: {:.1}  Predicted: {:.3}",
            input[0], input[1], target[0], output[0]
        );
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args: Vec<String> = env::args().collect();
    let config_path = args.get(1).map(String::as_str).unwrap_or(DEFAULT_CONFIG);
    let architecture_path = args.get(2).map(String::as_str).unwrap_or(DEFAULT_ARCHITECTURE);

    let config = load_config(config_path)?;
    let architecture = load_architecture(architecture_path)?;
    let mut network = build_network(&architecture)?;
    info!(
        parameters = network.parameter_count(),
        epochs = config.epochs,
        "built network"
    );

    let (inputs, targets) = xor_dataset();
    let losses = network.train(&inputs, &targets, &config)?;
    if let Some(last) = losses.last() {
        info!(final_loss = last, "training finished");
    }

    test(&mut network, &inputs, &targets)?;

    network.save(MODEL_PATH)?;
    let mut restored = Network::load(MODEL_PATH)?;
    for input in &inputs {
        assert_eq!(network.predict(input)?, restored.predict(input)?);
    }
    info!(path = MODEL_PATH, "model saved and reloaded");
    Ok(())
}
