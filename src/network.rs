//! Sequential network: a stack of layers, a loss and the training loops.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{TrainingConfig, TrainingMode};
use crate::error::{ensure_len, NetworkError, Result};
use crate::layers::{Layer, NetworkLayer, SizeContext};
use crate::loss::LossType;
use crate::optimizers::Optimizer;
use crate::utils::rng::{seeded_rng, shuffled_indices};

fn entropy_rng() -> StdRng {
    seeded_rng(None)
}

/// A strictly sequential stack of layers.
///
/// Layers are sized and initialized as they are added: each one receives the
/// previous layer's output size (or the entry size) and the filter count of
/// the nearest preceding layer that emits feature maps.
///
/// # Example
///
/// ```
/// use neural_layers::layers::{ActivationLayer, DenseLayer};
/// use neural_layers::utils::ActivationType;
/// use neural_layers::Network;
///
/// let mut network = Network::with_seed(4, 7);
/// network.add(DenseLayer::with_output_size(8)).unwrap();
/// network.add(ActivationLayer::new(ActivationType::Tanh)).unwrap();
/// network.add(DenseLayer::with_output_size(2)).unwrap();
///
/// let output = network.predict(&[0.1, 0.2, 0.3, 0.4]).unwrap();
/// assert_eq!(output.len(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    entry_size: usize,
    loss: LossType,
    seed: Option<u64>,
    layers: Vec<NetworkLayer>,
    #[serde(skip, default = "entropy_rng")]
    rng: StdRng,
}

impl Network {
    /// An empty network with an entropy-seeded RNG.
    pub fn new(entry_size: usize) -> Self {
        Self {
            entry_size,
            loss: LossType::default(),
            seed: None,
            layers: Vec::new(),
            rng: entropy_rng(),
        }
    }

    /// An empty network whose initialization and shuffling are reproducible.
    pub fn with_seed(entry_size: usize, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            rng: seeded_rng(Some(seed)),
            ..Self::new(entry_size)
        }
    }

    /// Appends a layer, sizing it against the current output and drawing its
    /// parameters unless it already has them.
    pub fn add(&mut self, layer: impl Into<NetworkLayer>) -> Result<()> {
        let mut layer = layer.into();
        let context = SizeContext::new(self.output_size())
            .with_feature_maps(inherited_feature_maps(&self.layers));

        layer.set_size_io(context)?;
        if !layer.is_initialized() {
            layer.initialize_parameters(&mut self.rng);
        }
        debug!(
            layer = layer.name(),
            index = self.layers.len(),
            input_size = layer.input_size(),
            output_size = layer.output_size(),
            "added layer"
        );
        self.layers.push(layer);
        Ok(())
    }

    pub fn use_loss(&mut self, loss: LossType) {
        self.loss = loss;
    }

    pub fn loss(&self) -> LossType {
        self.loss
    }

    pub fn entry_size(&self) -> usize {
        self.entry_size
    }

    /// Output size of the last layer, or the entry size for an empty network.
    pub fn output_size(&self) -> usize {
        self.layers
            .last()
            .map(Layer::output_size)
            .unwrap_or(self.entry_size)
    }

    pub fn layers(&self) -> &[NetworkLayer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [NetworkLayer] {
        &mut self.layers
    }

    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .filter_map(|layer| layer.as_parameterized())
            .map(|layer| layer.parameter_count())
            .sum()
    }

    /// Runs `input` through every layer.
    pub fn predict(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        ensure_len("network", self.entry_size, input.len())?;
        let mut output = input.to_vec();
        for layer in &mut self.layers {
            output = layer.forward(&output)?;
        }
        Ok(output)
    }

    /// Propagates `output_error` back to the input, storing every layer's
    /// parameter gradients without applying them.
    pub fn backward(&mut self, output_error: &[f64]) -> Result<Vec<f64>> {
        let mut error = output_error.to_vec();
        for layer in self.layers.iter_mut().rev() {
            error = layer.backward(&error)?;
        }
        Ok(error)
    }

    /// Applies one optimizer step to every parameterized layer, draining
    /// their gradients.
    pub fn update(&mut self, optimizer: &Optimizer, sample_index: usize) {
        for layer in self.layers.iter_mut().filter_map(|l| l.as_parameterized_mut()) {
            layer.update_parameters(optimizer, sample_index);
        }
    }

    /// Backward pass followed by a parameter update. Returns the gradient with
    /// respect to the network input.
    pub fn backpropagate(
        &mut self,
        output_error: &[f64],
        optimizer: &Optimizer,
        sample_index: usize,
    ) -> Result<Vec<f64>> {
        let input_error = self.backward(output_error)?;
        self.update(optimizer, sample_index);
        Ok(input_error)
    }

    pub fn drain_gradients(&mut self) {
        for layer in self.layers.iter_mut().filter_map(|l| l.as_parameterized_mut()) {
            layer.drain_gradients();
        }
    }

    pub fn set_gradient_accumulation(&mut self, accumulate: bool) {
        for layer in self.layers.iter_mut().filter_map(|l| l.as_parameterized_mut()) {
            layer.set_gradient_accumulation(accumulate);
        }
    }

    /// Trains on `(inputs[i], targets[i])` pairs and returns the average loss
    /// of every epoch.
    ///
    /// Each optimizer step receives a running step index, so Adam's bias
    /// correction keeps advancing across epochs. A `seed` in the config
    /// reseeds the shuffling RNG first. On error the network leaves
    /// accumulation mode with its gradients drained.
    pub fn train(
        &mut self,
        inputs: &[Vec<f64>],
        targets: &[Vec<f64>],
        config: &TrainingConfig,
    ) -> Result<Vec<f64>> {
        config.validate()?;
        if inputs.len() != targets.len() {
            return Err(NetworkError::config(format!(
                "{} inputs but {} targets",
                inputs.len(),
                targets.len()
            )));
        }
        if inputs.is_empty() {
            warn!("training called with an empty data set");
            return Ok(Vec::new());
        }
        if self.layers.is_empty() {
            return Err(NetworkError::config("cannot train a network without layers"));
        }

        let optimizer = config.optimizer()?;
        if let Some(seed) = config.seed {
            self.rng = seeded_rng(Some(seed));
        }

        self.set_gradient_accumulation(config.mode == TrainingMode::Minibatch);
        let result = self.run_epochs(inputs, targets, &optimizer, config);
        self.set_gradient_accumulation(false);
        if result.is_err() {
            self.drain_gradients();
        }
        result
    }

    fn run_epochs(
        &mut self,
        inputs: &[Vec<f64>],
        targets: &[Vec<f64>],
        optimizer: &Optimizer,
        config: &TrainingConfig,
    ) -> Result<Vec<f64>> {
        let mut step = 0;
        let mut losses = Vec::with_capacity(config.epochs);
        for epoch in 0..config.epochs {
            let loss = match config.mode {
                TrainingMode::Sgd => self.sgd_epoch(inputs, targets, optimizer, &mut step)?,
                TrainingMode::Minibatch => self.minibatch_epoch(
                    inputs,
                    targets,
                    optimizer,
                    config.batch_size,
                    &mut step,
                )?,
            };
            info!(epoch = epoch + 1, loss, "epoch finished");
            losses.push(loss);
        }
        Ok(losses)
    }

    fn sgd_epoch(
        &mut self,
        inputs: &[Vec<f64>],
        targets: &[Vec<f64>],
        optimizer: &Optimizer,
        step: &mut usize,
    ) -> Result<f64> {
        let mut total = 0.0;
        for (input, target) in inputs.iter().zip(targets) {
            total += self.accumulate_sample(input, target)?;
            self.update(optimizer, *step);
            *step += 1;
        }
        Ok(total / inputs.len() as f64)
    }

    fn minibatch_epoch(
        &mut self,
        inputs: &[Vec<f64>],
        targets: &[Vec<f64>],
        optimizer: &Optimizer,
        batch_size: usize,
        step: &mut usize,
    ) -> Result<f64> {
        let order = shuffled_indices(&mut self.rng, inputs.len());
        let mut total = 0.0;
        for (batch, indices) in order.chunks(batch_size).enumerate() {
            for &i in indices {
                total += self.accumulate_sample(&inputs[i], &targets[i])?;
            }
            self.update(optimizer, *step);
            *step += 1;
            debug!(batch, size = indices.len(), "applied minibatch update");
        }
        Ok(total / inputs.len() as f64)
    }

    /// Forward and backward for one sample; returns its loss.
    fn accumulate_sample(&mut self, input: &[f64], target: &[f64]) -> Result<f64> {
        let predicted = self.predict(input)?;
        let loss = self.loss.loss(target, &predicted)?;
        let error = self.loss.gradient(target, &predicted)?;
        self.backward(&error)?;
        Ok(loss)
    }

    /// Serializes the network, including gradients and Adam moments.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Rebuilds a network from [`Network::to_json`] output.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut network: Network = serde_json::from_str(json)?;
        network.rng = seeded_rng(network.seed);
        let mut input_size = network.entry_size;
        for index in 0..network.layers.len() {
            let feature_maps = inherited_feature_maps(&network.layers[..index]);
            let layer = &mut network.layers[index];
            layer.set_size_io(SizeContext::new(input_size).with_feature_maps(feature_maps))?;
            if !layer.is_initialized() {
                return Err(NetworkError::NotInitialized {
                    layer: layer.name(),
                    reason: "saved layer is missing its parameters",
                });
            }
            input_size = layer.output_size();
        }
        Ok(network)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

/// Feature-map count reaching the next layer: taken from the nearest spatial
/// layer, looking back through size-preserving layers such as activations.
fn inherited_feature_maps(layers: &[NetworkLayer]) -> Option<usize> {
    layers
        .iter()
        .rev()
        .find(|layer| layer.feature_maps().is_some() || layer.input_size() != layer.output_size())
        .and_then(Layer::feature_maps)
}
