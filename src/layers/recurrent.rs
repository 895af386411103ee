//! Recurrent (Elman) layer unrolled over a fixed number of time steps.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};
use crate::layers::{Layer, Parameter, ParameterizedLayer, SizeContext};
use crate::optimizers::Optimizer;
use crate::utils::matrix::add_in_place;
use crate::utils::ActivationType;

/// Values from the last forward pass, one entry per time step.
#[derive(Debug, Clone, Default, PartialEq)]
struct StepCache {
    inputs: Vec<Vec<f64>>,
    state_inputs: Vec<Vec<f64>>,
    states: Vec<Vec<f64>>,
}

/// Simple recurrent layer with weights shared across time.
///
/// The input is `sequence_length` one-hot (or embedded) vectors of width
/// `vocab_size`, laid end to end; the output has the same layout. For each
/// step `t`:
///
/// ```text
/// a_t = U·x_t + W·h_{t-1} + b        (h_{-1} = 0)
/// h_t = act(a_t)
/// y_t = V·h_t + c
/// ```
///
/// Backward runs backpropagation through time over the cached steps and sums
/// every step's contribution into the single `U`, `W`, `V`, `b`, `c`
/// gradients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentLayer {
    vocab_size: usize,
    hidden_size: usize,
    sequence_length: usize,
    activation: ActivationType,
    /// hidden × vocab
    u: Parameter,
    /// hidden × hidden
    w: Parameter,
    /// vocab × hidden
    v: Parameter,
    b: Parameter,
    c: Parameter,
    accumulate_gradients: bool,
    #[serde(skip)]
    cache: StepCache,
}

impl RecurrentLayer {
    /// An uninitialized layer with a tanh cell.
    pub fn new(vocab_size: usize, hidden_size: usize, sequence_length: usize) -> Self {
        Self {
            vocab_size,
            hidden_size,
            sequence_length,
            activation: ActivationType::Tanh,
            u: Parameter::zeros(0, 0),
            w: Parameter::zeros(0, 0),
            v: Parameter::zeros(0, 0),
            b: Parameter::zeros(0, 0),
            c: Parameter::zeros(0, 0),
            accumulate_gradients: false,
            cache: StepCache::default(),
        }
    }

    pub fn with_activation(mut self, activation: ActivationType) -> Self {
        self.activation = activation;
        self
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn activation(&self) -> ActivationType {
        self.activation
    }

    /// Weight parameters in `U, W, V, b, c` order.
    pub fn parameters(&self) -> [&Parameter; 5] {
        [&self.u, &self.w, &self.v, &self.b, &self.c]
    }

    pub fn parameters_mut(&mut self) -> [&mut Parameter; 5] {
        [
            &mut self.u,
            &mut self.w,
            &mut self.v,
            &mut self.b,
            &mut self.c,
        ]
    }

    fn check_sequence(&self, len: usize) -> Result<()> {
        if len != self.vocab_size * self.sequence_length {
            return Err(NetworkError::UnsupportedSequence {
                layer: "recurrent",
                sequence_length: self.sequence_length,
                vocab_size: self.vocab_size,
                actual: len,
            });
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(NetworkError::NotInitialized {
                layer: "recurrent",
                reason: "parameters have not been initialized",
            });
        }
        Ok(())
    }
}

impl Layer for RecurrentLayer {
    fn name(&self) -> &'static str {
        "recurrent"
    }

    fn forward(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.ensure_ready()?;
        self.check_sequence(input.len())?;

        let mut cache = StepCache::default();
        let mut output = Vec::with_capacity(input.len());
        let mut previous = vec![0.0; self.hidden_size];

        for x in input.chunks(self.vocab_size) {
            let mut state_input = self.u.values().mul_vec(x);
            add_in_place(&mut state_input, &self.w.values().mul_vec(&previous));
            add_in_place(&mut state_input, self.b.values().as_slice());
            let state = self.activation.apply_all(&state_input);

            let mut y = self.v.values().mul_vec(&state);
            add_in_place(&mut y, self.c.values().as_slice());
            output.extend(y);

            cache.inputs.push(x.to_vec());
            cache.state_inputs.push(state_input);
            cache.states.push(state.clone());
            previous = state;
        }

        self.cache = cache;
        Ok(output)
    }

    fn backward(&mut self, output_error: &[f64]) -> Result<Vec<f64>> {
        self.ensure_ready()?;
        self.check_sequence(output_error.len())?;
        if self.cache.states.len() != self.sequence_length {
            return Err(NetworkError::NotInitialized {
                layer: "recurrent",
                reason: "backward called before forward",
            });
        }
        if !self.accumulate_gradients {
            self.drain_gradients();
        }

        let zeros = vec![0.0; self.hidden_size];
        let mut input_error = vec![0.0; output_error.len()];
        let mut next_state_gradient = vec![0.0; self.hidden_size];

        for t in (0..self.sequence_length).rev() {
            let error = &output_error[t * self.vocab_size..(t + 1) * self.vocab_size];
            let state = &self.cache.states[t];
            let previous = if t == 0 { &zeros } else { &self.cache.states[t - 1] };

            self.v.gradient_mut().add_outer(error, state);
            self.c.accumulate(error);

            let mut dh = self.v.values().vec_mul(error);
            add_in_place(&mut dh, &next_state_gradient);
            let dhrec = self.activation.backprop(&self.cache.state_inputs[t], &dh);

            self.u.gradient_mut().add_outer(&dhrec, &self.cache.inputs[t]);
            self.w.gradient_mut().add_outer(&dhrec, previous);
            self.b.accumulate(&dhrec);

            input_error[t * self.vocab_size..(t + 1) * self.vocab_size]
                .copy_from_slice(&self.u.values().vec_mul(&dhrec));
            next_state_gradient = self.w.values().vec_mul(&dhrec);
        }

        Ok(input_error)
    }

    fn input_size(&self) -> usize {
        self.vocab_size * self.sequence_length
    }

    fn output_size(&self) -> usize {
        self.vocab_size * self.sequence_length
    }

    fn set_size_io(&mut self, context: SizeContext) -> Result<()> {
        if self.vocab_size == 0 || self.hidden_size == 0 || self.sequence_length == 0 {
            return Err(NetworkError::config(
                "recurrent layer needs positive vocab size, hidden size and sequence length",
            ));
        }
        self.check_sequence(context.input_size)
    }

    fn initialize_parameters(&mut self, rng: &mut StdRng) {
        let (vocab, hidden) = (self.vocab_size, self.hidden_size);
        let input_limit = (1.0 / vocab as f64).sqrt();
        let hidden_limit = (1.0 / hidden as f64).sqrt();

        self.u = Parameter::uniform(hidden, vocab, input_limit, rng);
        self.w = Parameter::uniform(hidden, hidden, hidden_limit, rng);
        self.v = Parameter::uniform(vocab, hidden, hidden_limit, rng);
        self.b = Parameter::zeros(1, hidden);
        self.c = Parameter::zeros(1, vocab);
    }

    fn is_initialized(&self) -> bool {
        self.u.len() == self.hidden_size * self.vocab_size
            && self.w.len() == self.hidden_size * self.hidden_size
            && self.v.len() == self.vocab_size * self.hidden_size
            && self.b.len() == self.hidden_size
            && self.c.len() == self.vocab_size
            && self.hidden_size > 0
            && self.vocab_size > 0
    }

    fn as_parameterized(&self) -> Option<&dyn ParameterizedLayer> {
        Some(self)
    }

    fn as_parameterized_mut(&mut self) -> Option<&mut dyn ParameterizedLayer> {
        Some(self)
    }
}

impl ParameterizedLayer for RecurrentLayer {
    fn update_parameters(&mut self, optimizer: &Optimizer, sample_index: usize) {
        for parameter in self.parameters_mut() {
            parameter.update(optimizer, sample_index);
        }
        self.drain_gradients();
    }

    fn drain_gradients(&mut self) {
        for parameter in self.parameters_mut() {
            parameter.drain();
        }
    }

    fn set_gradient_accumulation(&mut self, accumulate: bool) {
        self.accumulate_gradients = accumulate;
    }

    fn accumulates_gradients(&self) -> bool {
        self.accumulate_gradients
    }

    fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }
}
