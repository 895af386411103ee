//! Long short-term memory layer
//!
//! Each gate is a [`DenseLayer`] over the concatenation `z_t = [x_t ; h_{t-1}]`
//! shared across all time steps, so the gates always accumulate gradients
//! while a sequence is unrolled. The layer reads a whole fixed-length
//! sequence and emits the projection of the last hidden state.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, NetworkError, Result};
use crate::layers::{DenseLayer, Layer, ParameterizedLayer, SizeContext};
use crate::optimizers::Optimizer;
use crate::utils::matrix::{add_in_place, hadamard};
use crate::utils::{ActivationType, Matrix};

/// Names the dense sublayers of an [`LstmLayer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LstmGate {
    Forget,
    Input,
    Candidate,
    Output,
    /// Maps the last hidden state to the layer output.
    Projection,
}

impl LstmGate {
    /// The four recurrent gates in the order they are evaluated.
    pub const RECURRENT: [LstmGate; 4] = [
        LstmGate::Forget,
        LstmGate::Input,
        LstmGate::Candidate,
        LstmGate::Output,
    ];
}

/// Activations of the recurrent gates, in `LstmGate::RECURRENT` order.
const GATE_ACTIVATIONS: [ActivationType; 4] = [
    ActivationType::Sigmoid,
    ActivationType::Sigmoid,
    ActivationType::Tanh,
    ActivationType::Sigmoid,
];

/// Squashes the cell state before the output gate.
const CELL_ACTIVATION: ActivationType = ActivationType::Tanh;

/// Everything one time step's backward pass replays.
#[derive(Debug, Clone, Default, PartialEq)]
struct LstmStep {
    z: Vec<f64>,
    /// Gate pre-activations, `LstmGate::RECURRENT` order.
    pre: [Vec<f64>; 4],
    /// Gate activations, same order.
    act: [Vec<f64>; 4],
    previous_cell: Vec<f64>,
    cell: Vec<f64>,
    hidden: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmLayer {
    vocab_size: usize,
    hidden_units: usize,
    sequence_length: usize,
    forget: DenseLayer,
    input: DenseLayer,
    candidate: DenseLayer,
    output: DenseLayer,
    projection: DenseLayer,
    accumulate_gradients: bool,
    #[serde(skip)]
    steps: Vec<LstmStep>,
}

impl LstmLayer {
    pub fn new(vocab_size: usize, hidden_units: usize, sequence_length: usize) -> Self {
        let gate = || DenseLayer::with_output_size(hidden_units);
        Self {
            vocab_size,
            hidden_units,
            sequence_length,
            forget: gate(),
            input: gate(),
            candidate: gate(),
            output: gate(),
            projection: DenseLayer::with_output_size(vocab_size),
            accumulate_gradients: false,
            steps: Vec::new(),
        }
    }

    /// Builds a layer from explicit gates, given as forget, input, candidate,
    /// output and projection.
    pub fn from_gates(sequence_length: usize, gates: [DenseLayer; 5]) -> Result<Self> {
        let [forget, input, candidate, output, projection] = gates;
        let hidden_units = projection.input_size();
        let vocab_size = projection.output_size();
        for gate in [&forget, &input, &candidate, &output] {
            ensure_len("lstm", vocab_size + hidden_units, gate.input_size())?;
            ensure_len("lstm", hidden_units, gate.output_size())?;
        }
        let mut layer = Self {
            vocab_size,
            hidden_units,
            sequence_length,
            forget,
            input,
            candidate,
            output,
            projection,
            accumulate_gradients: false,
            steps: Vec::new(),
        };
        layer.share_gate_gradients();
        Ok(layer)
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn hidden_units(&self) -> usize {
        self.hidden_units
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn gate(&self, gate: LstmGate) -> &DenseLayer {
        match gate {
            LstmGate::Forget => &self.forget,
            LstmGate::Input => &self.input,
            LstmGate::Candidate => &self.candidate,
            LstmGate::Output => &self.output,
            LstmGate::Projection => &self.projection,
        }
    }

    pub fn gate_weights_mut(&mut self, gate: LstmGate) -> &mut Matrix {
        match gate {
            LstmGate::Forget => self.forget.weights_mut(),
            LstmGate::Input => self.input.weights_mut(),
            LstmGate::Candidate => self.candidate.weights_mut(),
            LstmGate::Output => self.output.weights_mut(),
            LstmGate::Projection => self.projection.weights_mut(),
        }
    }

    pub fn gate_biases_mut(&mut self, gate: LstmGate) -> &mut [f64] {
        match gate {
            LstmGate::Forget => self.forget.biases_mut(),
            LstmGate::Input => self.input.biases_mut(),
            LstmGate::Candidate => self.candidate.biases_mut(),
            LstmGate::Output => self.output.biases_mut(),
            LstmGate::Projection => self.projection.biases_mut(),
        }
    }

    /// Cell states from the last forward pass.
    pub fn cell_states(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.steps.iter().map(|step| step.cell.as_slice())
    }

    /// Hidden states from the last forward pass.
    pub fn hidden_states(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.steps.iter().map(|step| step.hidden.as_slice())
    }

    fn all_gates_mut(&mut self) -> [&mut DenseLayer; 5] {
        [
            &mut self.forget,
            &mut self.input,
            &mut self.candidate,
            &mut self.output,
            &mut self.projection,
        ]
    }

    fn all_gates(&self) -> [&DenseLayer; 5] {
        [
            &self.forget,
            &self.input,
            &self.candidate,
            &self.output,
            &self.projection,
        ]
    }

    fn share_gate_gradients(&mut self) {
        for gate in self.all_gates_mut() {
            gate.set_gradient_accumulation(true);
        }
    }

    fn check_sequence(&self, len: usize) -> Result<()> {
        if len != self.vocab_size * self.sequence_length {
            return Err(NetworkError::UnsupportedSequence {
                layer: "lstm",
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
                layer: "lstm",
                reason: "gates have not been initialized",
            });
        }
        Ok(())
    }
}

impl Layer for LstmLayer {
    fn name(&self) -> &'static str {
        "lstm"
    }

    fn forward(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.ensure_ready()?;
        self.check_sequence(input.len())?;

        let mut steps = Vec::with_capacity(self.sequence_length);
        let mut hidden = vec![0.0; self.hidden_units];
        let mut cell = vec![0.0; self.hidden_units];

        for x in input.chunks(self.vocab_size) {
            let mut z = x.to_vec();
            z.extend_from_slice(&hidden);

            let mut step = LstmStep {
                previous_cell: cell,
                ..LstmStep::default()
            };
            let gates = [
                &mut self.forget,
                &mut self.input,
                &mut self.candidate,
                &mut self.output,
            ];
            for (k, gate) in gates.into_iter().enumerate() {
                let pre = gate.forward(&z)?;
                step.act[k] = GATE_ACTIVATIONS[k].apply_all(&pre);
                step.pre[k] = pre;
            }

            let [forget, input_gate, candidate, output] = &step.act;
            cell = hadamard(forget, &step.previous_cell);
            add_in_place(&mut cell, &hadamard(input_gate, candidate));
            hidden = hadamard(output, &CELL_ACTIVATION.apply_all(&cell));

            step.z = z;
            step.cell = cell.clone();
            step.hidden = hidden.clone();
            steps.push(step);
        }

        self.steps = steps;
        self.projection.forward(&hidden)
    }

    fn backward(&mut self, output_error: &[f64]) -> Result<Vec<f64>> {
        self.ensure_ready()?;
        ensure_len("lstm", self.vocab_size, output_error.len())?;
        if self.steps.len() != self.sequence_length {
            return Err(NetworkError::NotInitialized {
                layer: "lstm",
                reason: "backward called before forward",
            });
        }
        if !self.accumulate_gradients {
            self.drain_gradients();
        }

        let vocab = self.vocab_size;
        let last_hidden = &self.steps[self.sequence_length - 1].hidden;
        let mut dh = self.projection.backward_with_input(last_hidden, output_error)?;
        let mut next_cell_gradient = vec![0.0; self.hidden_units];
        let mut input_error = vec![0.0; vocab * self.sequence_length];

        for t in (0..self.sequence_length).rev() {
            let step = &self.steps[t];
            let [forget, input_gate, candidate, output] = &step.act;
            let tanh_cell = CELL_ACTIVATION.apply_all(&step.cell);

            let cell_gradient: Vec<f64> = (0..self.hidden_units)
                .map(|j| {
                    dh[j] * output[j] * (1.0 - tanh_cell[j] * tanh_cell[j]) + next_cell_gradient[j]
                })
                .collect();
            let gate_gradients = [
                hadamard(&cell_gradient, &step.previous_cell),
                hadamard(&cell_gradient, candidate),
                hadamard(&cell_gradient, input_gate),
                hadamard(&dh, &tanh_cell),
            ];

            let mut dz = vec![0.0; step.z.len()];
            let gates = [
                &mut self.forget,
                &mut self.input,
                &mut self.candidate,
                &mut self.output,
            ];
            for (k, gate) in gates.into_iter().enumerate() {
                let delta = GATE_ACTIVATIONS[k].backprop(&step.pre[k], &gate_gradients[k]);
                add_in_place(&mut dz, &gate.backward_with_input(&step.z, &delta)?);
            }

            input_error[t * vocab..(t + 1) * vocab].copy_from_slice(&dz[..vocab]);
            dh = dz[vocab..].to_vec();
            next_cell_gradient = hadamard(&cell_gradient, forget);
        }

        Ok(input_error)
    }

    fn input_size(&self) -> usize {
        self.vocab_size * self.sequence_length
    }

    fn output_size(&self) -> usize {
        self.vocab_size
    }

    fn set_size_io(&mut self, context: SizeContext) -> Result<()> {
        if self.vocab_size == 0 || self.hidden_units == 0 || self.sequence_length == 0 {
            return Err(NetworkError::config(
                "lstm layer needs positive vocab size, hidden units and sequence length",
            ));
        }
        self.check_sequence(context.input_size)
    }

    fn initialize_parameters(&mut self, rng: &mut StdRng) {
        let concat = self.vocab_size + self.hidden_units;
        for gate in [
            &mut self.forget,
            &mut self.input,
            &mut self.candidate,
            &mut self.output,
        ] {
            *gate = DenseLayer::new(concat, self.hidden_units, rng);
        }
        self.projection = DenseLayer::new(self.hidden_units, self.vocab_size, rng);
        self.share_gate_gradients();
    }

    fn is_initialized(&self) -> bool {
        self.vocab_size > 0
            && self.hidden_units > 0
            && self.all_gates().iter().all(|gate| gate.is_initialized())
    }

    fn as_parameterized(&self) -> Option<&dyn ParameterizedLayer> {
        Some(self)
    }

    fn as_parameterized_mut(&mut self) -> Option<&mut dyn ParameterizedLayer> {
        Some(self)
    }
}

impl ParameterizedLayer for LstmLayer {
    fn update_parameters(&mut self, optimizer: &Optimizer, sample_index: usize) {
        for gate in self.all_gates_mut() {
            gate.update_parameters(optimizer, sample_index);
        }
    }

    fn drain_gradients(&mut self) {
        for gate in self.all_gates_mut() {
            gate.drain_gradients();
        }
    }

    fn set_gradient_accumulation(&mut self, accumulate: bool) {
        self.accumulate_gradients = accumulate;
    }

    fn accumulates_gradients(&self) -> bool {
        self.accumulate_gradients
    }

    fn parameter_count(&self) -> usize {
        self.all_gates()
            .iter()
            .map(|gate| gate.parameter_count())
            .sum()
    }
}
