//! Fully connected layers.
//!
//! A [`Layer`] computes `activation(inputs × W + b)` where `W` is
//! `input_size × neuron_count` and `b` a `1 × neuron_count` row added to every
//! input row.
//!
//! Training a layer is a small state machine, one round per batch:
//!
//! ```text
//! Idle --forward--> ForwardComputed --backward--> BackwardComputed --update--> Idle
//! ```
//!
//! `forward` caches the inputs and the pre-activation, which `backward` needs
//! for the chain rule. `backward` keeps the parameter gradients until
//! `update` applies them. Calling the steps out of order is a fatal
//! precondition.

use crate::error::{Error, Result};
use crate::{Activation, Matrix};
use core::fmt;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Where a layer stands in its training round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    /// No pass in flight.
    Idle,
    /// `forward` ran; inputs and pre-activation are cached.
    ForwardComputed,
    /// `backward` ran; gradients wait for `update`.
    BackwardComputed,
}

impl fmt::Display for LayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::ForwardComputed => "forward computed",
            Self::BackwardComputed => "backward computed",
        })
    }
}

#[derive(Debug, Clone, Default)]
enum Pass {
    #[default]
    Idle,
    Forward {
        inputs: Matrix,
        pre_activation: Matrix,
    },
    Backward {
        weight_gradient: Matrix,
        bias_gradient: Matrix,
    },
}

impl Pass {
    const fn state(&self) -> LayerState {
        match self {
            Self::Idle => LayerState::Idle,
            Self::Forward { .. } => LayerState::ForwardComputed,
            Self::Backward { .. } => LayerState::BackwardComputed,
        }
    }
}

/// A dense layer: weights, biases and an activation.
#[derive(Debug, Clone)]
pub struct Layer {
    weights: Matrix,
    biases: Matrix,
    activation: Activation,
    pass: Pass,
}

impl Layer {
    /// Creates a layer with standard-normal weights and zero biases, drawn
    /// from the thread-local RNG.
    #[must_use]
    pub fn new(input_size: usize, neuron_count: usize, activation: Activation) -> Self {
        Self::with_rng(&mut rand::rng(), input_size, neuron_count, activation)
    }

    /// Like [`Layer::new`], drawing the weights from `rng`.
    #[must_use]
    pub fn with_rng<R: Rng + ?Sized>(
        rng: &mut R,
        input_size: usize,
        neuron_count: usize,
        activation: Activation,
    ) -> Self {
        let mut weights = Matrix::new(input_size, neuron_count).with_id("layer::weights");
        for i in 0..weights.len() {
            weights[i] = StandardNormal.sample(rng);
        }
        Self {
            weights,
            biases: Matrix::new(1, neuron_count).with_id("layer::biases"),
            activation,
            pass: Pass::Idle,
        }
    }

    /// Creates a layer from explicit parameters.
    ///
    /// # Errors
    ///
    /// Fails unless `biases` is a `1 × weights.cols()` row.
    pub fn from_parameters(
        weights: Matrix,
        biases: Matrix,
        activation: Activation,
    ) -> Result<Self> {
        if biases.dimensions() != (1, weights.cols()) {
            return Err(Error::precondition(
                "layer::construct",
                format!(
                    "biases are {}x{} for {} neurons",
                    biases.rows(),
                    biases.cols(),
                    weights.cols()
                ),
            ));
        }
        Ok(Self {
            weights,
            biases,
            activation,
            pass: Pass::Idle,
        })
    }

    /// Width of the rows this layer accepts.
    #[must_use]
    pub const fn input_size(&self) -> usize {
        self.weights.rows()
    }

    /// Width of the rows this layer produces.
    #[must_use]
    pub const fn neuron_count(&self) -> usize {
        self.weights.cols()
    }

    /// The `input_size × neuron_count` weights.
    #[must_use]
    pub const fn weights(&self) -> &Matrix {
        &self.weights
    }

    /// The `1 × neuron_count` biases.
    #[must_use]
    pub const fn biases(&self) -> &Matrix {
        &self.biases
    }

    /// The activation.
    #[must_use]
    pub const fn activation(&self) -> Activation {
        self.activation
    }

    /// Current training state.
    #[must_use]
    pub const fn state(&self) -> LayerState {
        self.pass.state()
    }

    /// Gradients retained by the last `backward`, as `(weights, biases)`.
    #[must_use]
    pub const fn gradients(&self) -> Option<(&Matrix, &Matrix)> {
        match &self.pass {
            Pass::Backward {
                weight_gradient,
                bias_gradient,
            } => Some((weight_gradient, bias_gradient)),
            _ => None,
        }
    }

    /// Drops any cached pass and returns to [`LayerState::Idle`].
    pub fn reset(&mut self) {
        self.pass = Pass::Idle;
    }

    fn affine(&self, inputs: &Matrix) -> Result<Matrix> {
        if inputs.cols() != self.input_size() {
            return Err(Error::precondition(
                "layer::forward",
                format!(
                    "inputs have {} columns, layer expects {}",
                    inputs.cols(),
                    self.input_size()
                ),
            ));
        }
        inputs.try_mul(&self.weights)?.add_row_broadcast(&self.biases)
    }

    /// Computes the output for a batch of rows without touching the
    /// training state.
    ///
    /// # Errors
    ///
    /// Fails if `inputs.cols() != input_size`.
    pub fn infer(&self, inputs: &Matrix) -> Result<Matrix> {
        Ok(self.activation.apply(&self.affine(inputs)?))
    }

    /// Computes the output for a batch of rows and caches what `backward`
    /// needs.
    ///
    /// # Errors
    ///
    /// Fails if `inputs.cols() != input_size`, or if gradients from a previous
    /// `backward` have not been applied yet.
    pub fn forward(&mut self, inputs: &Matrix) -> Result<Matrix> {
        if let Pass::Backward { .. } = self.pass {
            return Err(Error::precondition(
                "layer::forward",
                "gradients pending, call update first",
            ));
        }
        let pre_activation = self.affine(inputs)?;
        let outputs = self.activation.apply(&pre_activation);
        self.pass = Pass::Forward {
            inputs: inputs.clone(),
            pre_activation,
        };
        Ok(outputs)
    }

    /// Back-propagates `error` (`∂L/∂outputs`, shaped like the last outputs).
    ///
    /// Retains the weight and bias gradients and returns `∂L/∂inputs`
    /// (`batch × input_size`) for the previous layer.
    ///
    /// # Errors
    ///
    /// Fails if no forward pass is cached or `error` has the wrong shape.
    pub fn backward(&mut self, error: &Matrix) -> Result<Matrix> {
        let Pass::Forward {
            inputs,
            pre_activation,
        } = &self.pass
        else {
            return Err(Error::precondition(
                "layer::backward",
                format!("expected a cached forward pass, layer is {}", self.state()),
            ));
        };
        if error.dimensions() != pre_activation.dimensions() {
            return Err(Error::precondition(
                "layer::backward",
                format!(
                    "error is {}x{} but outputs are {}x{}",
                    error.rows(),
                    error.cols(),
                    pre_activation.rows(),
                    pre_activation.cols()
                ),
            ));
        }

        let local = error.try_hadamard(&self.activation.derivative(pre_activation))?;
        let weight_gradient = inputs.transpose().try_mul(&local)?;
        let bias_gradient = local.column_sums();
        let propagated = local.try_mul(&self.weights.transpose())?;

        self.pass = Pass::Backward {
            weight_gradient,
            bias_gradient,
        };
        Ok(propagated)
    }

    /// Applies `weights -= lr × ∂W` and `biases -= lr × ∂b`, then returns to
    /// [`LayerState::Idle`].
    ///
    /// # Errors
    ///
    /// Fails if no gradients are pending.
    pub fn update(&mut self, learning_rate: f32) -> Result<()> {
        let (weight_gradient, bias_gradient) = match core::mem::take(&mut self.pass) {
            Pass::Backward {
                weight_gradient,
                bias_gradient,
            } => (weight_gradient, bias_gradient),
            other => {
                let state = other.state();
                self.pass = other;
                return Err(Error::precondition(
                    "layer::update",
                    format!("expected pending gradients, layer is {state}"),
                ));
            }
        };

        self.weights = self
            .weights
            .try_sub(&weight_gradient.scale(learning_rate))?
            .with_id("layer::weights");
        self.biases = self
            .biases
            .try_sub(&bias_gradient.scale(learning_rate))?
            .with_id("layer::biases");
        Ok(())
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dense {} -> {} ({})",
            self.input_size(),
            self.neuron_count(),
            self.activation
        )
    }
}
