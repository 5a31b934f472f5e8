//! Feed-forward networks and the training loop.
//!
//! [`Network::fit`] runs mini-batch gradient descent:
//!
//! 1. every epoch draws `len / batch_size` random batches (a trailing
//!    partial batch is dropped, so size datasets accordingly);
//! 2. each batch is stacked into one `batch_size × features` matrix and
//!    pushed through every layer's `forward`;
//! 3. the loss gradient flows back through every layer's `backward`, last
//!    layer first;
//! 4. only then does every layer `update`.
//!
//! Updates are batch-accumulated: one step per batch, with the mean gradient
//! of its entries (the built-in losses average over the batch).

use crate::config::FitConfig;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::loss::Loss;
use crate::{Layer, Matrix};
use core::fmt;
use rand::Rng;

/// Per-epoch outcome of [`Network::fit`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FitReport {
    /// Mean batch loss of every epoch, in order.
    pub epoch_losses: Vec<f32>,
}

impl FitReport {
    /// Loss of the last epoch.
    #[must_use]
    pub fn final_loss(&self) -> Option<f32> {
        self.epoch_losses.last().copied()
    }

    /// Lowest epoch loss.
    #[must_use]
    pub fn best_loss(&self) -> Option<f32> {
        self.epoch_losses.iter().copied().reduce(f32::min)
    }
}

/// An ordered stack of shape-compatible layers.
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
}

impl Network {
    /// Builds a network from its layers, first layer first.
    ///
    /// # Errors
    ///
    /// Fails if `layers` is empty or two consecutive layers disagree on the
    /// width of the rows passed between them.
    pub fn new(layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::precondition("network::construct", "no layers"));
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].neuron_count() != pair[1].input_size() {
                return Err(Error::precondition(
                    "network::construct",
                    format!(
                        "layer {i} has {} neurons but layer {} expects {} inputs",
                        pair[0].neuron_count(),
                        i + 1,
                        pair[1].input_size()
                    ),
                ));
            }
        }
        Ok(Self { layers })
    }

    /// The layers, first layer first.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Width of the rows the network accepts.
    #[must_use]
    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, Layer::input_size)
    }

    /// Width of the rows the network produces.
    #[must_use]
    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, Layer::neuron_count)
    }

    /// Runs `features` (one sample per row) through every layer.
    ///
    /// # Errors
    ///
    /// Fails if `features` does not have `input_size` columns.
    pub fn predict(&self, features: &Matrix) -> Result<Matrix> {
        let mut outputs = features.clone();
        for layer in &self.layers {
            outputs = layer.infer(&outputs)?;
        }
        Ok(outputs)
    }

    /// Lazily predicts every entry of `data`, in order. Call again to restart.
    pub fn predict_dataset<'a>(
        &'a self,
        data: &'a Dataset,
    ) -> impl ExactSizeIterator<Item = Result<Matrix>> + 'a {
        data.iter().map(move |entry| self.predict(&entry.features))
    }

    /// Trains the network on `data`, using the thread-local RNG for batch
    /// sampling.
    ///
    /// # Errors
    ///
    /// See [`Network::fit_with_rng`].
    pub fn fit(
        &mut self,
        data: &Dataset,
        loss: &dyn Loss,
        config: &FitConfig,
    ) -> Result<FitReport> {
        self.fit_with_rng(&mut rand::rng(), data, loss, config)
    }

    /// Trains the network on `data`, sampling batches from `rng`.
    ///
    /// # Errors
    ///
    /// Fails if `config` is invalid for `data` (see [`FitConfig::validate`]),
    /// if the entries do not fit the network's input and output widths, or
    /// if a kernel fails. The layers are left idle either way.
    pub fn fit_with_rng<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        data: &Dataset,
        loss: &dyn Loss,
        config: &FitConfig,
    ) -> Result<FitReport> {
        config.validate(data.len())?;
        self.check_widths(data)?;
        self.reset();

        let nb_batches = data.len() / config.batch_size;
        log::info!(
            target: "gridnet::network",
            "fit: {} epochs x {nb_batches} batches of {} ({} loss, lr={})",
            config.epochs,
            config.batch_size,
            loss.name(),
            config.learning_rate
        );

        let mut report = FitReport::default();
        for epoch in 1..=config.epochs {
            let mut epoch_loss = 0.0;
            let mut seen = 0usize;
            for b in 0..nb_batches {
                let batch = data.get_random_batch_with(rng, config.batch_size)?;
                let value = self
                    .train_batch(&batch, loss, config.learning_rate)
                    .inspect_err(|_| self.reset())?;
                epoch_loss += value;
                log::debug!(target: "gridnet::network", "epoch {epoch} batch {b}: loss={value}");

                let before = seen;
                seen += config.batch_size;
                if let Some(every) = config.log_every
                    && seen / every > before / every
                {
                    let running = epoch_loss / (b + 1) as f32;
                    log::info!(
                        target: "gridnet::network",
                        "epoch {epoch}: {seen} entries, running loss={running:.6}"
                    );
                }
            }

            let mean = epoch_loss / nb_batches as f32;
            log::info!(
                target: "gridnet::network",
                "epoch {epoch}/{}: loss={mean:.6}",
                config.epochs
            );
            report.epoch_losses.push(mean);
        }
        Ok(report)
    }

    /// One forward, backward and update round over a stacked batch.
    fn train_batch(&mut self, batch: &Dataset, loss: &dyn Loss, learning_rate: f32) -> Result<f32> {
        let labels = batch.labels()?;
        let mut outputs = batch.features()?;
        for layer in &mut self.layers {
            outputs = layer.forward(&outputs)?;
        }

        let value = loss.value(&outputs, &labels)?;
        let mut error = loss.gradient(&outputs, &labels)?;
        if error.dimensions() != outputs.dimensions() {
            return Err(Error::precondition(
                "network::fit",
                format!(
                    "{} loss gradient is {}x{} for {}x{} predictions",
                    loss.name(),
                    error.rows(),
                    error.cols(),
                    outputs.rows(),
                    outputs.cols()
                ),
            ));
        }

        for layer in self.layers.iter_mut().rev() {
            error = layer.backward(&error)?;
        }
        for layer in &mut self.layers {
            layer.update(learning_rate)?;
        }
        Ok(value)
    }

    fn check_widths(&self, data: &Dataset) -> Result<()> {
        let widths = (data.feature_count(), data.label_count());
        if widths != (Some(self.input_size()), Some(self.output_size())) {
            return Err(Error::precondition(
                "network::fit",
                format!(
                    "dataset has {:?} features and {:?} labels, network maps {} to {}",
                    widths.0,
                    widths.1,
                    self.input_size(),
                    self.output_size()
                ),
            ));
        }
        Ok(())
    }

    fn reset(&mut self) {
        for layer in &mut self.layers {
            layer.reset();
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, layer) in self.layers.iter().enumerate() {
            writeln!(f, "[{i}] {layer}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Activation, LossFunction, matrix};

    #[test]
    fn rejects_incompatible_layers() {
        let err = Network::new(vec![
            Layer::new(3, 4, Activation::Relu),
            Layer::new(5, 1, Activation::Identity),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("layer 0 has 4 neurons"));
        assert!(Network::new(vec![]).is_err());
    }

    #[test]
    fn fit_rejects_mismatched_dataset() {
        let mut net = Network::new(vec![Layer::new(2, 1, Activation::Identity)]).unwrap();
        let entry = crate::Entry::from_slices(&[1.0, 2.0, 3.0], &[1.0]).unwrap();
        let data = Dataset::from_entries([entry])
            .unwrap();
        let err = net
            .fit(&data, &LossFunction::MeanSquaredError, &FitConfig::new())
            .unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn display_lists_layers() {
        let net = Network::new(vec![
            Layer::new(2, 3, Activation::Sigmoid),
            Layer::new(3, 1, Activation::Identity),
        ])
        .unwrap();
        assert_eq!(net.to_string(), "[0] dense 2 -> 3 (sigmoid)\n[1] dense 3 -> 1 (identity)\n");
        assert_eq!(net.predict(&matrix![[0.5, -0.5]]).unwrap().dimensions(), (1, 1));
    }
}
