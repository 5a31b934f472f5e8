//! Configuration for [`Network::fit`](crate::Network::fit).

use crate::error::{Error, Result};

/// Hyper-parameters of a training run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FitConfig {
    /// Passes over the dataset.
    pub epochs: usize,
    /// Entries per gradient step.
    pub batch_size: usize,
    /// Step size of the parameter updates.
    pub learning_rate: f32,
    /// Log the running loss every time this many entries went through, at
    /// `info` level. `None` disables the periodic report.
    pub log_every: Option<usize>,
}

impl FitConfig {
    /// Create a new configuration with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of epochs
    #[must_use]
    pub const fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the batch size
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the learning rate
    #[must_use]
    pub const fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the loss report interval
    #[must_use]
    pub const fn with_log_every(mut self, log_every: Option<usize>) -> Self {
        self.log_every = log_every;
        self
    }

    /// Checks the configuration against a dataset of `dataset_len` entries.
    ///
    /// # Errors
    ///
    /// Fails unless `epochs >= 1`, `1 <= batch_size <= dataset_len`, the
    /// learning rate is finite and positive, and `log_every` is not zero.
    pub fn validate(&self, dataset_len: usize) -> Result<()> {
        const OP: &str = "network::fit";
        if self.epochs == 0 {
            return Err(Error::precondition(OP, "epochs must be at least 1"));
        }
        if self.batch_size == 0 || self.batch_size > dataset_len {
            return Err(Error::precondition(
                OP,
                format!(
                    "invalid batch_size {} for {dataset_len} entries",
                    self.batch_size
                ),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::precondition(
                OP,
                format!("learning rate must be positive, got {}", self.learning_rate),
            ));
        }
        if self.log_every == Some(0) {
            return Err(Error::precondition(OP, "log_every must be positive"));
        }
        Ok(())
    }
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 1,
            batch_size: 1,
            learning_rate: 0.01,
            log_every: Some(100),
        }
    }
}
