//! Loss functions.
//!
//! The training loop only needs one thing from a loss: the gradient of the
//! loss with respect to the predictions, shaped like the predictions. That is
//! the [`Loss`] trait. [`LossFunction`] implements it for the usual
//! regression and classification losses.
//!
//! All losses here are means over every element of the batch, so their
//! gradients already carry the `1 / N` factor and a batch update applies the
//! average gradient.

use crate::Matrix;
use crate::error::{Error, Result};
use core::{fmt, str::FromStr};

/// Probabilities are clamped to `[EPSILON, 1 - EPSILON]` before taking logs.
const EPSILON: f32 = 1e-7;

/// Maps `(predictions, labels)` to a loss gradient and a loss value.
pub trait Loss {
    /// `∂L/∂predictions`, with the dimensions of `predictions`.
    ///
    /// # Errors
    ///
    /// Fails if `predictions` and `labels` differ in shape.
    fn gradient(&self, predictions: &Matrix, labels: &Matrix) -> Result<Matrix>;

    /// The scalar loss, for reporting.
    ///
    /// # Errors
    ///
    /// Fails if `predictions` and `labels` differ in shape.
    fn value(&self, predictions: &Matrix, labels: &Matrix) -> Result<f32>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "custom"
    }
}

/// The built-in losses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LossFunction {
    /// `mean((p - y)²)`
    #[default]
    MeanSquaredError,
    /// `mean(|p - y|)`
    MeanAbsoluteError,
    /// `mean(p - y)`
    MeanBiasError,
    /// `mean(max(0, 1 - y·p))` with labels in `{-1, 1}` (SVM loss).
    Hinge,
    /// Binary cross-entropy `-mean(y·ln p + (1 - y)·ln(1 - p))`.
    CrossEntropy,
}

impl LossFunction {
    /// All variants, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::MeanSquaredError,
        Self::MeanAbsoluteError,
        Self::MeanBiasError,
        Self::Hinge,
        Self::CrossEntropy,
    ];

    /// Configuration name of the variant.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MeanSquaredError => "mse",
            Self::MeanAbsoluteError => "mae",
            Self::MeanBiasError => "mbe",
            Self::Hinge => "hinge",
            Self::CrossEntropy => "cross_entropy",
        }
    }

    fn element_value(self, p: f32, y: f32) -> f32 {
        match self {
            Self::MeanSquaredError => (p - y).powi(2),
            Self::MeanAbsoluteError => (p - y).abs(),
            Self::MeanBiasError => p - y,
            Self::Hinge => (1.0 - y * p).max(0.0),
            Self::CrossEntropy => {
                let p = p.clamp(EPSILON, 1.0 - EPSILON);
                -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
            }
        }
    }

    fn element_gradient(self, p: f32, y: f32) -> f32 {
        match self {
            Self::MeanSquaredError => 2.0 * (p - y),
            Self::MeanAbsoluteError => {
                if p > y {
                    1.0
                } else if p < y {
                    -1.0
                } else {
                    0.0
                }
            }
            Self::MeanBiasError => 1.0,
            Self::Hinge => {
                if y * p < 1.0 {
                    -y
                } else {
                    0.0
                }
            }
            Self::CrossEntropy => {
                let p = p.clamp(EPSILON, 1.0 - EPSILON);
                (p - y) / (p * (1.0 - p))
            }
        }
    }
}

fn check_shapes(operation: &'static str, predictions: &Matrix, labels: &Matrix) -> Result<()> {
    if predictions.dimensions() == labels.dimensions() {
        return Ok(());
    }
    let (pr, pc) = predictions.dimensions();
    let (lr, lc) = labels.dimensions();
    Err(Error::precondition(
        operation,
        format!("predictions are {pr}x{pc} but labels are {lr}x{lc}"),
    ))
}

fn element_count(m: &Matrix) -> f32 {
    m.len().max(1) as f32
}

impl Loss for LossFunction {
    fn gradient(&self, predictions: &Matrix, labels: &Matrix) -> Result<Matrix> {
        check_shapes("loss::gradient", predictions, labels)?;
        let n = element_count(predictions);
        let data: Vec<f32> = predictions
            .as_slice()
            .iter()
            .zip(labels.as_slice())
            .map(|(&p, &y)| self.element_gradient(p, y) / n)
            .collect();
        Matrix::from_values(data, predictions.rows(), predictions.cols())
    }

    fn value(&self, predictions: &Matrix, labels: &Matrix) -> Result<f32> {
        check_shapes("loss::value", predictions, labels)?;
        let total: f32 = predictions
            .as_slice()
            .iter()
            .zip(labels.as_slice())
            .map(|(&p, &y)| self.element_value(p, y))
            .sum();
        Ok(total / element_count(predictions))
    }

    fn name(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for LossFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LossFunction {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mse" | "mean_squared_error" => Ok(Self::MeanSquaredError),
            "mae" | "mean_absolute_error" => Ok(Self::MeanAbsoluteError),
            "mbe" | "mean_bias_error" => Ok(Self::MeanBiasError),
            "hinge" | "svm" => Ok(Self::Hinge),
            "cross_entropy" | "bce" => Ok(Self::CrossEntropy),
            other => Err(format!("unknown loss `{other}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix;

    #[test]
    fn mse_value_and_gradient() {
        let p = matrix![[1.0, 2.0], [3.0, 4.0]];
        let y = matrix![[1.0, 1.0], [1.0, 1.0]];
        let loss = LossFunction::MeanSquaredError;
        // (0 + 1 + 4 + 9) / 4
        assert_eq!(loss.value(&p, &y).unwrap(), 3.5);
        assert_eq!(loss.gradient(&p, &y).unwrap(), matrix![[0.0, 0.5], [1.0, 1.5]]);
    }

    #[test]
    fn hinge_ignores_confident_predictions() {
        let p = matrix![[2.0, 0.5]];
        let y = matrix![[1.0, 1.0]];
        let g = LossFunction::Hinge.gradient(&p, &y).unwrap();
        assert_eq!(g, matrix![[0.0, -0.5]]);
        assert_eq!(LossFunction::Hinge.value(&p, &y).unwrap(), 0.25);
    }

    #[test]
    fn cross_entropy_is_finite_at_the_edges() {
        let p = matrix![[0.0, 1.0]];
        let y = matrix![[1.0, 0.0]];
        let loss = LossFunction::CrossEntropy;
        assert!(loss.value(&p, &y).unwrap().is_finite());
        assert!(loss.gradient(&p, &y).unwrap().as_slice().iter().all(|g| g.is_finite()));
    }

    #[test]
    fn gradient_keeps_prediction_shape() {
        let p = Matrix::filled(4, 3, 0.3);
        let y = Matrix::filled(4, 3, 1.0);
        for loss in LossFunction::ALL {
            let g = loss.gradient(&p, &y).unwrap();
            assert_eq!(g.dimensions(), p.dimensions(), "{loss}");
        }
    }

    #[test]
    fn shape_mismatch_is_fatal() {
        let err = LossFunction::MeanAbsoluteError
            .gradient(&Matrix::new(2, 1), &Matrix::new(1, 2))
            .unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("svm".parse::<LossFunction>(), Ok(LossFunction::Hinge));
        for loss in LossFunction::ALL {
            assert_eq!(loss.as_str().parse::<LossFunction>(), Ok(loss));
        }
    }
}
