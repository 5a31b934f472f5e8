//! Element-wise activation functions.
//!
//! The set is closed: layers pick a variant by configuration (a name parsed
//! with [`FromStr`]) rather than by implementing a trait.

use crate::Matrix;
use core::{fmt, str::FromStr};

/// An activation applied element-wise after a layer's affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Activation {
    /// `f(x) = x`
    #[default]
    Identity,
    /// `f(x) = 1 / (1 + e^-x)`
    Sigmoid,
    /// `f(x) = max(0, x)`
    Relu,
    /// `f(x) = tanh(x)`
    Tanh,
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl Activation {
    /// All variants, in declaration order.
    pub const ALL: [Self; 4] = [Self::Identity, Self::Sigmoid, Self::Relu, Self::Tanh];

    /// Evaluates the function on a single value.
    #[must_use]
    pub fn apply_scalar(self, x: f32) -> f32 {
        match self {
            Self::Identity => x,
            Self::Sigmoid => sigmoid(x),
            Self::Relu => x.max(0.0),
            Self::Tanh => x.tanh(),
        }
    }

    /// Evaluates `f'(x)` on a single pre-activation value.
    #[must_use]
    pub fn derivative_scalar(self, x: f32) -> f32 {
        match self {
            Self::Identity => 1.0,
            Self::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            // subgradient 0 at the kink
            Self::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Tanh => 1.0 - x.tanh().powi(2),
        }
    }

    /// Applies the function to every element of `inputs`.
    #[must_use]
    pub fn apply(self, inputs: &Matrix) -> Matrix {
        match self {
            Self::Identity => inputs.clone(),
            _ => inputs.map(|x| self.apply_scalar(x)),
        }
    }

    /// The element-wise derivative, evaluated at the pre-activation `inputs`.
    #[must_use]
    pub fn derivative(self, inputs: &Matrix) -> Matrix {
        inputs.map(|x| self.derivative_scalar(x))
    }

    /// Configuration name of the variant.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Sigmoid => "sigmoid",
            Self::Relu => "relu",
            Self::Tanh => "tanh",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| format!("unknown activation `{s}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approx::approx_eq;
    use crate::matrix;

    #[test]
    fn parses_every_name() {
        for a in Activation::ALL {
            assert_eq!(a.name().parse::<Activation>(), Ok(a));
        }
        assert_eq!("ReLU".parse::<Activation>(), Ok(Activation::Relu));
        assert!("softmax".parse::<Activation>().is_err());
    }

    #[test]
    fn relu_clamps_negatives() {
        let m = matrix![[-1.0, 0.0, 2.0]];
        assert_eq!(Activation::Relu.apply(&m), matrix![[0.0, 0.0, 2.0]]);
        assert_eq!(Activation::Relu.derivative(&m), matrix![[0.0, 0.0, 1.0]]);
    }

    #[test]
    fn sigmoid_is_centered() {
        let m = matrix![[0.0]];
        assert_eq!(Activation::Sigmoid.apply(&m)[0], 0.5);
        assert_eq!(Activation::Sigmoid.derivative(&m)[0], 0.25);
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let eps = 1e-3;
        for a in Activation::ALL {
            for x in [-1.5f32, -0.3, 0.4, 2.0] {
                let numeric = (a.apply_scalar(x + eps) - a.apply_scalar(x - eps)) / (2.0 * eps);
                let analytic = a.derivative_scalar(x);
                assert!(
                    approx_eq(&[numeric][..], &[analytic][..]) || (numeric - analytic).abs() < 1e-2,
                    "{a} at {x}: {numeric} vs {analytic}"
                );
            }
        }
    }
}
