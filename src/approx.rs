//! Utilities to approximate equality of floating point values and matrices.

use crate::Matrix;

/// The max epsilon accepted on `f32`s.
pub const F32_MAX_ERROR: f32 = 1e-3;

/// The expected minimum epsilon accepted on `f32`s.
pub const F32_AVG_ERROR: f32 = 1e-5;

/// The best expected epsilon accepted on `f32`s.
pub const F32_MIN_ERROR: f32 = 1e-6;

/// Checks the relative distance based off epsilon.
pub trait RelativeEq<Rhs: ?Sized> {
    /// Enumerates the equality of `self` and `rhs`.
    fn approx_eq(&self, rhs: &Rhs) -> ApproxEquality;
}

impl RelativeEq<Self> for f32 {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        let dif = (self - rhs).abs();

        if dif < F32_MIN_ERROR {
            ApproxEquality::Precise
        } else if dif < F32_AVG_ERROR {
            ApproxEquality::Partial
        } else if dif < F32_MAX_ERROR {
            ApproxEquality::Relative
        } else {
            // NaN lands here as well
            ApproxEquality::Scarce
        }
    }
}

impl RelativeEq<Self> for [f32] {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        if self.len() != rhs.len() {
            return ApproxEquality::Scarce;
        }
        let mut eq = ApproxEquality::Precise;
        for (a, b) in self.iter().zip(rhs) {
            eq = eq.max(a.approx_eq(b));
            if eq == ApproxEquality::Scarce {
                break;
            }
        }
        eq
    }
}

impl RelativeEq<Self> for Matrix {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        if self.dimensions() != rhs.dimensions() {
            return ApproxEquality::Scarce;
        }
        self.as_slice().approx_eq(rhs.as_slice())
    }
}

/// The approximated equality enumerated, best first.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Very strong epsilon.
    Precise = 0,

    /// Good epsilon.
    Partial = 1,

    /// Acceptable epsilon.
    Relative = 2,

    /// No relative equality.
    Scarce = 3,
}

/// Whether `a` and `b` agree within [`F32_MAX_ERROR`] everywhere.
pub fn approx_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a.approx_eq(b) <= ApproxEquality::Relative
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grades_scalars() {
        assert_eq!(1.0f32.approx_eq(&1.0), ApproxEquality::Precise);
        assert_eq!(1.0f32.approx_eq(&1.000_002), ApproxEquality::Partial);
        assert_eq!(1.0f32.approx_eq(&1.000_5), ApproxEquality::Relative);
        assert_eq!(1.0f32.approx_eq(&1.1), ApproxEquality::Scarce);
        assert_eq!(f32::NAN.approx_eq(&f32::NAN), ApproxEquality::Scarce);
    }

    #[test]
    fn slice_takes_worst_element() {
        let a = [1.0f32, 2.0, 3.0];
        let b = [1.0f32, 2.000_5, 3.0];
        assert_eq!(a[..].approx_eq(&b[..]), ApproxEquality::Relative);
        assert!(approx_eq(&a[..], &b[..]));
        assert!(!approx_eq(&a[..], &[1.0f32, 2.0][..]));
    }

    #[test]
    fn matrices_need_same_shape() {
        let a = Matrix::new(2, 3);
        let b = Matrix::new(3, 2);
        assert!(approx_eq(&a, &a.clone()));
        assert!(!approx_eq(&a, &b));
    }
}
