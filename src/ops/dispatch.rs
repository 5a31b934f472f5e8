//! Operation Dispatch Layer
//!
//! Selects the backend for each kernel at runtime, based on the global
//! [`Backend`]. The CPU path is always available; the GPU path only when the
//! `wgpu` feature is compiled in.
//!
//! A GPU failure is surfaced as [`Error::Gpu`](crate::Error) and never retried
//! on the CPU. Selecting [`Backend::Wgpu`] in a build without the feature
//! falls back to the CPU, with a single warning.
//!
//! # Example
//! ```rust
//! use gridnet::ops::{dispatch, ElementwiseOp};
//!
//! let sum = dispatch::elementwise(ElementwiseOp::Add, &[1.0, 2.0], &[3.0, 4.0], 1, 2).unwrap();
//! assert_eq!(sum, vec![4.0, 6.0]);
//! ```

use super::ElementwiseOp;
use crate::backend::{Backend, get_backend};
use crate::error::{Error, Result};
use crate::geometry::{DEFAULT_MAX_GROUP_SIZE, compute_geometry};

#[cfg(not(feature = "wgpu"))]
fn warn_missing_gpu() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        log::warn!(
            target: "gridnet::dispatch",
            "wgpu backend selected but the `wgpu` feature is disabled; using cpu"
        );
    });
}

/// Launch grids are addressed with `u32` coordinates on every backend.
fn check_extent(operation: &'static str, dims: &[usize]) -> Result<()> {
    match dims.iter().find(|&&d| u32::try_from(d).is_err()) {
        Some(d) => Err(Error::precondition(operation, format!("dimension {d} exceeds u32"))),
        None => Ok(()),
    }
}

/// Dispatches an element-wise operation over two `rows × cols` buffers.
///
/// # Errors
///
/// Returns [`Error::Gpu`](crate::Error) when the GPU backend is active and
/// the device fails, and a precondition error when a dimension does not fit
/// in `u32`.
pub fn elementwise(
    op: ElementwiseOp,
    lhs: &[f32],
    rhs: &[f32],
    rows: usize,
    cols: usize,
) -> Result<Vec<f32>> {
    log::trace!(target: "gridnet::dispatch", "start_operation {} {rows}x{cols}", op.name());
    check_extent(op.name(), &[rows, cols])?;
    match get_backend() {
        Backend::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                return Ok(super::wgpu::elementwise(op, lhs, rhs, rows, cols)?);
            }
            #[cfg(not(feature = "wgpu"))]
            warn_missing_gpu();
        }
        Backend::Cpu => {}
    }

    let geometry = compute_geometry(rows, cols, DEFAULT_MAX_GROUP_SIZE);
    Ok(super::cpu::elementwise(op, lhs, rhs, rows, cols, &geometry))
}

/// Dispatches the product of an `m × k` and a `k × n` buffer.
///
/// # Errors
///
/// Returns [`Error::Gpu`](crate::Error) when the GPU backend is active and
/// the device fails, and a precondition error when a dimension does not fit
/// in `u32`.
pub fn matmul(lhs: &[f32], rhs: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>> {
    log::trace!(target: "gridnet::dispatch", "start_operation matmul {m}x{k} * {k}x{n}");
    check_extent("matrix::multiply", &[m, k, n])?;
    match get_backend() {
        Backend::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                return Ok(super::wgpu::matmul(lhs, rhs, m, k, n)?);
            }
            #[cfg(not(feature = "wgpu"))]
            warn_missing_gpu();
        }
        Backend::Cpu => {}
    }

    let geometry = compute_geometry(m, n, DEFAULT_MAX_GROUP_SIZE);
    Ok(super::cpu::matmul(lhs, rhs, m, k, n, &geometry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn oversized_dimension_is_a_precondition() {
        let rows = u32::MAX as usize + 1;
        let err = elementwise(ElementwiseOp::Add, &[], &[], rows, 0).unwrap_err();
        assert!(err.is_precondition());
        assert!(err.to_string().contains("exceeds u32"));

        let err = matmul(&[], &[], 0, rows, 0).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn small_shapes_pass_extent_check() {
        assert!(check_extent("test", &[3, 5, 7]).is_ok());
    }
}
