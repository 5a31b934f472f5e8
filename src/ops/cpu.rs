//! Parallel CPU backend.
//!
//! The CPU kernels follow the same launch [`Geometry`] as the shaders: one
//! logical worker per matrix cell, grouped into tiles. A horizontal band of
//! groups owns a contiguous run of rows, so each band is handed to `rayon` as
//! a disjoint mutable chunk and its groups are walked in order.
//!
//! These functions are the default target of [`dispatch`](super::dispatch)
//! and the fallback when the `wgpu` feature is not compiled in.

use super::ElementwiseOp;
use crate::geometry::{Extent, Geometry};
use rayon::prelude::*;

/// Runs `kernel(row, col)` for every cell of a `rows × cols` output.
fn launch<F>(out: &mut [f32], rows: usize, cols: usize, geometry: &Geometry, kernel: F)
where
    F: Fn(usize, usize) -> f32 + Sync,
{
    let band_rows = geometry.group_size.y as usize;
    if out.is_empty() || band_rows == 0 {
        return;
    }
    debug_assert_eq!(out.len(), rows * cols);

    out.par_chunks_mut(band_rows * cols)
        .enumerate()
        .for_each(|(gy, band)| {
            let first_row = gy * band_rows;
            for gx in 0..geometry.group_count.x {
                for ly in 0..geometry.group_size.y {
                    for lx in 0..geometry.group_size.x {
                        let (row, col) = geometry.cell(
                            Extent::new(gx, gy as u32),
                            Extent::new(lx, ly),
                        );
                        if row < rows && col < cols {
                            band[(row - first_row) * cols + col] = kernel(row, col);
                        }
                    }
                }
            }
        });
}

/// Element-wise `out = lhs ∘ rhs` over a `rows × cols` matrix.
///
/// # Panics
///
/// Panics if the slices are shorter than `rows * cols`.
#[must_use]
pub fn elementwise(
    op: ElementwiseOp,
    lhs: &[f32],
    rhs: &[f32],
    rows: usize,
    cols: usize,
    geometry: &Geometry,
) -> Vec<f32> {
    let mut out = vec![0.0; rows * cols];
    launch(&mut out, rows, cols, geometry, |row, col| {
        let i = row * cols + col;
        op.apply(lhs[i], rhs[i])
    });
    out
}

/// Row-by-column product `out = lhs (m×k) · rhs (k×n)`.
///
/// `geometry` must cover the `m × n` output.
///
/// # Panics
///
/// Panics if the slices are shorter than their stated shapes.
#[must_use]
pub fn matmul(
    lhs: &[f32],
    rhs: &[f32],
    m: usize,
    k: usize,
    n: usize,
    geometry: &Geometry,
) -> Vec<f32> {
    let mut out = vec![0.0; m * n];
    launch(&mut out, m, n, geometry, |row, col| {
        let mut sum = 0.0;
        for l in 0..k {
            sum += lhs[row * k + l] * rhs[l * n + col];
        }
        sum
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::compute_geometry;

    #[test]
    fn tiled_add_matches_naive() {
        let (rows, cols) = (37, 23);
        let a: Vec<f32> = (0..rows * cols).map(|i| i as f32).collect();
        let b: Vec<f32> = (0..rows * cols).map(|i| (i * 2) as f32).collect();
        let g = compute_geometry(rows, cols, 64);
        let out = elementwise(ElementwiseOp::Add, &a, &b, rows, cols, &g);
        for i in 0..rows * cols {
            assert_eq!(out[i], (i * 3) as f32);
        }
    }

    #[test]
    fn matmul_small() {
        // [1 2; 3 4] x [5 6; 7 8] = [19 22; 43 50]
        let g = compute_geometry(2, 2, 256);
        let out = matmul(&[1.0, 2.0, 3.0, 4.0], &[5.0, 6.0, 7.0, 8.0], 2, 2, 2, &g);
        assert_eq!(out, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn matmul_tiled_rectangular() {
        let (m, k, n) = (20, 3, 17);
        let a: Vec<f32> = (0..m * k).map(|i| (i % 5) as f32).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (i % 7) as f32).collect();
        let g = compute_geometry(m, n, 16);
        let out = matmul(&a, &b, m, k, n, &g);
        for r in 0..m {
            for c in 0..n {
                let expected: f32 = (0..k).map(|l| a[r * k + l] * b[l * n + c]).sum();
                assert_eq!(out[r * n + c], expected);
            }
        }
    }
}
