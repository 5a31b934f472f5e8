//! Kernel launch geometry.
//!
//! Maps a matrix shape onto a grid of parallel groups so that every cell is
//! handled by exactly one worker and no group exceeds the hardware limit on
//! invocations per group.
//!
//! Small matrices run as a single group shaped exactly like the matrix
//! (`cols × rows`). Anything larger is tiled with square groups whose edge is
//! `floor(sqrt(max_group_size))`; workers that fall past the matrix edge in the
//! last row/column of groups are idle.

use core::fmt;

/// Default upper bound on workers per group.
///
/// Matches `wgpu::Limits::default().max_compute_invocations_per_workgroup`.
pub const DEFAULT_MAX_GROUP_SIZE: u32 = 256;

/// A two dimensional extent. `x` runs along columns, `y` along rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    /// Column axis.
    pub x: u32,
    /// Row axis.
    pub y: u32,
}

impl Extent {
    /// Creates an extent.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Number of points in the extent.
    #[must_use]
    pub const fn area(&self) -> u64 {
        self.x as u64 * self.y as u64
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// How a kernel over a `rows × cols` matrix is partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    /// Number of groups along each axis.
    pub group_count: Extent,
    /// Workers per group along each axis.
    pub group_size: Extent,
}

impl Geometry {
    /// Maps a `(group, position-in-group)` pair to the matrix cell it handles.
    ///
    /// The cell may lie outside the matrix; callers bounds-check against the
    /// real shape exactly like the shaders do.
    #[must_use]
    pub const fn cell(&self, group: Extent, local: Extent) -> (usize, usize) {
        let col = group.x as usize * self.group_size.x as usize + local.x as usize;
        let row = group.y as usize * self.group_size.y as usize + local.y as usize;
        (row, col)
    }

    /// Every in-bounds `(row, col)` this geometry covers for a `rows × cols`
    /// matrix, group by group.
    pub fn cells(&self, rows: usize, cols: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let count = self.group_count;
        let size = self.group_size;
        (0..count.y).flat_map(move |gy| {
            (0..count.x).flat_map(move |gx| {
                (0..size.y).flat_map(move |ly| {
                    (0..size.x).map(move |lx| {
                        self.cell(Extent::new(gx, gy), Extent::new(lx, ly))
                    })
                })
            })
        })
        .filter(move |&(r, c)| r < rows && c < cols)
    }

    /// Total number of groups launched.
    #[must_use]
    pub const fn groups(&self) -> u64 {
        self.group_count.area()
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grid={} & group={}", self.group_count, self.group_size)
    }
}

/// Computes the launch geometry covering a `rows × cols` matrix.
///
/// # Panics
///
/// Panics if `max_group_size` is zero or a dimension does not fit in `u32`.
#[must_use]
pub fn compute_geometry(rows: usize, cols: usize, max_group_size: u32) -> Geometry {
    assert!(max_group_size > 0, "max_group_size must be positive");
    let r = u32::try_from(rows).expect("row count exceeds u32");
    let c = u32::try_from(cols).expect("column count exceeds u32");

    let geometry = if (rows as u64) * (cols as u64) <= u64::from(max_group_size) {
        Geometry {
            group_count: Extent::new(1, 1),
            group_size: Extent::new(c, r),
        }
    } else {
        let side = max_group_size.isqrt();
        Geometry {
            group_count: Extent::new(c.div_ceil(side), r.div_ceil(side)),
            group_size: Extent::new(side, side),
        }
    };

    log::trace!(
        target: "gridnet::geometry",
        "nb_cols={cols} & nb_rows={rows} => {geometry}"
    );

    geometry
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn small_matrix_is_one_group() {
        let g = compute_geometry(10, 10, 256);
        assert_eq!(g.group_count, Extent::new(1, 1));
        assert_eq!(g.group_size, Extent::new(10, 10));
    }

    #[test]
    fn exact_fit_stays_single_group() {
        let g = compute_geometry(16, 16, 256);
        assert_eq!(g.group_count, Extent::new(1, 1));
        assert_eq!(g.group_size, Extent::new(16, 16));
    }

    #[test]
    fn large_matrix_is_tiled() {
        let g = compute_geometry(100, 33, 256);
        assert_eq!(g.group_size, Extent::new(16, 16));
        assert_eq!(g.group_count, Extent::new(3, 7));
    }

    #[test]
    fn non_square_limit_uses_floor_sqrt() {
        // floor(sqrt(1000)) = 31
        let g = compute_geometry(40, 40, 1000);
        assert_eq!(g.group_size, Extent::new(31, 31));
        assert_eq!(g.group_count, Extent::new(2, 2));
    }

    #[test]
    fn single_row_vector() {
        let g = compute_geometry(1, 3, 256);
        assert_eq!(g.group_size, Extent::new(3, 1));
        assert_eq!(g.cells(1, 3).collect::<Vec<_>>(), vec![(0, 0), (0, 1), (0, 2)]);
    }

    proptest! {
        #[test]
        fn covers_every_cell_within_limit(
            rows in 1usize..200,
            cols in 1usize..200,
            max in 1u32..2048,
        ) {
            let g = compute_geometry(rows, cols, max);
            prop_assert!(u64::from(g.group_count.x) * u64::from(g.group_size.x) >= cols as u64);
            prop_assert!(u64::from(g.group_count.y) * u64::from(g.group_size.y) >= rows as u64);
            prop_assert!(g.group_size.area() <= u64::from(max));
        }

        #[test]
        fn each_cell_covered_exactly_once(
            rows in 1usize..60,
            cols in 1usize..60,
            max in 1u32..300,
        ) {
            let g = compute_geometry(rows, cols, max);
            let mut seen = vec![0u8; rows * cols];
            for (r, c) in g.cells(rows, cols) {
                seen[r * cols + c] += 1;
            }
            prop_assert!(seen.iter().all(|&n| n == 1));
        }
    }
}
