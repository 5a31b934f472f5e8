//! Dense row-major `f32` matrices.
//!
//! A [`Matrix`] keeps its values in host memory. Arithmetic (`+`, `-`, `*`,
//! Hadamard product) goes through [`ops::dispatch`](crate::ops::dispatch),
//! which mirrors the operands into device memory for the duration of the call
//! when the GPU backend is active. Nothing stays resident on the device
//! between calls, so cloning a matrix is always a plain deep copy.
//!
//! Arithmetic between incompatible shapes is a fatal precondition. The
//! `try_*` methods return it as an [`Error`]; the operator impls panic with
//! the same diagnostic.
//!
//! ## Example
//!
//! ```rust
//! use gridnet::{matrix, Matrix};
//!
//! let a = matrix![[1.0, 2.0], [3.0, 4.0]];
//! let b = matrix![[5.0, 6.0], [7.0, 8.0]];
//! assert_eq!(&a * &b, matrix![[19.0, 22.0], [43.0, 50.0]]);
//! assert_eq!(&a + &Matrix::identity(2), matrix![[2.0, 2.0], [3.0, 5.0]]);
//! ```

use crate::error::{Error, Result, fatal};
use crate::ops::{ElementwiseOp, dispatch};
use core::fmt;
use core::ops::{Add, AddAssign, Index, IndexMut, Mul, MulAssign, Sub};

/// Shown in diagnostics for matrices without an id.
const NO_ID: &str = "NaN";

/// A 2-D matrix of `f32` values stored row-major.
#[derive(Debug, Clone, Default)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
    id: Option<String>,
}

/// Builds a [`Matrix`] from row literals.
///
/// ```rust
/// let m = gridnet::matrix![[1, 2, 3], [4, 5, 6]];
/// assert_eq!(m.dimensions(), (2, 3));
/// assert_eq!(m[4], 5.0);
/// ```
///
/// # Panics
///
/// Panics if the rows have different lengths.
#[macro_export]
macro_rules! matrix {
    ($( [ $( $x:expr ),* $(,)? ] ),+ $(,)?) => {{
        let rows: ::std::vec::Vec<::std::vec::Vec<f32>> = vec![ $( vec![ $( $x as f32 ),* ] ),+ ];
        $crate::error::fatal($crate::Matrix::from_rows(&rows))
    }};
}

impl Matrix {
    /// Creates a zero-filled `rows × cols` matrix.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Creates a `rows × cols` matrix with every element set to `value`.
    #[must_use]
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
            id: None,
        }
    }

    /// The `n × n` identity matrix.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        let mut m = Self::new(n, n);
        for i in 0..n {
            m.data[i * n + i] = 1.0;
        }
        m
    }

    /// Wraps row-major `values` as a `rows × cols` matrix.
    ///
    /// # Errors
    ///
    /// Fails if `values.len() != rows * cols`.
    pub fn from_values(values: impl Into<Vec<f32>>, rows: usize, cols: usize) -> Result<Self> {
        let data = values.into();
        if data.len() != rows * cols {
            return Err(Error::precondition(
                "matrix::construct",
                format!("{} values given for a {rows}x{cols} matrix", data.len()),
            ));
        }
        Ok(Self {
            rows,
            cols,
            data,
            id: None,
        })
    }

    /// Stacks equally long rows into a matrix.
    ///
    /// # Errors
    ///
    /// Fails if the rows are ragged.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(Error::precondition(
                    "matrix::construct",
                    format!("row {i} has {} values, expected {cols}", row.len()),
                ));
            }
            data.extend_from_slice(row);
        }
        Self::from_values(data, rows.len(), cols)
    }

    /// Vertically concatenates matrices with the same number of columns.
    ///
    /// # Errors
    ///
    /// Fails if the parts disagree on their column count.
    pub fn vstack<'a>(parts: impl IntoIterator<Item = &'a Self>) -> Result<Self> {
        let mut parts = parts.into_iter().peekable();
        let cols = parts.peek().map_or(0, |m| m.cols);
        let mut out = Self::new(0, cols);
        for part in parts {
            if part.cols != cols {
                return Err(Error::precondition(
                    "matrix::vstack",
                    format!("{} has {} columns, expected {cols}", part.id(), part.cols),
                ));
            }
            out.data.extend_from_slice(&part.data);
            out.rows += part.rows;
        }
        Ok(out)
    }

    /// Attaches a diagnostic id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Replaces the diagnostic id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// The diagnostic id, `"NaN"` when none was given.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(NO_ID)
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[must_use]
    pub const fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// `rows × cols`.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the matrix holds no values.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major host data.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consumes the matrix, returning its row-major data.
    #[must_use]
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// The values of row `r`.
    ///
    /// # Panics
    ///
    /// Panics if `r >= rows`.
    #[must_use]
    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Element at `(r, c)`, or `None` out of bounds.
    #[must_use]
    pub fn get(&self, r: usize, c: usize) -> Option<f32> {
        (r < self.rows && c < self.cols).then(|| self.data[r * self.cols + c])
    }

    /// Re-dimensions the matrix to a zeroed `rows × cols`, keeping its id.
    pub fn allocate(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
        self.data = vec![0.0; rows * cols];
    }

    /// Releases the host storage, leaving a `0 × 0` matrix. Idempotent.
    pub fn free(&mut self) {
        if self.data.capacity() > 0 {
            log::trace!(target: "gridnet::matrix", "free {}", self.id());
        }
        self.rows = 0;
        self.cols = 0;
        self.data = Vec::new();
    }

    fn elementwise(&self, rhs: &Self, op: ElementwiseOp, operation: &'static str) -> Result<Self> {
        if self.dimensions() != rhs.dimensions() {
            return Err(Error::precondition(
                operation,
                format!(
                    "{} is {}x{} but {} is {}x{}",
                    self.id(),
                    self.rows,
                    self.cols,
                    rhs.id(),
                    rhs.rows,
                    rhs.cols
                ),
            ));
        }
        let data = dispatch::elementwise(op, &self.data, &rhs.data, self.rows, self.cols)?;
        Self::from_values(data, self.rows, self.cols)
    }

    /// Element-wise sum.
    ///
    /// # Errors
    ///
    /// Fails if the dimensions differ, or the GPU backend fails.
    pub fn try_add(&self, rhs: &Self) -> Result<Self> {
        self.elementwise(rhs, ElementwiseOp::Add, "matrix::add")
    }

    /// Element-wise difference.
    ///
    /// # Errors
    ///
    /// Fails if the dimensions differ, or the GPU backend fails.
    pub fn try_sub(&self, rhs: &Self) -> Result<Self> {
        self.elementwise(rhs, ElementwiseOp::Sub, "matrix::sub")
    }

    /// Element-wise (Hadamard) product.
    ///
    /// # Errors
    ///
    /// Fails if the dimensions differ, or the GPU backend fails.
    pub fn try_hadamard(&self, rhs: &Self) -> Result<Self> {
        self.elementwise(rhs, ElementwiseOp::Mul, "matrix::hadamard")
    }

    /// Row-by-column product; the result is `self.rows × rhs.cols`.
    ///
    /// # Errors
    ///
    /// Fails if `self.cols != rhs.rows`, or the GPU backend fails.
    pub fn try_mul(&self, rhs: &Self) -> Result<Self> {
        if self.cols != rhs.rows {
            return Err(Error::precondition(
                "matrix::multiply",
                format!(
                    "{} has {} columns but {} has {} rows",
                    self.id(),
                    self.cols,
                    rhs.id(),
                    rhs.rows
                ),
            ));
        }
        let data = dispatch::matmul(&self.data, &rhs.data, self.rows, self.cols, rhs.cols)?;
        Self::from_values(data, self.rows, rhs.cols)
    }

    /// The transposed matrix.
    #[must_use]
    pub fn transpose(&self) -> Self {
        let mut out = Self::new(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        out
    }

    /// Sums every column, giving a `1 × cols` row.
    #[must_use]
    pub fn column_sums(&self) -> Self {
        let mut out = Self::new(1, self.cols);
        for row in self.data.chunks_exact(self.cols.max(1)) {
            for (acc, v) in out.data.iter_mut().zip(row) {
                *acc += v;
            }
        }
        out
    }

    /// Adds the `1 × cols` row `bias` to every row.
    ///
    /// # Errors
    ///
    /// Fails if `bias` is not a single row of matching width.
    pub fn add_row_broadcast(&self, bias: &Self) -> Result<Self> {
        if bias.rows != 1 || bias.cols != self.cols {
            return Err(Error::precondition(
                "matrix::add_row_broadcast",
                format!(
                    "cannot broadcast {}x{} over {}x{}",
                    bias.rows, bias.cols, self.rows, self.cols
                ),
            ));
        }
        let mut out = self.clone();
        for row in out.data.chunks_exact_mut(self.cols.max(1)) {
            for (v, b) in row.iter_mut().zip(&bias.data) {
                *v += b;
            }
        }
        Ok(out)
    }

    /// Applies `f` to every element.
    #[must_use]
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
            id: None,
        }
    }

    /// Multiplies every element by `factor`.
    #[must_use]
    pub fn scale(&self, factor: f32) -> Self {
        self.map(|v| v * factor)
    }

    /// Sum of all elements.
    #[must_use]
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }
}

impl Index<usize> for Matrix {
    type Output = f32;

    fn index(&self, i: usize) -> &f32 {
        &self.data[i]
    }
}

impl IndexMut<usize> for Matrix {
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        &mut self.data[i]
    }
}

impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.dimensions() == other.dimensions() && self.data == other.data
    }
}

impl Add for &Matrix {
    type Output = Matrix;

    #[track_caller]
    fn add(self, rhs: &Matrix) -> Matrix {
        fatal(self.try_add(rhs))
    }
}

impl Add for Matrix {
    type Output = Self;

    #[track_caller]
    fn add(self, rhs: Self) -> Self {
        &self + &rhs
    }
}

impl Sub for &Matrix {
    type Output = Matrix;

    #[track_caller]
    fn sub(self, rhs: &Matrix) -> Matrix {
        fatal(self.try_sub(rhs))
    }
}

impl Sub for Matrix {
    type Output = Self;

    #[track_caller]
    fn sub(self, rhs: Self) -> Self {
        &self - &rhs
    }
}

impl Mul for &Matrix {
    type Output = Matrix;

    #[track_caller]
    fn mul(self, rhs: &Matrix) -> Matrix {
        fatal(self.try_mul(rhs))
    }
}

impl Mul for Matrix {
    type Output = Self;

    #[track_caller]
    fn mul(self, rhs: Self) -> Self {
        &self * &rhs
    }
}

impl AddAssign<&Self> for Matrix {
    #[track_caller]
    fn add_assign(&mut self, rhs: &Self) {
        let id = self.id.take();
        *self = &*self + rhs;
        self.id = id;
    }
}

impl AddAssign for Matrix {
    #[track_caller]
    fn add_assign(&mut self, rhs: Self) {
        *self += &rhs;
    }
}

impl MulAssign<&Self> for Matrix {
    #[track_caller]
    fn mul_assign(&mut self, rhs: &Self) {
        let id = self.id.take();
        *self = &*self * rhs;
        self.id = id;
    }
}

impl MulAssign for Matrix {
    #[track_caller]
    fn mul_assign(&mut self, rhs: Self) {
        *self *= &rhs;
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}x{})", self.id(), self.rows, self.cols)?;
        for r in 0..self.rows {
            let row = self.row(r);
            f.write_str("[")?;
            for (i, v) in row.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{v}")?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_values_checks_length() {
        let err = Matrix::from_values(vec![1.0, 2.0, 3.0], 2, 2).unwrap_err();
        assert!(err.is_precondition());
        assert!(err.to_string().contains("3 values"));
    }

    #[test]
    fn free_is_idempotent() {
        let mut m = Matrix::filled(3, 3, 1.0).with_id("w");
        m.free();
        m.free();
        assert!(m.is_empty());
        assert_eq!(m.dimensions(), (0, 0));
        assert_eq!(m.id(), "w");
    }

    #[test]
    fn allocate_resets_shape() {
        let mut m = matrix![[1, 2]];
        m.allocate(2, 3);
        assert_eq!(m, Matrix::new(2, 3));
    }

    #[test]
    fn transpose_and_column_sums() {
        let m = matrix![[1, 2, 3], [4, 5, 6]];
        assert_eq!(m.transpose(), matrix![[1, 4], [2, 5], [3, 6]]);
        assert_eq!(m.column_sums(), matrix![[5, 7, 9]]);
        assert_eq!(m.sum(), 21.0);
    }

    #[test]
    fn broadcast_adds_bias_to_each_row() {
        let m = matrix![[1, 2], [3, 4], [5, 6]];
        let out = m.add_row_broadcast(&matrix![[10, 20]]).unwrap();
        assert_eq!(out, matrix![[11, 22], [13, 24], [15, 26]]);
        assert!(m.add_row_broadcast(&matrix![[1, 2, 3]]).is_err());
    }

    #[test]
    fn vstack_rejects_mixed_widths() {
        let a = matrix![[1, 2]];
        let b = matrix![[3, 4], [5, 6]];
        assert_eq!(Matrix::vstack([&a, &b]).unwrap(), matrix![[1, 2], [3, 4], [5, 6]]);
        assert!(Matrix::vstack([&a, &matrix![[1]]]).is_err());
    }

    #[test]
    fn mul_assign_changes_shape_and_keeps_id() {
        let mut m = matrix![[1, 2, 3]].with_id("x");
        m *= &matrix![[1], [1], [1]];
        assert_eq!(m.dimensions(), (1, 1));
        assert_eq!(m[0], 6.0);
        assert_eq!(m.id(), "x");
    }

    #[test]
    fn display_lists_rows() {
        let s = matrix![[1, 2], [3, 4]].with_id("m").to_string();
        assert_eq!(s, "m (2x2)\n[1, 2]\n[3, 4]\n");
    }
}
