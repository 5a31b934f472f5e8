//! Error types shared by the whole crate.
//!
//! There is exactly one severity that matters here: fatal. A shape bug in a
//! training loop corrupts everything downstream, so nothing in this crate
//! retries or recovers. Fallible operations return [`Error`] at the point the
//! violation is detected; the operator sugar on [`Matrix`](crate::Matrix)
//! panics through [`fatal`] instead.

use thiserror::Error;

#[cfg(feature = "wgpu")]
pub use crate::ops::wgpu::GpuFailure;

/// Errors raised by matrix arithmetic, layers, networks and datasets.
#[derive(Debug, Error)]
pub enum Error {
    /// A precondition of `operation` was violated (shape mismatch, invalid
    /// ratio, batch size, layer state, ...).
    #[error("fatal precondition in {operation}: {detail}")]
    FatalPrecondition {
        /// The failing operation, e.g. `"matrix::add"`.
        operation: &'static str,
        /// The offending values.
        detail: String,
    },

    /// The accelerator could not be acquired or a kernel failed.
    #[cfg(feature = "wgpu")]
    #[error(transparent)]
    Gpu(#[from] GpuFailure),
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Builds a [`Error::FatalPrecondition`] and logs it at `error` level.
    pub fn precondition(operation: &'static str, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        log::error!(target: "gridnet", "at {operation} >> {detail}");
        Self::FatalPrecondition { operation, detail }
    }

    /// Whether this is a precondition violation (as opposed to a device failure).
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::FatalPrecondition { .. })
    }
}

/// Unwraps `result`, panicking with the diagnostic on failure.
///
/// Used by the operator impls, which have no way to return an error.
///
/// # Panics
///
/// Panics when `result` is an error.
#[track_caller]
pub fn fatal<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_display_names_operation() {
        let err = Error::precondition("layer::forward", "3 columns instead of 4");
        let msg = err.to_string();
        assert!(msg.contains("layer::forward"));
        assert!(msg.contains("3 columns instead of 4"));
        assert!(err.is_precondition());
    }

    #[test]
    #[should_panic(expected = "matrix::add")]
    fn fatal_panics_with_message() {
        let res: Result<()> = Err(Error::precondition("matrix::add", "2x2 vs 3x3"));
        fatal(res);
    }
}
