//! # Kernel Dispatch Layer
//!
//! Matrix arithmetic kernels and the logic selecting where they run.
//!
//! ## Submodules
//!
//! - [`cpu`] — `rayon` workers walking the launch [`Geometry`](crate::geometry::Geometry)
//! - [`wgpu`] *(opt-in)* — WGSL compute shaders dispatched through `wgpu`
//! - [`dispatch`] — runtime backend switching and the unified kernel interface
//!
//! ## Kernel contract
//!
//! Every kernel is a fully synchronized unit of work. On the GPU that means:
//! acquire device mirrors, upload, launch, wait, read back, release. The host
//! thread that issued the call blocks until the result is on the host again;
//! nothing is queued across calls.
//!
//! Shape checks live in [`Matrix`](crate::Matrix); kernels assume consistent
//! slices.
//!
//! ## Feature Flags
//!
//! - `wgpu` — Enables the `wgpu` (WebGPU) backend

pub mod cpu;
pub mod dispatch;
#[cfg(feature = "wgpu")]
pub mod wgpu;

/// Element-wise binary operations shared by both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ElementwiseOp {
    /// `lhs + rhs`
    Add = 0,
    /// `lhs - rhs`
    Sub = 1,
    /// `lhs * rhs` (Hadamard product)
    Mul = 2,
}

impl ElementwiseOp {
    /// Applies the operation to a pair of scalars.
    #[inline]
    #[must_use]
    pub fn apply(self, lhs: f32, rhs: f32) -> f32 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
        }
    }

    /// Short name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "hadamard",
        }
    }
}
