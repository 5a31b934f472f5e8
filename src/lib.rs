//! # `gridnet`
//!
//! A small matrix engine with optional GPU acceleration, and a feed-forward
//! neural network trainer built on top of it.
//!
//! ## Features
//!
//! - **Matrices**: dense row-major `f32` matrices with checked arithmetic
//! - **Kernels**: element-wise and matrix-product kernels launched over a
//!   computed grid of groups, on the CPU via Rayon or on the GPU via `wgpu`
//!   compute shaders
//! - **Layers**: dense layers with an explicit forward / backward / update
//!   cycle
//! - **Training**: mini-batch gradient descent over an in-memory dataset
//!
//! ## Backends
//!
//! Arithmetic runs on the CPU by default. Build with the `wgpu` feature and
//! call [`backend::set_backend`] to move it to the GPU:
//!
//! ```rust,no_run
//! use gridnet::backend::{set_backend, Backend};
//! set_backend(Backend::Wgpu);
//! ```
//!
//! ## Errors
//!
//! Shape mismatches, invalid batch sizes and the like are fatal
//! preconditions: every fallible call returns [`Error::FatalPrecondition`]
//! at the point of detection and logs it through the `log` facade. The
//! arithmetic operators on [`Matrix`] panic instead.
//!
//! ## Example
//!
//! ```rust
//! use gridnet::{matrix, Activation, Layer, Network};
//!
//! let layer = Layer::from_parameters(
//!     matrix![[1.0], [1.0], [1.0]],
//!     matrix![[0.0]],
//!     Activation::Identity,
//! )
//! .unwrap();
//! let net = Network::new(vec![layer]).unwrap();
//! assert_eq!(net.predict(&matrix![[2.0, 3.0, 4.0]]).unwrap(), matrix![[9.0]]);
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::many_single_char_names,
    clippy::cast_possible_truncation,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::module_name_repetitions
)]
#![deny(unsafe_code)]
#![forbid(unused_must_use)]
#![warn(missing_docs)]

pub mod activation;
pub mod approx;
pub mod backend;
pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod loss;
pub mod matrix;
pub mod network;
pub mod ops;

pub use activation::Activation;
pub use config::FitConfig;
pub use dataset::{Dataset, Entry};
pub use error::{Error, Result};
pub use layer::{Layer, LayerState};
pub use loss::{Loss, LossFunction};
pub use matrix::Matrix;
pub use network::{FitReport, Network};
