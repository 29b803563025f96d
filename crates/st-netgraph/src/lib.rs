// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Symbolic layer-graph primitives for model builders.
//!
//! This crate carries the construction-time surface of a layer library:
//! tensor *shapes*, trainable-parameter *descriptors* and a closed set of
//! primitive layer kinds. Layers here never touch numeric data — running a
//! layer means propagating a [`shape::TensorShape`] through it, so an entire
//! network graph can be validated while it is being assembled. Numeric
//! kernels, automatic differentiation and weight materialisation belong to
//! the execution engine that consumes the finished graph.

pub mod error;
pub mod layers;
pub mod module;
pub mod shape;

pub use error::{GraphError, GraphResult};
pub use layers::activation::{hard_sigmoid, hard_swish, Activation};
pub use layers::conv::{Conv2d, DepthwiseConv2d};
pub use layers::dropout::Dropout;
pub use layers::linear::Linear;
pub use layers::normalization::BatchNorm2d;
pub use layers::pool::GlobalAvgPool;
pub use layers::LayerNode;
pub use module::{Initializer, Module, Parameter, Regularizer};
pub use shape::TensorShape;
