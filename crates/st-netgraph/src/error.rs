// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::shape::TensorShape;
use thiserror::Error;

/// Result alias shared by every graph-construction helper.
pub type GraphResult<T> = Result<T, GraphError>;

/// Configuration errors raised while a graph is being assembled.
///
/// All of these are detected synchronously at build time; none are
/// recoverable mid-build, so builders fail before any partially constructed
/// network escapes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// A layer received a feature map with an empty spatial extent.
    #[error("invalid feature-map dimensions ({height} x {width}); both axes must be non-zero")]
    InvalidDimensions { height: usize, width: usize },
    /// A layer was wired to a tensor whose channel count breaks its contract.
    #[error("channel mismatch: expected {expected}, got {got}")]
    ChannelMismatch { expected: usize, got: usize },
    /// Two shapes that must agree (residual paths, gates) do not.
    #[error("shape mismatch: {left:?} cannot be combined with {right:?}")]
    ShapeMismatch {
        left: TensorShape,
        right: TensorShape,
    },
    /// A layer received a tensor of the wrong rank for its operation.
    #[error("rank mismatch in {context}: feature map and flattened vector inputs are not interchangeable")]
    RankMismatch { context: &'static str },
    /// A structural hyper-parameter (kernel, stride, dilation, rate, ...) is out of range.
    #[error("invalid hyper-parameter: {label}")]
    InvalidHyperParameter { label: &'static str },
    /// An activation tag outside the supported set was requested.
    #[error("unsupported activation: {tag}")]
    UnsupportedActivation { tag: String },
    /// Squeeze-and-excitation depth ratios must be strictly positive.
    #[error("squeeze-excitation ratio must be positive, got {ratio}")]
    NonPositiveSqueezeRatio { ratio: f32 },
    /// The asymmetric rounding bias must lie strictly inside the unit interval.
    #[error("round-up bias must lie in (0, 1), got {bias}")]
    RoundUpBiasOutOfRange { bias: f32 },
    /// Width multipliers must be positive and finite.
    #[error("width multiplier must be positive and finite, got {multiplier}")]
    NonPositiveWidthMultiplier { multiplier: f32 },
    /// A classifier head needs at least two classes to discriminate.
    #[error("classifier needs at least two classes, got {num_classes}")]
    TooFewClasses { num_classes: usize },
    /// The requested model variant has no registered stage table.
    #[error("unknown model variant: {name}")]
    UnknownVariant { name: String },
}
