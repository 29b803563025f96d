// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! MobileNetV3 computational-graph builder.
//!
//! The crate turns a compact per-variant stage table into a fully validated
//! input-to-output graph description: stem, inverted-residual bottleneck
//! stack, variant-dependent tail and optional classifier head. Channel
//! widths are scaled by a width multiplier through an asymmetric
//! multiple-of-8 rounding policy before any layer is emitted.
//!
//! See "Searching for MobileNetV3", Howard et al. 2019,
//! <https://arxiv.org/abs/1905.02244>.

pub mod config;
pub mod mobilenet_v3;

pub use config::{
    round_to_multiple_of, stage_table, BlockConfig, ModelVariant, SizeClass, StageTable,
    TailShape, CHANNEL_DIVISOR, ROUND_UP_BIAS,
};
pub use mobilenet_v3::{
    Bottleneck, ClassifierHead, ConvNormActivation, MobileNetV3, MobileNetV3Config,
    SqueezeExcitation,
};
