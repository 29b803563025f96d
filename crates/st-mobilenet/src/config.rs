// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Stage tables, width scaling and the model-variant registry.
//!
//! Tables here are data, not behaviour: one ordered row per bottleneck
//! block, registered per variant in an immutable process-wide map. Scaling
//! always happens on a fresh copy so concurrent builds with different
//! multipliers never observe each other.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use st_netgraph::{Activation, GraphError, GraphResult};
use std::collections::BTreeMap;

/// Hardware-friendly channel alignment.
pub const CHANNEL_DIVISOR: usize = 8;

/// Default asymmetric-rounding bias: candidates below 90% of the target
/// advance to the next multiple instead of shrinking capacity.
pub const ROUND_UP_BIAS: f32 = 0.9;

const SE_RATIO: f32 = 0.25;

/// Asymmetric rounding that makes `value` divisible by `divisor`.
///
/// Rounds half-up and never returns less than one divisor step. With the
/// default bias the result rounds up unless the naive rounding stays within
/// `round_up_bias` of the original value: `(83, 8) -> 80` but `(84, 8) -> 88`.
pub fn round_to_multiple_of(
    value: f32,
    divisor: usize,
    round_up_bias: f32,
) -> GraphResult<usize> {
    if divisor == 0 {
        return Err(GraphError::InvalidHyperParameter {
            label: "rounding_divisor",
        });
    }
    if !round_up_bias.is_finite() || round_up_bias <= 0.0 || round_up_bias >= 1.0 {
        return Err(GraphError::RoundUpBiasOutOfRange {
            bias: round_up_bias,
        });
    }
    if !value.is_finite() || value < 0.0 {
        return Err(GraphError::InvalidHyperParameter {
            label: "rounding_value",
        });
    }
    let half = divisor as f32 / 2.0;
    let candidate = ((value + half) as usize / divisor * divisor).max(divisor);
    if (candidate as f32) < round_up_bias * value {
        Ok(candidate + divisor)
    } else {
        Ok(candidate)
    }
}

pub(crate) fn scale_channels(channels: usize, width_multiplier: f32) -> GraphResult<usize> {
    round_to_multiple_of(
        channels as f32 * width_multiplier,
        CHANNEL_DIVISOR,
        ROUND_UP_BIAS,
    )
}

/// Shape contract of one inverted-residual bottleneck block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    pub input_channels: usize,
    pub expanded_channels: usize,
    pub output_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub dilation: usize,
    /// Squeeze-and-excitation depth ratio; `None` disables the gate.
    pub squeeze_excite: Option<f32>,
    pub activation: Activation,
}

/// Ordered sequence of block configurations defining a variant's topology
/// before width scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTable {
    rows: Vec<BlockConfig>,
}

impl StageTable {
    fn new(rows: Vec<BlockConfig>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[BlockConfig] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns a scaled copy of the table.
    ///
    /// The three channel fields of every row are multiplied and re-aligned
    /// to multiples of [`CHANNEL_DIVISOR`]. The receiver is never touched:
    /// registry tables are shared process-wide and must survive builds with
    /// different multipliers unchanged.
    pub fn scaled(&self, width_multiplier: f32) -> GraphResult<StageTable> {
        if !width_multiplier.is_finite() || width_multiplier <= 0.0 {
            return Err(GraphError::NonPositiveWidthMultiplier {
                multiplier: width_multiplier,
            });
        }
        let rows = self
            .rows
            .iter()
            .map(|row| {
                Ok(BlockConfig {
                    input_channels: scale_channels(row.input_channels, width_multiplier)?,
                    expanded_channels: scale_channels(row.expanded_channels, width_multiplier)?,
                    output_channels: scale_channels(row.output_channels, width_multiplier)?,
                    ..*row
                })
            })
            .collect::<GraphResult<Vec<_>>>()?;
        Ok(StageTable::new(rows))
    }
}

/// Network capacity class.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SizeClass {
    Small,
    Large,
}

/// Width of the final convolution block ahead of the head.
///
/// Dense-prediction consumers (segmentation, detection) take the shallow
/// tail; classification takes the full one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TailShape {
    Full,
    Shallow,
}

/// Structured variant descriptor: capacity and tail shape are independent
/// axes, so invalid combinations cannot be expressed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ModelVariant {
    pub size: SizeClass,
    pub tail: TailShape,
}

impl ModelVariant {
    pub const fn new(size: SizeClass, tail: TailShape) -> Self {
        Self { size, tail }
    }

    pub const fn small() -> Self {
        Self::new(SizeClass::Small, TailShape::Full)
    }

    pub const fn large() -> Self {
        Self::new(SizeClass::Large, TailShape::Full)
    }

    pub const fn with_tail(mut self, tail: TailShape) -> Self {
        self.tail = tail;
        self
    }

    /// Parses the conventional external variant naming: a size class,
    /// optionally suffixed `_segmentation` or `_detection` for the shallow
    /// tail. Anything else is an unknown variant.
    pub fn from_name(name: &str) -> GraphResult<Self> {
        let unknown = || GraphError::UnknownVariant {
            name: name.to_string(),
        };
        let (size_part, tail) = match name.split_once('_') {
            Some((size, "segmentation")) | Some((size, "detection")) => {
                (size, TailShape::Shallow)
            }
            Some(_) => return Err(unknown()),
            None => (name, TailShape::Full),
        };
        let size = match size_part {
            "small" => SizeClass::Small,
            "large" => SizeClass::Large,
            _ => return Err(unknown()),
        };
        Ok(Self::new(size, tail))
    }
}

const fn block(
    input_channels: usize,
    expanded_channels: usize,
    output_channels: usize,
    kernel_size: usize,
    stride: usize,
    squeeze_excite: Option<f32>,
    activation: Activation,
) -> BlockConfig {
    BlockConfig {
        input_channels,
        expanded_channels,
        output_channels,
        kernel_size,
        stride,
        dilation: 1,
        squeeze_excite,
        activation,
    }
}

fn small_rows() -> Vec<BlockConfig> {
    use Activation::{HardSwish, Relu};
    // in, exp, out, kernel, stride, se, activation
    vec![
        block(16, 16, 16, 3, 2, Some(SE_RATIO), Relu),
        block(16, 72, 24, 3, 2, None, Relu),
        block(24, 88, 24, 3, 1, None, Relu),
        block(24, 96, 40, 5, 2, Some(SE_RATIO), HardSwish),
        block(40, 240, 40, 5, 1, Some(SE_RATIO), HardSwish),
        block(40, 240, 40, 5, 1, Some(SE_RATIO), HardSwish),
        block(40, 120, 48, 5, 1, Some(SE_RATIO), HardSwish),
        block(48, 144, 48, 5, 1, Some(SE_RATIO), HardSwish),
        block(48, 288, 96, 5, 2, Some(SE_RATIO), HardSwish),
        block(96, 576, 96, 5, 1, Some(SE_RATIO), HardSwish),
        block(96, 576, 96, 5, 1, Some(SE_RATIO), HardSwish),
    ]
}

fn large_rows() -> Vec<BlockConfig> {
    use Activation::{HardSwish, Relu};
    // in, exp, out, kernel, stride, se, activation
    vec![
        block(16, 16, 16, 3, 1, None, Relu),
        block(16, 64, 24, 3, 2, None, Relu),
        block(24, 72, 24, 3, 1, None, Relu),
        block(24, 72, 40, 5, 2, Some(SE_RATIO), Relu),
        block(40, 120, 40, 5, 1, Some(SE_RATIO), Relu),
        block(40, 120, 40, 5, 1, Some(SE_RATIO), Relu),
        block(40, 240, 80, 3, 2, None, HardSwish),
        block(80, 200, 80, 3, 1, None, HardSwish),
        block(80, 184, 80, 3, 1, None, HardSwish),
        block(80, 184, 80, 3, 1, None, HardSwish),
        block(80, 480, 112, 3, 1, Some(SE_RATIO), HardSwish),
        block(112, 672, 112, 3, 1, Some(SE_RATIO), HardSwish),
        block(112, 672, 160, 5, 2, Some(SE_RATIO), HardSwish),
        block(160, 960, 160, 5, 1, Some(SE_RATIO), HardSwish),
        block(160, 960, 160, 5, 1, Some(SE_RATIO), HardSwish),
    ]
}

static STAGE_TABLES: Lazy<BTreeMap<ModelVariant, StageTable>> = Lazy::new(|| {
    let mut tables = BTreeMap::new();
    for tail in [TailShape::Full, TailShape::Shallow] {
        tables.insert(
            ModelVariant::new(SizeClass::Small, tail),
            StageTable::new(small_rows()),
        );
        tables.insert(
            ModelVariant::new(SizeClass::Large, tail),
            StageTable::new(large_rows()),
        );
    }
    tables
});

/// Looks up the immutable stage table registered for `variant`.
pub fn stage_table(variant: ModelVariant) -> GraphResult<&'static StageTable> {
    STAGE_TABLES
        .get(&variant)
        .ok_or_else(|| GraphError::UnknownVariant {
            name: format!("{variant:?}"),
        })
}
