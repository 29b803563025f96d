// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{GraphError, GraphResult};
use crate::module::{Module, Parameter};
use crate::shape::TensorShape;

/// Global spatial average pool.
///
/// Gating paths keep unit spatial axes so the result can be broadcast back
/// over the map it summarises; classifier heads flatten straight to a
/// feature vector instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalAvgPool {
    keep_spatial: bool,
}

impl GlobalAvgPool {
    /// Pool to a `1 x 1 x C` map.
    pub fn keeping_spatial() -> Self {
        Self { keep_spatial: true }
    }

    /// Pool and flatten to a `C`-feature vector.
    pub fn flattening() -> Self {
        Self {
            keep_spatial: false,
        }
    }

    pub fn keeps_spatial(&self) -> bool {
        self.keep_spatial
    }
}

impl Module for GlobalAvgPool {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape> {
        let TensorShape::Map {
            height,
            width,
            channels,
        } = *input
        else {
            return Err(GraphError::RankMismatch {
                context: "global_average_pool",
            });
        };
        if height == 0 || width == 0 {
            return Err(GraphError::InvalidDimensions { height, width });
        }
        if self.keep_spatial {
            Ok(TensorShape::map(1, 1, channels))
        } else {
            Ok(TensorShape::vector(channels))
        }
    }

    fn visit_parameters(
        &self,
        _visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        Ok(())
    }
}
