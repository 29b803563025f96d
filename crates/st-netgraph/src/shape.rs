// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};

/// Symbolic shape of a tensor flowing through the graph.
///
/// The batch axis is implicit: shapes describe a single example in NHWC
/// order, either as a spatial feature map or as the flattened vector that
/// pooling and dense projections operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorShape {
    /// A spatial feature map with the given extent and channel count.
    Map {
        height: usize,
        width: usize,
        channels: usize,
    },
    /// A flattened per-example feature vector.
    Vector { features: usize },
}

impl TensorShape {
    /// Shorthand for a spatial feature map.
    pub fn map(height: usize, width: usize, channels: usize) -> Self {
        Self::Map {
            height,
            width,
            channels,
        }
    }

    /// Shorthand for a flattened feature vector.
    pub fn vector(features: usize) -> Self {
        Self::Vector { features }
    }

    /// Channel count of a map, or the feature count of a vector.
    pub fn channels(&self) -> usize {
        match self {
            Self::Map { channels, .. } => *channels,
            Self::Vector { features } => *features,
        }
    }

    /// Spatial extent when the shape is a feature map.
    pub fn spatial(&self) -> Option<(usize, usize)> {
        match self {
            Self::Map { height, width, .. } => Some((*height, *width)),
            Self::Vector { .. } => None,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map { .. })
    }
}

/// Output extent of a "same"-padded strided convolution.
///
/// With symmetric "same" padding the spatial result is `ceil(extent /
/// stride)` regardless of the (dilated) kernel extent; kernel and dilation
/// still have to be validated so a malformed layer fails at construction
/// rather than at execution.
pub fn same_conv_output_hw(
    input_hw: (usize, usize),
    kernel: (usize, usize),
    stride: (usize, usize),
    dilation: (usize, usize),
) -> GraphResult<(usize, usize)> {
    let (h, w) = input_hw;
    if h == 0 || w == 0 {
        return Err(GraphError::InvalidDimensions {
            height: h,
            width: w,
        });
    }
    for (value, label) in [
        (kernel.0, "kernel_h"),
        (kernel.1, "kernel_w"),
        (stride.0, "stride_h"),
        (stride.1, "stride_w"),
        (dilation.0, "dilation_h"),
        (dilation.1, "dilation_w"),
    ] {
        if value == 0 {
            return Err(GraphError::InvalidHyperParameter { label });
        }
    }
    let oh = (h + stride.0 - 1) / stride.0;
    let ow = (w + stride.1 - 1) / stride.1;
    Ok((oh, ow))
}
