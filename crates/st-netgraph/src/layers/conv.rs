// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{GraphError, GraphResult};
use crate::module::{Initializer, Module, Parameter, Regularizer};
use crate::shape::{same_conv_output_hw, TensorShape};

fn validate_positive(value: usize, label: &'static str) -> GraphResult<()> {
    if value == 0 {
        return Err(GraphError::InvalidHyperParameter { label });
    }
    Ok(())
}

/// "Same"-padded 2D convolution descriptor.
///
/// Weights are laid out `(kernel_h, kernel_w, in_channels, out_channels)`;
/// the bias, when requested, is initialised to zeros and carries no
/// regulariser.
#[derive(Debug)]
pub struct Conv2d {
    weight: Parameter,
    bias: Option<Parameter>,
    in_channels: usize,
    out_channels: usize,
    kernel: (usize, usize),
    stride: (usize, usize),
    dilation: (usize, usize),
}

impl Conv2d {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        in_channels: usize,
        out_channels: usize,
        kernel: (usize, usize),
        stride: (usize, usize),
        dilation: (usize, usize),
        initializer: Initializer,
        regularizer: Option<Regularizer>,
        use_bias: bool,
    ) -> GraphResult<Self> {
        validate_positive(in_channels, "conv_in_channels")?;
        validate_positive(out_channels, "conv_out_channels")?;
        validate_positive(kernel.0, "kernel_h")?;
        validate_positive(kernel.1, "kernel_w")?;
        validate_positive(stride.0, "stride_h")?;
        validate_positive(stride.1, "stride_w")?;
        validate_positive(dilation.0, "dilation_h")?;
        validate_positive(dilation.1, "dilation_w")?;
        let name = name.into();
        let mut weight = Parameter::new(
            format!("{name}.weight"),
            vec![kernel.0, kernel.1, in_channels, out_channels],
            initializer,
        );
        if let Some(regularizer) = regularizer {
            weight = weight.with_regularizer(regularizer);
        }
        let bias = use_bias.then(|| {
            Parameter::new(
                format!("{name}.bias"),
                vec![out_channels],
                Initializer::Zeros,
            )
        });
        Ok(Self {
            weight,
            bias,
            in_channels,
            out_channels,
            kernel,
            stride,
            dilation,
        })
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel(&self) -> (usize, usize) {
        self.kernel
    }

    pub fn stride(&self) -> (usize, usize) {
        self.stride
    }

    pub fn dilation(&self) -> (usize, usize) {
        self.dilation
    }

    pub fn has_bias(&self) -> bool {
        self.bias.is_some()
    }
}

impl Module for Conv2d {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape> {
        let TensorShape::Map {
            height,
            width,
            channels,
        } = *input
        else {
            return Err(GraphError::RankMismatch {
                context: "convolution",
            });
        };
        if channels != self.in_channels {
            return Err(GraphError::ChannelMismatch {
                expected: self.in_channels,
                got: channels,
            });
        }
        let (oh, ow) = same_conv_output_hw((height, width), self.kernel, self.stride, self.dilation)?;
        Ok(TensorShape::map(oh, ow, self.out_channels))
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        visitor(&self.weight)?;
        if let Some(bias) = &self.bias {
            visitor(bias)?;
        }
        Ok(())
    }
}

/// "Same"-padded depthwise 2D convolution descriptor.
///
/// One spatial filter per channel; the channel count is preserved and no
/// bias is carried.
#[derive(Debug)]
pub struct DepthwiseConv2d {
    weight: Parameter,
    channels: usize,
    kernel: (usize, usize),
    stride: (usize, usize),
    dilation: (usize, usize),
}

impl DepthwiseConv2d {
    pub fn new(
        name: impl Into<String>,
        channels: usize,
        kernel: (usize, usize),
        stride: (usize, usize),
        dilation: (usize, usize),
        initializer: Initializer,
        regularizer: Option<Regularizer>,
    ) -> GraphResult<Self> {
        validate_positive(channels, "depthwise_channels")?;
        validate_positive(kernel.0, "kernel_h")?;
        validate_positive(kernel.1, "kernel_w")?;
        validate_positive(stride.0, "stride_h")?;
        validate_positive(stride.1, "stride_w")?;
        validate_positive(dilation.0, "dilation_h")?;
        validate_positive(dilation.1, "dilation_w")?;
        let name = name.into();
        let mut weight = Parameter::new(
            format!("{name}.weight"),
            vec![kernel.0, kernel.1, channels, 1],
            initializer,
        );
        if let Some(regularizer) = regularizer {
            weight = weight.with_regularizer(regularizer);
        }
        Ok(Self {
            weight,
            channels,
            kernel,
            stride,
            dilation,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn kernel(&self) -> (usize, usize) {
        self.kernel
    }

    pub fn stride(&self) -> (usize, usize) {
        self.stride
    }

    pub fn dilation(&self) -> (usize, usize) {
        self.dilation
    }
}

impl Module for DepthwiseConv2d {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape> {
        let TensorShape::Map {
            height,
            width,
            channels,
        } = *input
        else {
            return Err(GraphError::RankMismatch {
                context: "depthwise_convolution",
            });
        };
        if channels != self.channels {
            return Err(GraphError::ChannelMismatch {
                expected: self.channels,
                got: channels,
            });
        }
        let (oh, ow) = same_conv_output_hw((height, width), self.kernel, self.stride, self.dilation)?;
        Ok(TensorShape::map(oh, ow, self.channels))
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        visitor(&self.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT: Initializer = Initializer::VarianceScaling { seed: 42 };

    #[test]
    fn conv_maps_channels_and_strides() {
        let conv = Conv2d::new("stem.conv", 3, 16, (3, 3), (2, 2), (1, 1), INIT, None, false)
            .unwrap();
        let out = conv
            .output_shape(&TensorShape::map(224, 224, 3))
            .unwrap();
        assert_eq!(out, TensorShape::map(112, 112, 16));
        assert!(!conv.has_bias());
    }

    #[test]
    fn conv_rejects_channel_mismatch() {
        let conv =
            Conv2d::new("proj", 32, 64, (1, 1), (1, 1), (1, 1), INIT, None, false).unwrap();
        let err = conv
            .output_shape(&TensorShape::map(8, 8, 16))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::ChannelMismatch {
                expected: 32,
                got: 16
            }
        );
    }

    #[test]
    fn conv_rejects_flattened_input() {
        let conv =
            Conv2d::new("proj", 32, 64, (1, 1), (1, 1), (1, 1), INIT, None, false).unwrap();
        let err = conv
            .output_shape(&TensorShape::vector(32))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::RankMismatch {
                context: "convolution"
            }
        );
    }

    #[test]
    fn depthwise_preserves_channels() {
        let conv =
            DepthwiseConv2d::new("dw", 240, (5, 5), (2, 2), (1, 1), INIT, None).unwrap();
        let out = conv
            .output_shape(&TensorShape::map(28, 28, 240))
            .unwrap();
        assert_eq!(out, TensorShape::map(14, 14, 240));
    }

    #[test]
    fn zero_kernel_is_a_construction_error() {
        let err = Conv2d::new("bad", 3, 16, (0, 3), (1, 1), (1, 1), INIT, None, false)
            .unwrap_err();
        assert_eq!(err, GraphError::InvalidHyperParameter { label: "kernel_h" });
    }
}
