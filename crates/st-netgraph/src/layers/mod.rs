// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

pub mod activation;
pub mod conv;
pub mod dropout;
pub mod linear;
pub mod normalization;
pub mod pool;

pub use activation::Activation;
pub use conv::{Conv2d, DepthwiseConv2d};
pub use dropout::Dropout;
pub use linear::Linear;
pub use normalization::BatchNorm2d;
pub use pool::GlobalAvgPool;

use crate::error::GraphResult;
use crate::module::{Module, Parameter};
use crate::shape::TensorShape;

/// The closed set of primitive layer kinds a graph is built from.
///
/// Blocks hold their internals as ordered sequences of these tagged
/// variants, so a heterogeneous layer stack stays statically typed and can
/// be walked without downcasting.
#[derive(Debug)]
pub enum LayerNode {
    Convolution(Conv2d),
    DepthwiseConvolution(DepthwiseConv2d),
    Normalization(BatchNorm2d),
    DenseProjection(Linear),
    Activation(Activation),
    GlobalAveragePool(GlobalAvgPool),
    Dropout(Dropout),
}

impl Module for LayerNode {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape> {
        match self {
            Self::Convolution(layer) => layer.output_shape(input),
            Self::DepthwiseConvolution(layer) => layer.output_shape(input),
            Self::Normalization(layer) => layer.output_shape(input),
            Self::DenseProjection(layer) => layer.output_shape(input),
            Self::Activation(layer) => layer.output_shape(input),
            Self::GlobalAveragePool(layer) => layer.output_shape(input),
            Self::Dropout(layer) => layer.output_shape(input),
        }
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        match self {
            Self::Convolution(layer) => layer.visit_parameters(visitor),
            Self::DepthwiseConvolution(layer) => layer.visit_parameters(visitor),
            Self::Normalization(layer) => layer.visit_parameters(visitor),
            Self::DenseProjection(layer) => layer.visit_parameters(visitor),
            Self::Activation(layer) => layer.visit_parameters(visitor),
            Self::GlobalAveragePool(layer) => layer.visit_parameters(visitor),
            Self::Dropout(layer) => layer.visit_parameters(visitor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Initializer;

    #[test]
    fn a_node_sequence_threads_shapes() {
        let nodes = vec![
            LayerNode::Convolution(
                Conv2d::new(
                    "stem.conv",
                    3,
                    16,
                    (3, 3),
                    (2, 2),
                    (1, 1),
                    Initializer::VarianceScaling { seed: 42 },
                    None,
                    false,
                )
                .unwrap(),
            ),
            LayerNode::Normalization(BatchNorm2d::new("stem.bn", 16).unwrap()),
            LayerNode::Activation(Activation::HardSwish),
        ];
        let mut shape = TensorShape::map(224, 224, 3);
        for node in &nodes {
            shape = node.output_shape(&shape).unwrap();
        }
        assert_eq!(shape, TensorShape::map(112, 112, 16));
    }
}
