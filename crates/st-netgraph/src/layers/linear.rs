// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{GraphError, GraphResult};
use crate::module::{Initializer, Module, Parameter, Regularizer};
use crate::shape::TensorShape;

/// Dense projection over flattened feature vectors.
///
/// Unlike convolution biases, the dense bias shares the weight regulariser.
#[derive(Debug)]
pub struct Linear {
    weight: Parameter,
    bias: Parameter,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    pub fn new(
        name: impl Into<String>,
        in_features: usize,
        out_features: usize,
        initializer: Initializer,
        regularizer: Option<Regularizer>,
    ) -> GraphResult<Self> {
        if in_features == 0 {
            return Err(GraphError::InvalidHyperParameter {
                label: "linear_in_features",
            });
        }
        if out_features == 0 {
            return Err(GraphError::InvalidHyperParameter {
                label: "linear_out_features",
            });
        }
        let name = name.into();
        let mut weight = Parameter::new(
            format!("{name}.weight"),
            vec![in_features, out_features],
            initializer,
        );
        let mut bias = Parameter::new(format!("{name}.bias"), vec![out_features], Initializer::Zeros);
        if let Some(regularizer) = regularizer {
            weight = weight.with_regularizer(regularizer);
            bias = bias.with_regularizer(regularizer);
        }
        Ok(Self {
            weight,
            bias,
            in_features,
            out_features,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }
}

impl Module for Linear {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape> {
        let TensorShape::Vector { features } = *input else {
            return Err(GraphError::RankMismatch {
                context: "dense_projection",
            });
        };
        if features != self.in_features {
            return Err(GraphError::ChannelMismatch {
                expected: self.in_features,
                got: features,
            });
        }
        Ok(TensorShape::vector(self.out_features))
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        visitor(&self.weight)?;
        visitor(&self.bias)
    }
}
