// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{GraphError, GraphResult};
use crate::module::{Initializer, Module, Parameter};
use crate::shape::TensorShape;

/// Per-channel batch-normalisation descriptor.
///
/// Owns the learnable scale/shift pair; running statistics are buffers the
/// execution engine maintains and are not part of the graph description.
#[derive(Debug)]
pub struct BatchNorm2d {
    gamma: Parameter,
    beta: Parameter,
    num_features: usize,
    epsilon: f32,
    momentum: f32,
}

impl BatchNorm2d {
    pub fn new(name: impl Into<String>, num_features: usize) -> GraphResult<Self> {
        Self::with_settings(name, num_features, 1.0e-3, 0.99)
    }

    pub fn with_settings(
        name: impl Into<String>,
        num_features: usize,
        epsilon: f32,
        momentum: f32,
    ) -> GraphResult<Self> {
        if num_features == 0 {
            return Err(GraphError::InvalidHyperParameter {
                label: "batch_norm_features",
            });
        }
        if !(epsilon > 0.0) || !epsilon.is_finite() {
            return Err(GraphError::InvalidHyperParameter {
                label: "batch_norm_epsilon",
            });
        }
        if !(0.0..1.0).contains(&momentum) {
            return Err(GraphError::InvalidHyperParameter {
                label: "batch_norm_momentum",
            });
        }
        let name = name.into();
        Ok(Self {
            gamma: Parameter::new(format!("{name}.gamma"), vec![num_features], Initializer::Ones),
            beta: Parameter::new(format!("{name}.beta"), vec![num_features], Initializer::Zeros),
            num_features,
            epsilon,
            momentum,
        })
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }
}

impl Module for BatchNorm2d {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape> {
        let TensorShape::Map { channels, .. } = *input else {
            return Err(GraphError::RankMismatch {
                context: "batch_normalization",
            });
        };
        if channels != self.num_features {
            return Err(GraphError::ChannelMismatch {
                expected: self.num_features,
                got: channels,
            });
        }
        Ok(*input)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        visitor(&self.gamma)?;
        visitor(&self.beta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norm_preserves_matching_maps() {
        let norm = BatchNorm2d::new("bn", 64).unwrap();
        let shape = TensorShape::map(14, 14, 64);
        assert_eq!(norm.output_shape(&shape).unwrap(), shape);
    }

    #[test]
    fn norm_rejects_foreign_channel_counts() {
        let norm = BatchNorm2d::new("bn", 64).unwrap();
        let err = norm.output_shape(&TensorShape::map(14, 14, 32)).unwrap_err();
        assert_eq!(
            err,
            GraphError::ChannelMismatch {
                expected: 64,
                got: 32
            }
        );
    }

    #[test]
    fn settings_are_validated() {
        assert!(BatchNorm2d::with_settings("bn", 8, 0.0, 0.9).is_err());
        assert!(BatchNorm2d::with_settings("bn", 8, 1.0e-3, 1.0).is_err());
        assert!(BatchNorm2d::with_settings("bn", 0, 1.0e-3, 0.9).is_err());
    }
}
