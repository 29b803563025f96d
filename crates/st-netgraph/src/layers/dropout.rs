// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{GraphError, GraphResult};
use crate::module::{Module, Parameter};
use crate::shape::TensorShape;

/// Dropout descriptor. Mask sampling happens in the execution engine; the
/// graph only records the zeroing probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> GraphResult<Self> {
        if !(0.0..1.0).contains(&rate) {
            return Err(GraphError::InvalidHyperParameter {
                label: "dropout_rate",
            });
        }
        Ok(Self { rate })
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl Module for Dropout {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape> {
        Ok(*input)
    }

    fn visit_parameters(
        &self,
        _visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_must_stay_inside_the_unit_interval() {
        assert!(Dropout::new(0.0).is_ok());
        assert!(Dropout::new(0.2).is_ok());
        assert!(Dropout::new(1.0).is_err());
        assert!(Dropout::new(-0.1).is_err());
        assert!(Dropout::new(f32::NAN).is_err());
    }

    #[test]
    fn dropout_is_shape_transparent() {
        let dropout = Dropout::new(0.2).unwrap();
        let shape = TensorShape::vector(1280);
        assert_eq!(dropout.output_shape(&shape).unwrap(), shape);
    }
}
