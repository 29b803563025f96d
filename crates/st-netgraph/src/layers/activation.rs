// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{GraphError, GraphResult};
use crate::module::{Module, Parameter};
use crate::shape::TensorShape;
use serde::{Deserialize, Serialize};

/// Hard sigmoid: a 6-saturated rectified-linear of `x + 3`, divided by 6.
pub fn hard_sigmoid(x: f32) -> f32 {
    (x + 3.0).max(0.0).min(6.0) / 6.0
}

/// Hard swish: `x * hard_sigmoid(x)`.
pub fn hard_swish(x: f32) -> f32 {
    x * hard_sigmoid(x)
}

/// The closed set of elementwise nonlinearities used across blocks.
///
/// Keeping this an enum (rather than a free-form tag) makes an unsupported
/// activation a construction-time error; [`Activation::from_tag`] covers the
/// stringly external surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    HardSwish,
}

impl Activation {
    /// Parses the external string tag for an activation.
    pub fn from_tag(tag: &str) -> GraphResult<Self> {
        match tag {
            "relu" => Ok(Self::Relu),
            "hardswish" => Ok(Self::HardSwish),
            other => Err(GraphError::UnsupportedActivation {
                tag: other.to_string(),
            }),
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::HardSwish => "hardswish",
        }
    }

    /// Scalar semantics of the nonlinearity.
    pub fn evaluate(self, x: f32) -> f32 {
        match self {
            Self::Relu => x.max(0.0),
            Self::HardSwish => hard_swish(x),
        }
    }
}

impl Module for Activation {
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
