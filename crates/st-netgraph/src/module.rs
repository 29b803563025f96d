// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::GraphResult;
use crate::shape::TensorShape;
use serde::{Deserialize, Serialize};

/// Weight-initialisation hook, resolved by the execution engine.
///
/// The graph layer only records *which* scheme a parameter wants; drawing the
/// actual values is the engine's job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Initializer {
    /// Fan-based variance scaling with a fixed seed.
    VarianceScaling { seed: u64 },
    Zeros,
    Ones,
}

/// Weight-regularisation hook, resolved by the training loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Regularizer {
    /// L2 weight decay with the given strength.
    L2 { strength: f32 },
}

/// Descriptor of a trainable parameter owned by a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    shape: Vec<usize>,
    initializer: Initializer,
    regularizer: Option<Regularizer>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, initializer: Initializer) -> Self {
        Self {
            name: name.into(),
            shape,
            initializer,
            regularizer: None,
        }
    }

    /// Attaches a regulariser hook, builder style.
    pub fn with_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.regularizer = Some(regularizer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of scalar weights the parameter will hold once materialised.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn initializer(&self) -> Initializer {
        self.initializer
    }

    pub fn regularizer(&self) -> Option<Regularizer> {
        self.regularizer
    }
}

/// Construction-time module surface.
///
/// `output_shape` plays the role a numeric `forward` would at runtime: it
/// pushes a symbolic shape through the module, surfacing configuration
/// errors while the graph is still being built. Parameter visitation walks
/// descriptors in declaration order so callers can count, rename-check or
/// export the parameter set of an assembled graph.
pub trait Module {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape>;

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()>;
}
