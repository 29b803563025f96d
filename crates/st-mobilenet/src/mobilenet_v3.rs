// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Building blocks and the top-level MobileNetV3 assembler.

use crate::config::{
    round_to_multiple_of, scale_channels, stage_table, BlockConfig, ModelVariant, SizeClass,
    TailShape, CHANNEL_DIVISOR, ROUND_UP_BIAS,
};
use st_netgraph::{
    Activation, BatchNorm2d, Conv2d, DepthwiseConv2d, Dropout, GlobalAvgPool, GraphError,
    GraphResult, Initializer, Linear, LayerNode, Module, Parameter, Regularizer, TensorShape,
};
use tracing::debug;

const WEIGHT_INIT: Initializer = Initializer::VarianceScaling { seed: 42 };
const WEIGHT_DECAY: Regularizer = Regularizer::L2 { strength: 1.0e-5 };
const CLASSIFIER_HIDDEN: usize = 1280;

/// Convolution, normalisation, activation: the atomic composite used for the
/// stem, the tail and the expansion stage inside bottleneck blocks.
#[derive(Debug)]
pub struct ConvNormActivation {
    conv: Conv2d,
    norm: BatchNorm2d,
    activation: Activation,
}

impl ConvNormActivation {
    pub fn new(
        name: &str,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        dilation: usize,
        activation: Activation,
    ) -> GraphResult<Self> {
        let conv = Conv2d::new(
            format!("{name}.conv"),
            in_channels,
            out_channels,
            (kernel_size, kernel_size),
            (stride, stride),
            (dilation, dilation),
            WEIGHT_INIT,
            Some(WEIGHT_DECAY),
            false,
        )?;
        let norm = BatchNorm2d::new(format!("{name}.bn"), out_channels)?;
        Ok(Self {
            conv,
            norm,
            activation,
        })
    }

    pub fn out_channels(&self) -> usize {
        self.conv.out_channels()
    }

    pub fn kernel_size(&self) -> usize {
        self.conv.kernel().0
    }

    pub fn stride(&self) -> usize {
        self.conv.stride().0
    }

    pub fn dilation(&self) -> usize {
        self.conv.dilation().0
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }
}

impl Module for ConvNormActivation {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape> {
        let shape = self.conv.output_shape(input)?;
        let shape = self.norm.output_shape(&shape)?;
        self.activation.output_shape(&shape)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        self.conv.visit_parameters(visitor)?;
        self.norm.visit_parameters(visitor)
    }
}

/// Squeeze-and-excitation channel gate.
///
/// A global spatial summary is squeezed through a ReLU bottleneck, expanded
/// back and passed through a hard sigmoid; the resulting per-channel gate
/// rescales the original, un-pooled tensor, so the output shape always
/// equals the input shape. The reduced width is re-aligned to a multiple of
/// 8 and never drops below 8.
#[derive(Debug)]
pub struct SqueezeExcitation {
    pool: GlobalAvgPool,
    reduce: Conv2d,
    expand: Conv2d,
    channels: usize,
    ratio: f32,
    reduced_channels: usize,
}

impl SqueezeExcitation {
    pub fn new(name: &str, channels: usize, ratio: f32) -> GraphResult<Self> {
        if !(ratio > 0.0) {
            return Err(GraphError::NonPositiveSqueezeRatio { ratio });
        }
        let reduced_channels =
            round_to_multiple_of(channels as f32 * ratio, CHANNEL_DIVISOR, ROUND_UP_BIAS)?;
        let reduce = Conv2d::new(
            format!("{name}.reduce"),
            channels,
            reduced_channels,
            (1, 1),
            (1, 1),
            (1, 1),
            WEIGHT_INIT,
            Some(WEIGHT_DECAY),
            true,
        )?;
        let expand = Conv2d::new(
            format!("{name}.expand"),
            reduced_channels,
            channels,
            (1, 1),
            (1, 1),
            (1, 1),
            WEIGHT_INIT,
            Some(WEIGHT_DECAY),
            true,
        )?;
        Ok(Self {
            pool: GlobalAvgPool::keeping_spatial(),
            reduce,
            expand,
            channels,
            ratio,
            reduced_channels,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn reduced_channels(&self) -> usize {
        self.reduced_channels
    }
}

impl Module for SqueezeExcitation {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape> {
        let summary = self.pool.output_shape(input)?;
        let squeezed = self.reduce.output_shape(&summary)?;
        let gate = self.expand.output_shape(&squeezed)?;
        // The gate multiplies the un-pooled input elementwise, so its channel
        // count has to line up with the tensor it rescales.
        if gate.channels() != input.channels() {
            return Err(GraphError::ShapeMismatch {
                left: *input,
                right: gate,
            });
        }
        Ok(*input)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        self.reduce.visit_parameters(visitor)?;
        self.expand.visit_parameters(visitor)
    }
}

/// One ordered element of a bottleneck's internal stack.
#[derive(Debug)]
enum BottleneckLayer {
    Node(LayerNode),
    SqueezeExcite(SqueezeExcitation),
}

impl Module for BottleneckLayer {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape> {
        match self {
            Self::Node(node) => node.output_shape(input),
            Self::SqueezeExcite(gate) => gate.output_shape(input),
        }
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        match self {
            Self::Node(node) => node.visit_parameters(visitor),
            Self::SqueezeExcite(gate) => gate.visit_parameters(visitor),
        }
    }
}

/// Inverted-residual bottleneck: expand, filter depthwise, optionally gate,
/// project back down, with a conditional shortcut.
///
/// The gate sits *after* the depthwise activation. The paper is unclear on
/// this ordering; runs with activation before the gate came out worse, so
/// the empirical placement is kept.
#[derive(Debug)]
pub struct Bottleneck {
    name: String,
    layers: Vec<BottleneckLayer>,
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    applies_residual: bool,
}

impl Bottleneck {
    pub fn new(
        name: impl Into<String>,
        config: &BlockConfig,
        allow_residual: bool,
    ) -> GraphResult<Self> {
        let name = name.into();
        let applies_residual = allow_residual
            && config.input_channels == config.output_channels
            && config.stride == 1;

        let mut layers = Vec::new();
        if config.input_channels != config.expanded_channels {
            // Pointwise expansion.
            layers.push(BottleneckLayer::Node(LayerNode::Convolution(Conv2d::new(
                format!("{name}.expand"),
                config.input_channels,
                config.expanded_channels,
                (1, 1),
                (1, 1),
                (1, 1),
                WEIGHT_INIT,
                Some(WEIGHT_DECAY),
                false,
            )?)));
            layers.push(BottleneckLayer::Node(LayerNode::Normalization(
                BatchNorm2d::new(format!("{name}.expand_bn"), config.expanded_channels)?,
            )));
            layers.push(BottleneckLayer::Node(LayerNode::Activation(
                config.activation,
            )));
        }
        layers.push(BottleneckLayer::Node(LayerNode::DepthwiseConvolution(
            DepthwiseConv2d::new(
                format!("{name}.depthwise"),
                config.expanded_channels,
                (config.kernel_size, config.kernel_size),
                (config.stride, config.stride),
                (config.dilation, config.dilation),
                WEIGHT_INIT,
                Some(WEIGHT_DECAY),
            )?,
        )));
        layers.push(BottleneckLayer::Node(LayerNode::Normalization(
            BatchNorm2d::new(format!("{name}.depthwise_bn"), config.expanded_channels)?,
        )));
        layers.push(BottleneckLayer::Node(LayerNode::Activation(
            config.activation,
        )));
        if let Some(ratio) = config.squeeze_excite {
            layers.push(BottleneckLayer::SqueezeExcite(SqueezeExcitation::new(
                &format!("{name}.se"),
                config.expanded_channels,
                ratio,
            )?));
        }
        // Linear pointwise projection; no activation afterwards.
        layers.push(BottleneckLayer::Node(LayerNode::Convolution(Conv2d::new(
            format!("{name}.project"),
            config.expanded_channels,
            config.output_channels,
            (1, 1),
            (1, 1),
            (1, 1),
            WEIGHT_INIT,
            Some(WEIGHT_DECAY),
            false,
        )?)));
        layers.push(BottleneckLayer::Node(LayerNode::Normalization(
            BatchNorm2d::new(format!("{name}.project_bn"), config.output_channels)?,
        )));

        Ok(Self {
            name,
            layers,
            in_channels: config.input_channels,
            out_channels: config.output_channels,
            stride: config.stride,
            applies_residual,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Whether the block adds its input back onto the projection output.
    pub fn applies_residual(&self) -> bool {
        self.applies_residual
    }
}

impl Module for Bottleneck {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape> {
        if !input.is_map() {
            return Err(GraphError::RankMismatch {
                context: "bottleneck",
            });
        }
        if input.channels() != self.in_channels {
            return Err(GraphError::ChannelMismatch {
                expected: self.in_channels,
                got: input.channels(),
            });
        }
        let mut shape = *input;
        for layer in &self.layers {
            shape = layer.output_shape(&shape)?;
        }
        if self.applies_residual && shape != *input {
            // The elementwise shortcut add needs identical operand shapes.
            return Err(GraphError::ShapeMismatch {
                left: *input,
                right: shape,
            });
        }
        Ok(shape)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        for layer in &self.layers {
            layer.visit_parameters(visitor)?;
        }
        Ok(())
    }
}

/// Classification head: pooled features, a hard-swish hidden projection,
/// dropout, then raw logits.
#[derive(Debug)]
pub struct ClassifierHead {
    layers: Vec<LayerNode>,
    num_classes: usize,
}

impl ClassifierHead {
    pub fn new(in_channels: usize, num_classes: usize, dropout: f32) -> GraphResult<Self> {
        if num_classes <= 1 {
            return Err(GraphError::TooFewClasses { num_classes });
        }
        let layers = vec![
            LayerNode::GlobalAveragePool(GlobalAvgPool::flattening()),
            LayerNode::DenseProjection(Linear::new(
                "head.hidden",
                in_channels,
                CLASSIFIER_HIDDEN,
                WEIGHT_INIT,
                Some(WEIGHT_DECAY),
            )?),
            LayerNode::Activation(Activation::HardSwish),
            LayerNode::Dropout(Dropout::new(dropout)?),
            LayerNode::DenseProjection(Linear::new(
                "head.logits",
                CLASSIFIER_HIDDEN,
                num_classes,
                WEIGHT_INIT,
                Some(WEIGHT_DECAY),
            )?),
        ];
        Ok(Self {
            layers,
            num_classes,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl Module for ClassifierHead {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape> {
        let mut shape = *input;
        for layer in &self.layers {
            shape = layer.output_shape(&shape)?;
        }
        Ok(shape)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        for layer in &self.layers {
            layer.visit_parameters(visitor)?;
        }
        Ok(())
    }
}

/// Base width of the final convolution block, per variant.
fn tail_channels(variant: ModelVariant) -> usize {
    match (variant.size, variant.tail) {
        (SizeClass::Large, TailShape::Full) => 960,
        (SizeClass::Large, TailShape::Shallow) => 480,
        (SizeClass::Small, TailShape::Full) => 576,
        (SizeClass::Small, TailShape::Shallow) => 288,
    }
}

/// Build-time parameters for a MobileNetV3 graph.
#[derive(Clone, Debug)]
pub struct MobileNetV3Config {
    pub input_hw: (usize, usize),
    pub input_channels: usize,
    pub width_multiplier: f32,
    pub num_classes: usize,
    pub dropout: f32,
    pub variant: ModelVariant,
    pub classifier: bool,
}

impl Default for MobileNetV3Config {
    fn default() -> Self {
        Self {
            input_hw: (224, 224),
            input_channels: 3,
            width_multiplier: 1.0,
            num_classes: 1000,
            dropout: 0.2,
            variant: ModelVariant::large(),
            classifier: true,
        }
    }
}

impl MobileNetV3Config {
    /// Default configuration for the small capacity class.
    pub fn small() -> Self {
        Self {
            variant: ModelVariant::small(),
            ..Self::default()
        }
    }

    /// Headless feature extractor for dense-prediction consumers.
    pub fn backbone(variant: ModelVariant) -> Self {
        Self {
            variant,
            classifier: false,
            ..Self::default()
        }
    }
}

/// Assembled MobileNetV3 graph: stem, bottleneck stack, tail and optional
/// classifier head, with one declared input and one declared output.
#[derive(Debug)]
pub struct MobileNetV3 {
    stem: ConvNormActivation,
    blocks: Vec<Bottleneck>,
    tail: ConvNormActivation,
    classifier: Option<ClassifierHead>,
    input_shape: TensorShape,
    feature_shape: TensorShape,
    output_shape: TensorShape,
}

impl MobileNetV3 {
    pub fn new(config: MobileNetV3Config) -> GraphResult<Self> {
        if !config.width_multiplier.is_finite() || config.width_multiplier <= 0.0 {
            return Err(GraphError::NonPositiveWidthMultiplier {
                multiplier: config.width_multiplier,
            });
        }
        if config.num_classes <= 1 {
            return Err(GraphError::TooFewClasses {
                num_classes: config.num_classes,
            });
        }

        // The registry table is shared; scaling hands back a private copy.
        let table = stage_table(config.variant)?.scaled(config.width_multiplier)?;
        let first = table.rows().first().ok_or(GraphError::InvalidHyperParameter {
            label: "stage_table",
        })?;
        debug!(rows = table.len(), multiplier = config.width_multiplier, "scaled stage table");

        let input_shape = TensorShape::map(
            config.input_hw.0,
            config.input_hw.1,
            config.input_channels,
        );

        // The stem is the same for every variant.
        let stem = ConvNormActivation::new(
            "stem",
            config.input_channels,
            first.input_channels,
            3,
            2,
            1,
            Activation::HardSwish,
        )?;
        let mut shape = stem.output_shape(&input_shape)?;

        let mut blocks = Vec::with_capacity(table.len());
        for (idx, row) in table.rows().iter().enumerate() {
            let block = Bottleneck::new(format!("bottleneck{idx}"), row, true)?;
            shape = block.output_shape(&shape)?;
            blocks.push(block);
        }
        debug!(blocks = blocks.len(), "unrolled bottleneck stack");

        let mut tail_width = tail_channels(config.variant);
        if config.width_multiplier < 1.0 {
            tail_width = scale_channels(tail_width, config.width_multiplier)?;
        }
        let tail = ConvNormActivation::new(
            "tail",
            shape.channels(),
            tail_width,
            1,
            1,
            1,
            Activation::HardSwish,
        )?;
        let feature_shape = tail.output_shape(&shape)?;

        let (classifier, output_shape) = if config.classifier {
            let head = ClassifierHead::new(tail_width, config.num_classes, config.dropout)?;
            let output = head.output_shape(&feature_shape)?;
            (Some(head), output)
        } else {
            (None, feature_shape)
        };
        debug!(?output_shape, "assembled network");

        Ok(Self {
            stem,
            blocks,
            tail,
            classifier,
            input_shape,
            feature_shape,
            output_shape,
        })
    }

    pub fn input_shape(&self) -> TensorShape {
        self.input_shape
    }

    /// Shape produced by the tail, ahead of any classifier.
    pub fn feature_shape(&self) -> TensorShape {
        self.feature_shape
    }

    pub fn output_shape(&self) -> TensorShape {
        self.output_shape
    }

    pub fn stem(&self) -> &ConvNormActivation {
        &self.stem
    }

    pub fn blocks(&self) -> &[Bottleneck] {
        &self.blocks
    }

    /// Looks up a bottleneck block by its sequential name.
    pub fn block(&self, name: &str) -> Option<&Bottleneck> {
        self.blocks.iter().find(|block| block.name() == name)
    }

    pub fn tail(&self) -> &ConvNormActivation {
        &self.tail
    }

    pub fn classifier(&self) -> Option<&ClassifierHead> {
        self.classifier.as_ref()
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }
}

impl Module for MobileNetV3 {
    fn output_shape(&self, input: &TensorShape) -> GraphResult<TensorShape> {
        let mut shape = self.stem.output_shape(input)?;
        for block in &self.blocks {
            shape = block.output_shape(&shape)?;
        }
        shape = self.tail.output_shape(&shape)?;
        if let Some(head) = &self.classifier {
            shape = head.output_shape(&shape)?;
        }
        Ok(shape)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> GraphResult<()>,
    ) -> GraphResult<()> {
        self.stem.visit_parameters(visitor)?;
        for block in &self.blocks {
            block.visit_parameters(visitor)?;
        }
        self.tail.visit_parameters(visitor)?;
        if let Some(head) = &self.classifier {
            head.visit_parameters(visitor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residual_config() -> BlockConfig {
        BlockConfig {
            input_channels: 40,
            expanded_channels: 240,
            output_channels: 40,
            kernel_size: 5,
            stride: 1,
            dilation: 1,
            squeeze_excite: Some(0.25),
            activation: Activation::HardSwish,
        }
    }

    #[test]
    fn residual_block_preserves_its_input_shape() {
        let block = Bottleneck::new("bottleneck4", &residual_config(), true).unwrap();
        assert!(block.applies_residual());
        let shape = TensorShape::map(28, 28, 40);
        assert_eq!(block.output_shape(&shape).unwrap(), shape);
    }

    #[test]
    fn channel_change_disables_the_residual() {
        let config = BlockConfig {
            output_channels: 48,
            ..residual_config()
        };
        let block = Bottleneck::new("bottleneck6", &config, true).unwrap();
        assert!(!block.applies_residual());
        let out = block.output_shape(&TensorShape::map(28, 28, 40)).unwrap();
        assert_eq!(out, TensorShape::map(28, 28, 48));
    }

    #[test]
    fn stride_disables_the_residual() {
        let config = BlockConfig {
            stride: 2,
            ..residual_config()
        };
        let block = Bottleneck::new("bottleneck8", &config, true).unwrap();
        assert!(!block.applies_residual());
        let out = block.output_shape(&TensorShape::map(28, 28, 40)).unwrap();
        assert_eq!(out, TensorShape::map(14, 14, 40));
    }

    #[test]
    fn callers_can_disable_residuals_outright() {
        let block = Bottleneck::new("bottleneck4", &residual_config(), false).unwrap();
        assert!(!block.applies_residual());
    }

    #[test]
    fn expansion_is_skipped_when_widths_already_match() {
        let config = BlockConfig {
            input_channels: 16,
            expanded_channels: 16,
            output_channels: 16,
            kernel_size: 3,
            stride: 2,
            dilation: 1,
            squeeze_excite: None,
            activation: Activation::Relu,
        };
        let block = Bottleneck::new("bottleneck0", &config, true).unwrap();
        let mut names = Vec::new();
        block
            .visit_parameters(&mut |param| {
                names.push(param.name().to_string());
                Ok(())
            })
            .unwrap();
        assert!(names.iter().all(|name| !name.contains(".expand")));
        assert!(names.iter().any(|name| name.contains(".depthwise")));
    }

    #[test]
    fn block_rejects_mismatched_inputs() {
        let block = Bottleneck::new("bottleneck4", &residual_config(), true).unwrap();
        let err = block.output_shape(&TensorShape::map(28, 28, 48)).unwrap_err();
        assert_eq!(
            err,
            GraphError::ChannelMismatch {
                expected: 40,
                got: 48
            }
        );
    }

    #[test]
    fn squeeze_excitation_reduces_to_aligned_widths() {
        for (channels, ratio) in [(16usize, 0.25f32), (72, 0.25), (96, 0.25), (960, 0.25)] {
            let gate = SqueezeExcitation::new("se", channels, ratio).unwrap();
            assert!(gate.reduced_channels() >= 8);
            assert_eq!(gate.reduced_channels() % 8, 0);
            let shape = TensorShape::map(14, 14, channels);
            assert_eq!(gate.output_shape(&shape).unwrap(), shape);
        }
    }

    #[test]
    fn squeeze_excitation_ratio_must_be_positive() {
        for ratio in [0.0f32, -0.25, f32::NAN] {
            let err = SqueezeExcitation::new("se", 64, ratio).unwrap_err();
            assert!(matches!(err, GraphError::NonPositiveSqueezeRatio { .. }));
        }
    }

    #[test]
    fn conv_norm_activation_reports_its_configuration() {
        let stem =
            ConvNormActivation::new("stem", 3, 16, 3, 2, 1, Activation::HardSwish).unwrap();
        assert_eq!(stem.out_channels(), 16);
        assert_eq!(stem.kernel_size(), 3);
        assert_eq!(stem.stride(), 2);
        assert_eq!(stem.dilation(), 1);
        assert_eq!(stem.activation(), Activation::HardSwish);
        let out = stem.output_shape(&TensorShape::map(224, 224, 3)).unwrap();
        assert_eq!(out, TensorShape::map(112, 112, 16));
    }

    #[test]
    fn classifier_head_flattens_and_projects() {
        let head = ClassifierHead::new(960, 1000, 0.2).unwrap();
        let out = head.output_shape(&TensorShape::map(7, 7, 960)).unwrap();
        assert_eq!(out, TensorShape::vector(1000));
    }

    #[test]
    fn classifier_head_needs_two_classes() {
        assert!(matches!(
            ClassifierHead::new(960, 1, 0.2).unwrap_err(),
            GraphError::TooFewClasses { num_classes: 1 }
        ));
    }
}
