// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use st_mobilenet::{
    stage_table, MobileNetV3, MobileNetV3Config, ModelVariant, TailShape, CHANNEL_DIVISOR,
};
use st_netgraph::{GraphError, Module, TensorShape};

#[test]
fn large_classifier_produces_logits_and_a_full_tail() {
    let network = MobileNetV3::new(MobileNetV3Config::default()).unwrap();
    assert_eq!(network.output_shape(), TensorShape::vector(1000));
    assert_eq!(network.tail().out_channels(), 960);
    assert_eq!(network.feature_shape(), TensorShape::map(7, 7, 960));
    assert_eq!(network.blocks().len(), 15);
    assert!(network.has_classifier());

    // Recomputing the chain from the declared input reproduces the stored
    // output shape.
    let recomputed = Module::output_shape(&network, &network.input_shape()).unwrap();
    assert_eq!(recomputed, network.output_shape());
}

#[test]
fn blocks_are_named_sequentially_for_introspection() {
    let network = MobileNetV3::new(MobileNetV3Config::default()).unwrap();
    assert!(network.block("bottleneck0").is_some());
    assert!(network.block("bottleneck14").is_some());
    assert!(network.block("bottleneck15").is_none());
    assert_eq!(network.blocks()[3].name(), "bottleneck3");

    let mut block_scoped = 0usize;
    let mut se_biases = 0usize;
    network
        .visit_parameters(&mut |param| {
            if param.name().starts_with("bottleneck3.") {
                block_scoped += 1;
            }
            if param.name().contains(".se.") && param.name().ends_with(".bias") {
                se_biases += 1;
            }
            Ok(())
        })
        .unwrap();
    assert!(block_scoped > 0);
    assert!(se_biases > 0, "squeeze-excitation convolutions carry biases");
}

#[test]
fn small_segmentation_backbone_ends_at_the_shallow_tail() {
    let variant = ModelVariant::from_name("small_segmentation").unwrap();
    let network = MobileNetV3::new(MobileNetV3Config::backbone(variant)).unwrap();
    assert!(!network.has_classifier());
    assert_eq!(network.tail().out_channels(), 288);
    assert_eq!(network.output_shape(), network.feature_shape());
    assert_eq!(network.output_shape(), TensorShape::map(7, 7, 288));
    assert_eq!(network.blocks().len(), 11);
}

#[test]
fn unregistered_variant_names_fail_before_construction() {
    let err = ModelVariant::from_name("medium").unwrap_err();
    assert_eq!(
        err,
        GraphError::UnknownVariant {
            name: "medium".to_string()
        }
    );
}

#[test]
fn half_width_scaling_keeps_channels_aligned_and_shrinks_the_tail() {
    let config = MobileNetV3Config {
        width_multiplier: 0.5,
        ..MobileNetV3Config::default()
    };
    let network = MobileNetV3::new(config).unwrap();
    assert_eq!(network.tail().out_channels(), 480);
    for block in network.blocks() {
        assert_eq!(block.in_channels() % CHANNEL_DIVISOR, 0);
        assert_eq!(block.out_channels() % CHANNEL_DIVISOR, 0);
    }
}

#[test]
fn tail_width_is_not_scaled_at_or_above_unit_multiplier() {
    let config = MobileNetV3Config {
        width_multiplier: 2.0,
        ..MobileNetV3Config::default()
    };
    let network = MobileNetV3::new(config).unwrap();
    assert_eq!(network.tail().out_channels(), 960);
}

#[test]
fn builds_never_leak_scaling_into_the_shared_tables() {
    let baseline = stage_table(ModelVariant::large()).unwrap().clone();
    for multiplier in [0.35f32, 0.5, 1.0, 1.25] {
        let config = MobileNetV3Config {
            width_multiplier: multiplier,
            ..MobileNetV3Config::default()
        };
        MobileNetV3::new(config).unwrap();
    }
    assert_eq!(stage_table(ModelVariant::large()).unwrap(), &baseline);
}

#[test]
fn small_classifier_matches_the_reference_widths() {
    let network = MobileNetV3::new(MobileNetV3Config::small()).unwrap();
    assert_eq!(network.tail().out_channels(), 576);
    assert_eq!(network.feature_shape(), TensorShape::map(7, 7, 576));
    assert_eq!(network.output_shape(), TensorShape::vector(1000));
}

#[test]
fn large_detection_backbone_takes_the_half_width_tail() {
    let variant = ModelVariant::large().with_tail(TailShape::Shallow);
    let network = MobileNetV3::new(MobileNetV3Config::backbone(variant)).unwrap();
    assert_eq!(network.tail().out_channels(), 480);
}

#[test]
fn invalid_build_parameters_fail_atomically() {
    let zero_width = MobileNetV3Config {
        width_multiplier: 0.0,
        ..MobileNetV3Config::default()
    };
    assert!(matches!(
        MobileNetV3::new(zero_width).unwrap_err(),
        GraphError::NonPositiveWidthMultiplier { .. }
    ));

    let one_class = MobileNetV3Config {
        num_classes: 1,
        ..MobileNetV3Config::default()
    };
    assert!(matches!(
        MobileNetV3::new(one_class).unwrap_err(),
        GraphError::TooFewClasses { num_classes: 1 }
    ));

    let bad_dropout = MobileNetV3Config {
        dropout: 1.0,
        ..MobileNetV3Config::default()
    };
    assert!(matches!(
        MobileNetV3::new(bad_dropout).unwrap_err(),
        GraphError::InvalidHyperParameter {
            label: "dropout_rate"
        }
    ));

    let empty_input = MobileNetV3Config {
        input_hw: (0, 224),
        ..MobileNetV3Config::default()
    };
    assert!(matches!(
        MobileNetV3::new(empty_input).unwrap_err(),
        GraphError::InvalidDimensions { .. }
    ));
}

#[test]
fn stem_halves_the_input_and_feeds_the_first_block() {
    let network = MobileNetV3::new(MobileNetV3Config::default()).unwrap();
    let stem_out = network
        .stem()
        .output_shape(&TensorShape::map(224, 224, 3))
        .unwrap();
    assert_eq!(stem_out, TensorShape::map(112, 112, 16));
    assert_eq!(network.blocks()[0].in_channels(), 16);
}
