use crate::model::blocks::{conv_unit, encoder_stage, ConvUnit, Stage};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;

/// One ResNet-style tower: 7x7/2 stem, 3x3/2 max-pool, four residual stages.
#[derive(Module, Debug)]
pub struct EncoderTower<B: Backend> {
    stem: ConvUnit<B>,
    pool: MaxPool2d,
    stages: Vec<Stage<B>>,
}

impl<B: Backend> EncoderTower<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        stem_channels: usize,
        channels: [usize; 4],
        units: [usize; 4],
    ) -> Self {
        let mut stages = Vec::with_capacity(4);
        let mut width = stem_channels;
        for (level, (&out, &count)) in channels.iter().zip(units.iter()).enumerate() {
            // The first stage relies on the max-pool for its spatial reduction.
            stages.push(encoder_stage(device, width, out, count, level > 0));
            width = out;
        }

        Self {
            stem: conv_unit(device, in_channels, stem_channels, 7, 2, 3, true, true),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            stages,
        }
    }

    pub fn stem(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.stem.forward(x)
    }

    pub fn pool(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.pool.forward(x)
    }

    /// Residual stage `level` (0-based).
    pub fn stage(&self, level: usize, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.stages[level].forward(x)
    }
}

/// Fused (RGB + depth) feature maps at every encoder level, shallowest first:
/// stem (H/2), then stages 1..4 (H/4, H/8, H/16, H/32).
#[derive(Debug, Clone)]
pub struct FusedFeatures<B: Backend> {
    pub levels: [Tensor<B, 4>; 5],
}

/// RGB and depth towers with one-directional fusion: the RGB tower consumes
/// `rgb + depth` at every level, the depth tower only sees depth.
#[derive(Module, Debug)]
pub struct DualStreamEncoder<B: Backend> {
    rgb: EncoderTower<B>,
    depth: EncoderTower<B>,
}

impl<B: Backend> DualStreamEncoder<B> {
    pub fn new(
        device: &B::Device,
        stem_channels: usize,
        channels: [usize; 4],
        units: [usize; 4],
    ) -> Self {
        Self {
            rgb: EncoderTower::new(device, 3, stem_channels, channels, units),
            depth: EncoderTower::new(device, 1, stem_channels, channels, units),
        }
    }

    pub fn forward(&self, rgb: Tensor<B, 4>, depth: Tensor<B, 4>) -> FusedFeatures<B> {
        let stem_d = self.depth.stem(depth);
        let fused0 = self.rgb.stem(rgb) + stem_d.clone(); // H/2

        let layer1_d = self.depth.stage(0, self.depth.pool(stem_d));
        let fused1 = self.rgb.stage(0, self.rgb.pool(fused0.clone())) + layer1_d.clone(); // H/4

        let layer2_d = self.depth.stage(1, layer1_d);
        let fused2 = self.rgb.stage(1, fused1.clone()) + layer2_d.clone(); // H/8

        let layer3_d = self.depth.stage(2, layer2_d);
        let fused3 = self.rgb.stage(2, fused2.clone()) + layer3_d.clone(); // H/16

        let layer4_d = self.depth.stage(3, layer3_d);
        let fused4 = self.rgb.stage(3, fused3.clone()) + layer4_d; // H/32

        log::debug!(
            "encoder levels: {:?} {:?} {:?} {:?} {:?}",
            fused0.dims(),
            fused1.dims(),
            fused2.dims(),
            fused3.dims(),
            fused4.dims()
        );

        FusedFeatures {
            levels: [fused0, fused1, fused2, fused3, fused4],
        }
    }
}
