//! Residual units used by the encoder and decoder stages.
//!
//! Every variant sums a main path with a shortcut of the same shape and
//! applies a ReLU to the sum. The variant is chosen once, at construction.

use super::{conv_unit, upsample_unit, ConvUnit, UpsampleUnit};
use burn::prelude::*;
use burn::tensor::activation;

/// Which residual unit to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualKind {
    /// Channel change, same resolution, projected shortcut.
    Same,
    /// Identity shortcut, `in == out`.
    Bottleneck,
    /// Stride-2 bottleneck with projected shortcut.
    Downsample,
    /// Transposed-convolution main path and shortcut, doubles resolution.
    Upsample,
}

#[derive(Module, Debug)]
pub struct SameBlock<B: Backend> {
    conv1: ConvUnit<B>,
    conv2: ConvUnit<B>,
    conv3: ConvUnit<B>,
    shortcut: ConvUnit<B>,
}

impl<B: Backend> SameBlock<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        let mid = out_channels >> 2;
        Self {
            conv1: conv_unit(device, in_channels, mid, 3, 1, 1, true, true),
            conv2: conv_unit(device, mid, mid, 3, 1, 1, true, true),
            conv3: conv_unit(device, mid, out_channels, 3, 1, 1, true, false),
            shortcut: conv_unit(device, in_channels, out_channels, 1, 1, 0, true, false),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let main = self.conv3.forward(self.conv2.forward(self.conv1.forward(x.clone())));
        activation::relu(main + self.shortcut.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct BottleneckBlock<B: Backend> {
    conv1: ConvUnit<B>,
    conv2: ConvUnit<B>,
    conv3: ConvUnit<B>,
}

impl<B: Backend> BottleneckBlock<B> {
    pub fn new(device: &B::Device, channels: usize) -> Self {
        let mid = channels >> 2;
        Self {
            conv1: conv_unit(device, channels, mid, 1, 1, 0, true, true),
            conv2: conv_unit(device, mid, mid, 3, 1, 1, true, true),
            conv3: conv_unit(device, mid, channels, 1, 1, 0, true, false),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let main = self.conv3.forward(self.conv2.forward(self.conv1.forward(x.clone())));
        activation::relu(x + main)
    }
}

#[derive(Module, Debug)]
pub struct DownsampleBlock<B: Backend> {
    conv1: ConvUnit<B>,
    conv2: ConvUnit<B>,
    conv3: ConvUnit<B>,
    shortcut: ConvUnit<B>,
}

impl<B: Backend> DownsampleBlock<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        let mid = out_channels >> 2;
        Self {
            conv1: conv_unit(device, in_channels, mid, 1, 1, 0, true, true),
            conv2: conv_unit(device, mid, mid, 3, 2, 1, true, true),
            conv3: conv_unit(device, mid, out_channels, 1, 1, 0, true, false),
            shortcut: conv_unit(device, in_channels, out_channels, 1, 2, 0, true, false),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let main = self.conv3.forward(self.conv2.forward(self.conv1.forward(x.clone())));
        activation::relu(main + self.shortcut.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct UpsampleBlock<B: Backend> {
    conv1: ConvUnit<B>,
    deconv: UpsampleUnit<B>,
    shortcut: UpsampleUnit<B>,
}

impl<B: Backend> UpsampleBlock<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        let mid = out_channels << 1;
        Self {
            conv1: conv_unit(device, in_channels, mid, 3, 1, 1, true, true),
            deconv: upsample_unit(device, mid, out_channels, false),
            shortcut: upsample_unit(device, in_channels, out_channels, false),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let main = self.deconv.forward(self.conv1.forward(x.clone()));
        activation::relu(main + self.shortcut.forward(x))
    }
}

#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ResidualBlock<B: Backend> {
    Same(SameBlock<B>),
    Bottleneck(BottleneckBlock<B>),
    Downsample(DownsampleBlock<B>),
    Upsample(UpsampleBlock<B>),
}

impl<B: Backend> ResidualBlock<B> {
    /// Builds a residual unit of the given kind.
    ///
    /// # Panics
    ///
    /// If a bottleneck is requested with `in_channels != out_channels`.
    pub fn new(
        device: &B::Device,
        kind: ResidualKind,
        in_channels: usize,
        out_channels: usize,
    ) -> Self {
        match kind {
            ResidualKind::Same => Self::Same(SameBlock::new(device, in_channels, out_channels)),
            ResidualKind::Bottleneck => {
                assert_eq!(
                    in_channels, out_channels,
                    "bottleneck blocks keep the channel count, got {in_channels} -> {out_channels}"
                );
                Self::Bottleneck(BottleneckBlock::new(device, out_channels))
            }
            ResidualKind::Downsample => {
                Self::Downsample(DownsampleBlock::new(device, in_channels, out_channels))
            }
            ResidualKind::Upsample => {
                Self::Upsample(UpsampleBlock::new(device, in_channels, out_channels))
            }
        }
    }

    pub fn kind(&self) -> ResidualKind {
        match self {
            Self::Same(_) => ResidualKind::Same,
            Self::Bottleneck(_) => ResidualKind::Bottleneck,
            Self::Downsample(_) => ResidualKind::Downsample,
            Self::Upsample(_) => ResidualKind::Upsample,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Same(block) => block.forward(x),
            Self::Bottleneck(block) => block.forward(x),
            Self::Downsample(block) => block.forward(x),
            Self::Upsample(block) => block.forward(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn run(kind: ResidualKind, in_channels: usize, out_channels: usize) -> [usize; 4] {
        let device = Default::default();
        let block = ResidualBlock::<TestBackend>::new(&device, kind, in_channels, out_channels);
        assert_eq!(block.kind(), kind);
        let normal = Distribution::Normal(0.0, 1.0);
        let input = Tensor::random([2, in_channels, 8, 12], normal, &device);
        block.forward(input).dims()
    }

    #[test]
    fn same_changes_channels_only() {
        assert_eq!(run(ResidualKind::Same, 8, 16), [2, 16, 8, 12]);
    }

    #[test]
    fn bottleneck_preserves_shape() {
        assert_eq!(run(ResidualKind::Bottleneck, 16, 16), [2, 16, 8, 12]);
    }

    #[test]
    fn downsample_halves_resolution() {
        assert_eq!(run(ResidualKind::Downsample, 16, 32), [2, 32, 4, 6]);
    }

    #[test]
    fn upsample_doubles_resolution() {
        assert_eq!(run(ResidualKind::Upsample, 16, 8), [2, 8, 16, 24]);
    }

    #[test]
    #[should_panic(expected = "bottleneck blocks keep the channel count")]
    fn bottleneck_rejects_width_change() {
        let device = Default::default();
        let _ = ResidualBlock::<TestBackend>::new(&device, ResidualKind::Bottleneck, 8, 16);
    }
}
