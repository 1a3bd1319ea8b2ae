use super::{ResidualBlock, ResidualKind};
use burn::prelude::*;

/// A run of residual units applied in order.
#[derive(Module, Debug)]
pub struct Stage<B: Backend> {
    blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> Stage<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }

    pub fn kinds(&self) -> Vec<ResidualKind> {
        self.blocks.iter().map(ResidualBlock::kind).collect()
    }
}

/// Encoder stage: one downsampling (or same-resolution) unit then
/// `unit_count - 1` bottlenecks at `channels`.
pub fn encoder_stage<B: Backend>(
    device: &B::Device,
    in_channels: usize,
    channels: usize,
    unit_count: usize,
    downsample: bool,
) -> Stage<B> {
    let head = if downsample {
        ResidualKind::Downsample
    } else {
        ResidualKind::Same
    };

    let mut blocks = vec![ResidualBlock::new(device, head, in_channels, channels)];
    for _ in 1..unit_count {
        blocks.push(ResidualBlock::new(device, ResidualKind::Bottleneck, channels, channels));
    }

    Stage { blocks }
}

/// Width a decoder stage expects at its input.
pub fn decoder_input_width(channels: usize, preserve_channels: bool) -> usize {
    if preserve_channels {
        channels
    } else {
        channels << 1
    }
}

/// Decoder stage: `unit_count - 1` bottlenecks at the input width, then one
/// upsampling (or same-resolution) unit producing `channels`.
pub fn decoder_stage<B: Backend>(
    device: &B::Device,
    channels: usize,
    unit_count: usize,
    preserve_channels: bool,
    do_upsample: bool,
) -> Stage<B> {
    let width = decoder_input_width(channels, preserve_channels);
    let tail = if do_upsample {
        ResidualKind::Upsample
    } else {
        ResidualKind::Same
    };

    let mut blocks = Vec::with_capacity(unit_count.max(1));
    for _ in 1..unit_count {
        blocks.push(ResidualBlock::new(device, ResidualKind::Bottleneck, width, width));
    }
    blocks.push(ResidualBlock::new(device, tail, width, channels));

    Stage { blocks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn encoder_stage_layout() {
        let device = Default::default();
        let stage = encoder_stage::<TestBackend>(&device, 16, 32, 3, true);
        assert_eq!(
            stage.kinds(),
            vec![
                ResidualKind::Downsample,
                ResidualKind::Bottleneck,
                ResidualKind::Bottleneck
            ]
        );
        let out = stage.forward(Tensor::ones([1, 16, 8, 8], &device));
        assert_eq!(out.dims(), [1, 32, 4, 4]);
    }

    #[test]
    fn first_encoder_stage_keeps_resolution() {
        let device = Default::default();
        let stage = encoder_stage::<TestBackend>(&device, 8, 32, 2, false);
        assert_eq!(stage.kinds()[0], ResidualKind::Same);
        let out = stage.forward(Tensor::ones([1, 8, 8, 8], &device));
        assert_eq!(out.dims(), [1, 32, 8, 8]);
    }

    #[test]
    fn decoder_stage_doubles_width_at_input() {
        let device = Default::default();
        let stage = decoder_stage::<TestBackend>(&device, 16, 3, false, true);
        assert_eq!(
            stage.kinds(),
            vec![
                ResidualKind::Bottleneck,
                ResidualKind::Bottleneck,
                ResidualKind::Upsample
            ]
        );
        let out = stage.forward(Tensor::ones([1, 32, 4, 4], &device));
        assert_eq!(out.dims(), [1, 16, 8, 8]);
    }

    #[test]
    fn last_decoder_stage_without_upsampling() {
        let device = Default::default();
        let stage = decoder_stage::<TestBackend>(&device, 8, 2, true, false);
        assert_eq!(
            stage.kinds(),
            vec![ResidualKind::Bottleneck, ResidualKind::Same]
        );
        let out = stage.forward(Tensor::ones([1, 8, 4, 4], &device));
        assert_eq!(out.dims(), [1, 8, 4, 4]);
    }
}
