use super::decoder::Decoder;
use super::encoder::DualStreamEncoder;
use super::head::{SegmentationHead, SegmentationOutput};
use burn::prelude::*;

/// Topology of [`RgbdSegNet`]. Defaults describe the ResNet-50 based network.
#[derive(Config, Debug)]
pub struct RgbdSegNetConfig {
    pub num_classes: usize,
    #[config(default = 64)]
    pub stem_channels: usize,
    #[config(default = "[256, 512, 1024, 2048]")]
    pub encoder_channels: [usize; 4],
    #[config(default = "[3, 4, 6, 3]")]
    pub encoder_units: [usize; 4],
    #[config(default = "[256, 128, 64, 64, 64]")]
    pub decoder_channels: [usize; 5],
    #[config(default = "[6, 4, 3, 3, 3]")]
    pub decoder_units: [usize; 5],
}

impl RgbdSegNetConfig {
    /// A narrow, shallow variant with the same topology, for CPU smoke runs.
    pub fn slim(num_classes: usize) -> Self {
        Self::new(num_classes)
            .with_stem_channels(8)
            .with_encoder_channels([16, 32, 64, 128])
            .with_encoder_units([2, 2, 2, 1])
            .with_decoder_channels([32, 16, 8, 8, 8])
            .with_decoder_units([2, 2, 1, 2, 1])
    }

    /// Builds the network.
    ///
    /// # Panics
    ///
    /// If the decoder widths do not chain (each width equal to or half the
    /// previous one).
    pub fn init<B: Backend>(&self, device: &B::Device) -> RgbdSegNet<B> {
        let [e1, e2, e3, e4] = self.encoder_channels;
        let d = self.decoder_channels;

        log::info!(
            "RgbdSegNet init: classes={} encoder={:?} decoder={:?}",
            self.num_classes,
            self.encoder_channels,
            self.decoder_channels
        );

        RgbdSegNet {
            encoder: DualStreamEncoder::new(
                device,
                self.stem_channels,
                self.encoder_channels,
                self.encoder_units,
            ),
            decoder: Decoder::new(
                device,
                [self.stem_channels, e1, e2, e3, e4],
                d,
                self.decoder_units,
            ),
            head: SegmentationHead::new(device, self.num_classes, [d[0], d[1], d[2], d[3]], d[4]),
        }
    }
}

/// Dual-stream RGB-D encoder-decoder segmentation network with deep
/// supervision.
#[derive(Module, Debug)]
pub struct RgbdSegNet<B: Backend> {
    pub encoder: DualStreamEncoder<B>,
    pub decoder: Decoder<B>,
    pub head: SegmentationHead<B>,
}

impl<B: Backend> RgbdSegNet<B> {
    /// The reference topology for `num_classes` classes.
    pub fn new(device: &B::Device, num_classes: usize) -> Self {
        RgbdSegNetConfig::new(num_classes).init(device)
    }

    /// `rgb` is [B, 3, H, W], `depth` is [B, 1, H, W]; H and W must be
    /// divisible by 32.
    pub fn forward(&self, rgb: Tensor<B, 4>, depth: Tensor<B, 4>) -> SegmentationOutput<B> {
        let features = self.encoder.forward(rgb, depth);
        let decoded = self.decoder.forward(features);
        self.head.forward(decoded)
    }

    /// Splits a stacked [B, 4, H, W] RGB-D tensor and runs [`Self::forward`].
    pub fn forward_rgbd(&self, data: Tensor<B, 4>) -> SegmentationOutput<B> {
        let (rgb, depth) = crate::data::split_rgbd(data);
        self.forward(rgb, depth)
    }

    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }
}
