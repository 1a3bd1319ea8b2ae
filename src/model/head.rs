use crate::model::blocks::{bilinear_deconv, conv_unit, ConvUnit};
use crate::model::decoder::DecoderOutput;
use burn::nn::conv::ConvTranspose2d;
use burn::prelude::*;

/// Network outputs, primary first, then side outputs finest to coarsest.
#[derive(Debug, Clone)]
pub struct SegmentationOutput<B: Backend> {
    /// [B, classes, H, W]
    pub primary: Tensor<B, 4>,
    /// H/2
    pub side4: Tensor<B, 4>,
    /// H/4
    pub side3: Tensor<B, 4>,
    /// H/8
    pub side2: Tensor<B, 4>,
    /// H/16
    pub side1: Tensor<B, 4>,
}

impl<B: Backend> SegmentationOutput<B> {
    pub fn into_tuple(
        self,
    ) -> (
        Tensor<B, 4>,
        Tensor<B, 4>,
        Tensor<B, 4>,
        Tensor<B, 4>,
        Tensor<B, 4>,
    ) {
        (self.primary, self.side4, self.side3, self.side2, self.side1)
    }
}

/// Full-resolution classifier plus the four deep-supervision heads.
#[derive(Module, Debug)]
pub struct SegmentationHead<B: Backend> {
    classifier: ConvTranspose2d<B>,
    // side[0] taps H/16, side[3] taps H/2.
    side: Vec<ConvUnit<B>>,
    num_classes: usize,
}

impl<B: Backend> SegmentationHead<B> {
    /// `skip_widths` are the widths of the decoder skips coarsest first,
    /// `last_width` the width of the final decoder stage.
    pub fn new(
        device: &B::Device,
        num_classes: usize,
        skip_widths: [usize; 4],
        last_width: usize,
    ) -> Self {
        assert!(num_classes > 0, "class count must be positive");

        log::info!("SegmentationHead init: num_classes = {}", num_classes);

        Self {
            classifier: bilinear_deconv(device, last_width, num_classes, 4, 2, 1),
            side: skip_widths
                .iter()
                .map(|&width| conv_unit(device, width, num_classes, 1, 1, 0, false, false))
                .collect(),
            num_classes,
        }
    }

    pub fn forward(&self, decoded: DecoderOutput<B>) -> SegmentationOutput<B> {
        let [skip1, skip2, skip3, skip4] = decoded.skips;

        SegmentationOutput {
            primary: self.classifier.forward(decoded.last),
            side4: self.side[3].forward(skip4),
            side3: self.side[2].forward(skip3),
            side2: self.side[1].forward(skip2),
            side1: self.side[0].forward(skip1),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
