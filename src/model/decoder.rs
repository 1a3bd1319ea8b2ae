use crate::model::blocks::{conv_unit, decoder_input_width, decoder_stage, ConvUnit, Stage};
use crate::model::encoder::FusedFeatures;
use burn::prelude::*;

/// Decoder activations needed downstream.
#[derive(Debug, Clone)]
pub struct DecoderOutput<B: Backend> {
    /// `trans_k + agent` sums feeding stages 2..5, coarsest first:
    /// H/16, H/8, H/4, H/2. These are also the side-output taps.
    pub skips: [Tensor<B, 4>; 4],
    /// Output of the last stage (H/2).
    pub last: Tensor<B, 4>,
}

/// Agent projections and the five residual decoder stages.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    // agents[k] projects encoder level k (0 = stem).
    agents: Vec<ConvUnit<B>>,
    stages: Vec<Stage<B>>,
}

impl<B: Backend> Decoder<B> {
    /// `encoder_widths` lists the fused encoder widths shallowest first
    /// (stem, stage 1..4).
    ///
    /// # Panics
    ///
    /// If consecutive decoder widths neither match nor halve.
    pub fn new(
        device: &B::Device,
        encoder_widths: [usize; 5],
        channels: [usize; 5],
        units: [usize; 5],
    ) -> Self {
        let mut stages = Vec::with_capacity(5);
        let mut inputs = [0usize; 5];
        for k in 0..5 {
            let preserve = if k == 0 {
                false
            } else if channels[k - 1] == channels[k] {
                true
            } else {
                assert_eq!(
                    channels[k - 1],
                    channels[k] << 1,
                    "decoder width {} cannot follow {}",
                    channels[k],
                    channels[k - 1]
                );
                false
            };
            inputs[k] = decoder_input_width(channels[k], preserve);
            stages.push(decoder_stage(device, channels[k], units[k], preserve, k < 4));
        }

        // Stage k consumes encoder level 4 - k.
        let agents = (0..5)
            .map(|level| {
                let (from, to) = (encoder_widths[level], inputs[4 - level]);
                conv_unit(device, from, to, 1, 1, 0, true, true)
            })
            .collect();

        Self { agents, stages }
    }

    fn agent(&self, level: usize, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.agents[level].forward(x)
    }

    pub fn forward(&self, features: FusedFeatures<B>) -> DecoderOutput<B> {
        let [f0, f1, f2, f3, f4] = features.levels;

        let trans1 = self.stages[0].forward(self.agent(4, f4));
        let skip1 = trans1 + self.agent(3, f3); // H/16

        let trans2 = self.stages[1].forward(skip1.clone());
        let skip2 = trans2 + self.agent(2, f2); // H/8

        let trans3 = self.stages[2].forward(skip2.clone());
        let skip3 = trans3 + self.agent(1, f1); // H/4

        let trans4 = self.stages[3].forward(skip3.clone());
        let skip4 = trans4 + self.agent(0, f0); // H/2

        let last = self.stages[4].forward(skip4.clone());

        DecoderOutput {
            skips: [skip1, skip2, skip3, skip4],
            last,
        }
    }
}
