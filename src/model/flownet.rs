//! FlowNetS-style optical flow estimation.
//!
//! Two RGB frames stacked along the channel axis go through a contracting
//! convolution tower; the expanding part predicts a 2-channel flow at every
//! level, upsamples it and concatenates it with the deconvolved features and
//! the matching contracting features before refining at the next level.

use super::blocks::bilinear_deconv;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::leaky_relu;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};

const LEAKY_SLOPE: f64 = 0.1;

#[derive(Module, Debug)]
pub struct FlowConv<B: Backend> {
    conv: Conv2d<B>,
    bn: Option<BatchNorm<B>>,
}

impl<B: Backend> FlowConv<B> {
    fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        batch_norm: bool,
    ) -> Self {
        let padding = (kernel_size - 1) / 2;
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_bias(!batch_norm)
                .init(device),
            bn: batch_norm.then(|| BatchNormConfig::new(out_channels).init(device)),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = match &self.bn {
            Some(bn) => bn.forward(x),
            None => x,
        };
        leaky_relu(x, LEAKY_SLOPE)
    }
}

/// Feature deconvolution: 4x4/2 transposed convolution and leaky ReLU.
#[derive(Module, Debug)]
pub struct FlowDeconv<B: Backend> {
    deconv: ConvTranspose2d<B>,
}

impl<B: Backend> FlowDeconv<B> {
    fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        Self {
            deconv: ConvTranspose2dConfig::new([in_channels, out_channels], [4, 4])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .with_bias(false)
                .init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        leaky_relu(self.deconv.forward(x), LEAKY_SLOPE)
    }
}

fn predict_flow<B: Backend>(device: &B::Device, in_channels: usize) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, 2], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

#[derive(Config, Debug)]
pub struct FlowNetSConfig {
    /// Width of the first convolution; deeper layers are multiples of it.
    #[config(default = 64)]
    pub base_channels: usize,
    #[config(default = true)]
    pub batch_norm: bool,
}

impl FlowNetSConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FlowNetS<B> {
        let b = self.base_channels;
        let bn = self.batch_norm;

        log::info!("FlowNetS init: base_channels={} batch_norm={}", b, bn);

        FlowNetS {
            conv1: FlowConv::new(device, 6, b, 7, 2, bn),
            conv2: FlowConv::new(device, b, 2 * b, 5, 2, bn),
            conv3: FlowConv::new(device, 2 * b, 4 * b, 5, 2, bn),
            conv3_1: FlowConv::new(device, 4 * b, 4 * b, 3, 1, bn),
            conv4: FlowConv::new(device, 4 * b, 8 * b, 3, 2, bn),
            conv4_1: FlowConv::new(device, 8 * b, 8 * b, 3, 1, bn),
            conv5: FlowConv::new(device, 8 * b, 16 * b, 3, 2, bn),
            conv5_1: FlowConv::new(device, 16 * b, 16 * b, 3, 1, bn),

            predict5: predict_flow(device, 16 * b),
            upsample5: bilinear_deconv(device, 2, 2, 4, 2, 1),
            deconv4: FlowDeconv::new(device, 16 * b, 4 * b),

            predict4: predict_flow(device, 12 * b + 2),
            upsample4: bilinear_deconv(device, 2, 2, 4, 2, 1),
            deconv3: FlowDeconv::new(device, 12 * b + 2, 2 * b),

            predict3: predict_flow(device, 6 * b + 2),
            upsample3: bilinear_deconv(device, 2, 2, 4, 2, 1),
            deconv2: FlowDeconv::new(device, 6 * b + 2, b),

            predict2: predict_flow(device, 3 * b + 2),
        }
    }
}

/// Flow predictions, finest first.
#[derive(Debug, Clone)]
pub struct FlowOutput<B: Backend> {
    /// H/4
    pub flow2: Tensor<B, 4>,
    /// H/8
    pub flow3: Tensor<B, 4>,
    /// H/16
    pub flow4: Tensor<B, 4>,
    /// H/32
    pub flow5: Tensor<B, 4>,
}

impl<B: Backend> FlowOutput<B> {
    pub fn into_array(self) -> [Tensor<B, 4>; 4] {
        [self.flow2, self.flow3, self.flow4, self.flow5]
    }
}

#[derive(Module, Debug)]
pub struct FlowNetS<B: Backend> {
    conv1: FlowConv<B>,
    conv2: FlowConv<B>,
    conv3: FlowConv<B>,
    conv3_1: FlowConv<B>,
    conv4: FlowConv<B>,
    conv4_1: FlowConv<B>,
    conv5: FlowConv<B>,
    conv5_1: FlowConv<B>,

    predict5: Conv2d<B>,
    upsample5: ConvTranspose2d<B>,
    deconv4: FlowDeconv<B>,

    predict4: Conv2d<B>,
    upsample4: ConvTranspose2d<B>,
    deconv3: FlowDeconv<B>,

    predict3: Conv2d<B>,
    upsample3: ConvTranspose2d<B>,
    deconv2: FlowDeconv<B>,

    predict2: Conv2d<B>,
}

impl<B: Backend> FlowNetS<B> {
    pub fn new(device: &B::Device) -> Self {
        FlowNetSConfig::new().init(device)
    }

    /// `frames` is [B, 6, H, W] with H and W divisible by 32.
    pub fn forward(&self, frames: Tensor<B, 4>) -> FlowOutput<B> {
        let out_conv2 = self.conv2.forward(self.conv1.forward(frames)); // H/4
        let out_conv3 = self.conv3_1.forward(self.conv3.forward(out_conv2.clone())); // H/8
        let out_conv4 = self.conv4_1.forward(self.conv4.forward(out_conv3.clone())); // H/16
        let out_conv5 = self.conv5_1.forward(self.conv5.forward(out_conv4.clone())); // H/32

        let flow5 = self.predict5.forward(out_conv5.clone());
        let concat4 = Tensor::cat(
            vec![
                out_conv4,
                self.deconv4.forward(out_conv5),
                self.upsample5.forward(flow5.clone()),
            ],
            1,
        );

        let flow4 = self.predict4.forward(concat4.clone());
        let concat3 = Tensor::cat(
            vec![
                out_conv3,
                self.deconv3.forward(concat4),
                self.upsample4.forward(flow4.clone()),
            ],
            1,
        );

        let flow3 = self.predict3.forward(concat3.clone());
        let concat2 = Tensor::cat(
            vec![
                out_conv2,
                self.deconv2.forward(concat3),
                self.upsample3.forward(flow3.clone()),
            ],
            1,
        );

        let flow2 = self.predict2.forward(concat2);

        FlowOutput {
            flow2,
            flow3,
            flow4,
            flow5,
        }
    }
}

/// Resizes a [B, 2, H, W] flow field to `size`, scaling the vectors with the
/// resize factor of their axis.
pub fn resize_flow<B: Backend>(flow: Tensor<B, 4>, size: [usize; 2]) -> Tensor<B, 4> {
    let [_, _, height, width] = flow.dims();
    let device = flow.device();
    let scale = Tensor::<B, 1>::from_floats(
        [
            size[1] as f32 / width as f32,
            size[0] as f32 / height as f32,
        ],
        &device,
    )
    .reshape([1, 2, 1, 1]);

    interpolate(flow, size, InterpolateOptions::new(InterpolateMode::Bilinear)) * scale
}

/// Mean end-point error between two flow fields of the same shape.
pub fn end_point_error<B: Backend>(pred: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    let diff = pred - target;
    (diff.clone() * diff).sum_dim(1).add_scalar(1e-8).sqrt().mean()
}

/// Weighted end-point error over the four flow scales.
#[derive(Debug, Clone)]
pub struct MultiScaleEpe {
    /// Finest first.
    weights: [f32; 4],
}

impl Default for MultiScaleEpe {
    fn default() -> Self {
        Self::new([0.32, 0.08, 0.02, 0.01])
    }
}

impl MultiScaleEpe {
    pub fn new(weights: [f32; 4]) -> Self {
        Self { weights }
    }

    /// `target` is the full-resolution [B, 2, H, W] ground-truth flow.
    pub fn compute<B: Backend>(&self, output: FlowOutput<B>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        let target = target.detach();
        let [first, rest @ ..] = output.into_array();

        let scale_loss = |pred: Tensor<B, 4>| {
            let [_, _, h, w] = pred.dims();
            end_point_error(pred, resize_flow(target.clone(), [h, w]))
        };

        rest.into_iter()
            .zip(&self.weights[1..])
            .fold(scale_loss(first) * self.weights[0], |acc, (pred, &weight)| {
                acc + scale_loss(pred) * weight
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn four_scales_at_quarter_to_thirty_second_resolution() {
        let device = Default::default();
        let net = FlowNetSConfig::new()
            .with_base_channels(4)
            .init::<TestBackend>(&device);
        let frames = Tensor::random([1, 6, 64, 96], Distribution::Normal(0.0, 1.0), &device);

        let [flow2, flow3, flow4, flow5] = net.forward(frames).into_array();
        assert_eq!(flow2.dims(), [1, 2, 16, 24]);
        assert_eq!(flow3.dims(), [1, 2, 8, 12]);
        assert_eq!(flow4.dims(), [1, 2, 4, 6]);
        assert_eq!(flow5.dims(), [1, 2, 2, 3]);
    }

    #[test]
    fn resize_scales_vectors_per_axis() {
        let device = Default::default();
        let u = Tensor::<TestBackend, 4>::full([1, 1, 8, 16], 4.0, &device);
        let v = Tensor::<TestBackend, 4>::full([1, 1, 8, 16], 2.0, &device);
        let flow = Tensor::cat(vec![u, v], 1);

        let resized = resize_flow(flow, [4, 4]);
        let values: Vec<f32> = resized.into_data().to_vec().unwrap();
        assert!(values[..16].iter().all(|&x| (x - 1.0).abs() < 1e-5));
        assert!(values[16..].iter().all(|&x| (x - 1.0).abs() < 1e-5));
    }

    #[test]
    fn epe_vanishes_for_exact_prediction() {
        let device = Default::default();
        let normal = Distribution::Normal(0.0, 1.0);
        let target = Tensor::<TestBackend, 4>::random([2, 2, 64, 64], normal, &device);
        let output = FlowOutput {
            flow2: resize_flow(target.clone(), [16, 16]),
            flow3: resize_flow(target.clone(), [8, 8]),
            flow4: resize_flow(target.clone(), [4, 4]),
            flow5: resize_flow(target.clone(), [2, 2]),
        };

        let exact = MultiScaleEpe::default()
            .compute(output.clone(), target.clone())
            .into_scalar()
            .elem::<f32>();
        assert!(exact < 1e-3, "{exact}");

        let shifted = FlowOutput {
            flow2: output.flow2 + 1.0,
            ..output
        };
        let off = MultiScaleEpe::default()
            .compute(shifted, target)
            .into_scalar()
            .elem::<f32>();
        assert!(off > 0.3, "{off}");
    }
}
