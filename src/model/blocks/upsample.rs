use burn::module::Param;
use burn::nn::conv::{ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig};
use burn::prelude::*;
use burn::tensor::activation;

/// 1-D bilinear interpolation profile of a `kernel_size` wide upsampling kernel.
pub fn bilinear_profile(kernel_size: usize) -> Vec<f32> {
    let f = kernel_size.div_ceil(2) as f32;
    let c = (2.0 * f - 1.0 - (f % 2.0)) / (2.0 * f);
    (0..kernel_size)
        .map(|i| 1.0 - (i as f32 / f - c).abs())
        .collect()
}

/// Transposed-convolution weights `[in, out, k, k]` where every channel pair
/// carries the same bilinear kernel.
pub fn bilinear_weight<B: Backend>(
    device: &B::Device,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
) -> Tensor<B, 4> {
    let profile = bilinear_profile(kernel_size);
    let kernel: Vec<f32> = profile
        .iter()
        .flat_map(|wy| profile.iter().map(move |wx| wy * wx))
        .collect();

    Tensor::<B, 1>::from_floats(kernel.as_slice(), device)
        .reshape([1, 1, kernel_size, kernel_size])
        .repeat_dim(0, in_channels)
        .repeat_dim(1, out_channels)
}

/// Transposed convolution without bias, initialized as bilinear upsampling.
pub fn bilinear_deconv<B: Backend>(
    device: &B::Device,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> ConvTranspose2d<B> {
    let kernel = [kernel_size, kernel_size];
    let mut deconv = ConvTranspose2dConfig::new([in_channels, out_channels], kernel)
        .with_stride([stride, stride])
        .with_padding([padding, padding])
        .with_bias(false)
        .init(device);
    let weight = bilinear_weight(device, in_channels, out_channels, kernel_size);
    deconv.weight = Param::from_tensor(weight);
    deconv
}

/// Bilinear transposed convolution, batch norm and an optional ReLU.
#[derive(Module, Debug)]
pub struct UpsampleUnit<B: Backend> {
    deconv: ConvTranspose2d<B>,
    bn: BatchNorm<B>,
    relu: bool,
}

impl<B: Backend> UpsampleUnit<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        use_activation: bool,
    ) -> Self {
        Self {
            deconv: bilinear_deconv(
                device,
                in_channels,
                out_channels,
                kernel_size,
                stride,
                padding,
            ),
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: use_activation,
        }
    }

    /// [B, C_in, H, W] -> [B, C_out, H*stride, W*stride] with the default geometry.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.deconv.forward(x);
        let x = self.bn.forward(x);
        if self.relu {
            activation::relu(x)
        } else {
            x
        }
    }
}

/// `upsample_unit(out, kernel=4, stride=2, pad=1, use_activation)`.
pub fn upsample_unit<B: Backend>(
    device: &B::Device,
    in_channels: usize,
    out_channels: usize,
    use_activation: bool,
) -> UpsampleUnit<B> {
    UpsampleUnit::new(device, in_channels, out_channels, 4, 2, 1, use_activation)
}
