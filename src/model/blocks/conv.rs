use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation;

/// Convolution (no bias) followed by optional batch norm and optional ReLU.
#[derive(Module, Debug)]
pub struct ConvUnit<B: Backend> {
    conv: Conv2d<B>,
    bn: Option<BatchNorm<B>>,
    relu: bool,
}

impl<B: Backend> ConvUnit<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        use_norm: bool,
        use_activation: bool,
    ) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_bias(false)
                .init(device),
            bn: use_norm.then(|| BatchNormConfig::new(out_channels).init(device)),
            relu: use_activation,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = match &self.bn {
            Some(bn) => bn.forward(x),
            None => x,
        };
        if self.relu {
            activation::relu(x)
        } else {
            x
        }
    }
}

/// `conv_unit(out, kernel, stride, pad, use_norm, use_activation)` with the
/// input width spelled out.
#[allow(clippy::too_many_arguments)]
pub fn conv_unit<B: Backend>(
    device: &B::Device,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    use_norm: bool,
    use_activation: bool,
) -> ConvUnit<B> {
    ConvUnit::new(
        device,
        in_channels,
        out_channels,
        kernel_size,
        stride,
        padding,
        use_norm,
        use_activation,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn stride_two_halves_resolution() {
        let device = Default::default();
        let unit = conv_unit::<TestBackend>(&device, 3, 8, 7, 2, 3, true, true);
        let out = unit.forward(Tensor::ones([1, 3, 32, 32], &device));
        assert_eq!(out.dims(), [1, 8, 16, 16]);
    }

    #[test]
    fn relu_output_is_non_negative() {
        let device = Default::default();
        let unit = conv_unit::<TestBackend>(&device, 4, 4, 3, 1, 1, false, true);
        let normal = burn::tensor::Distribution::Normal(0.0, 1.0);
        let input = Tensor::random([2, 4, 8, 8], normal, &device);
        let min = unit.forward(input).min().into_scalar().elem::<f32>();
        assert!(min >= 0.0);
    }
}
