use burn::prelude::*;

/// One batch as produced by an RGB-D loader.
#[derive(Debug, Clone)]
pub struct RgbdBatch<B: Backend> {
    /// [B, 4, H, W]: RGB in channels 0..3, depth in channel 3.
    pub data: Tensor<B, 4>,
    /// [B, H, W] class ids.
    pub labels: Tensor<B, 3, Int>,
}

impl<B: Backend> RgbdBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.data.dims()[0]
    }
}

/// Splits [B, 4, H, W] into RGB [B, 3, H, W] and depth [B, 1, H, W].
pub fn split_rgbd<B: Backend>(data: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
    let [batch, channels, height, width] = data.dims();
    assert_eq!(channels, 4, "expected RGB-D input with 4 channels, got {channels}");

    let rgb = data.clone().slice([0..batch, 0..3, 0..height, 0..width]);
    let depth = data.slice([0..batch, 3..4, 0..height, 0..width]);
    (rgb, depth)
}

/// Anything that can be iterated once per epoch.
pub trait RgbdDataset<B: Backend> {
    fn batches(&self, device: &B::Device) -> Box<dyn Iterator<Item = RgbdBatch<B>> + '_>;
}

impl<B: Backend> RgbdDataset<B> for Vec<RgbdBatch<B>> {
    fn batches(&self, device: &B::Device) -> Box<dyn Iterator<Item = RgbdBatch<B>> + '_> {
        let device = device.clone();
        Box::new(self.iter().map(move |batch| RgbdBatch {
            data: batch.data.clone().to_device(&device),
            labels: batch.labels.clone().to_device(&device),
        }))
    }
}
