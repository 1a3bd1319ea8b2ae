use super::batch::{RgbdBatch, RgbdDataset};
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::cell::Cell;

/// Procedurally generated RGB-D scenes.
///
/// Each sample is a set of class bands with a class-specific colour and a
/// class-specific depth plane, plus uniform noise. Sample `i` is generated
/// from `seed + i`, so two loaders over the same dataset agree. With shuffling
/// on, each call to `loader` starts a new epoch whose order is drawn from the
/// seed and the epoch number.
#[derive(Debug, Clone)]
pub struct SyntheticRgbd {
    pub len: usize,
    pub height: usize,
    pub width: usize,
    pub num_classes: usize,
    pub batch_size: usize,
    pub seed: u64,
    pub shuffle: bool,
    pub noise: f32,
    epochs_served: Cell<u64>,
}

impl SyntheticRgbd {
    pub fn new(
        len: usize,
        height: usize,
        width: usize,
        num_classes: usize,
        batch_size: usize,
    ) -> Self {
        assert!(num_classes > 0, "at least one class is required");
        assert!(batch_size > 0, "batch size must be positive");
        Self {
            len,
            height,
            width,
            num_classes,
            batch_size,
            seed: 42,
            shuffle: false,
            noise: 0.05,
            epochs_served: Cell::new(0),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of batches per epoch; the last one may be short.
    pub fn num_batches(&self) -> usize {
        self.len.div_ceil(self.batch_size)
    }

    /// Generates one sample as host data: (4*H*W floats in CHW order, H*W labels).
    pub fn sample(&self, index: usize) -> (Vec<f32>, Vec<i64>) {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(index as u64));
        let pixels = self.height * self.width;

        let vertical = rng.gen_bool(0.5);
        let band = rng.gen_range(2..=8usize);
        let offset = rng.gen_range(0..self.num_classes.max(1) * band);

        let labels: Vec<i64> = (0..pixels)
            .map(|p| {
                let (y, x) = (p / self.width, p % self.width);
                let coord = if vertical { x } else { y };
                (((coord + offset) / band) % self.num_classes) as i64
            })
            .collect();

        let mut data = vec![0.0f32; 4 * pixels];
        for (p, &label) in labels.iter().enumerate() {
            let [r, g, b, d] = class_signature(label as usize, self.num_classes);
            for (channel, value) in [r, g, b, d].into_iter().enumerate() {
                let jitter = if self.noise > 0.0 {
                    rng.gen_range(-self.noise..self.noise)
                } else {
                    0.0
                };
                data[channel * pixels + p] = value + jitter;
            }
        }

        (data, labels)
    }

    /// Loader for the next epoch.
    pub fn loader<B: Backend>(&self, device: &B::Device) -> SyntheticLoader<B> {
        let epoch = self.epochs_served.get();
        self.epochs_served.set(epoch + 1);
        self.loader_for_epoch(epoch, device)
    }

    pub fn loader_for_epoch<B: Backend>(
        &self,
        epoch: u64,
        device: &B::Device,
    ) -> SyntheticLoader<B> {
        SyntheticLoader::new(self.clone(), epoch, device.clone())
    }
}

/// Colour and depth in [0, 1] for a class.
fn class_signature(class: usize, num_classes: usize) -> [f32; 4] {
    let hash = (class as u32).wrapping_mul(2_654_435_761);
    let channel = |shift: u32| ((hash >> shift) & 0xff) as f32 / 255.0;
    let depth = (class + 1) as f32 / num_classes as f32;
    [channel(0), channel(8), channel(16), depth]
}

impl<B: Backend> RgbdDataset<B> for SyntheticRgbd {
    fn batches(&self, device: &B::Device) -> Box<dyn Iterator<Item = RgbdBatch<B>> + '_> {
        Box::new(self.loader::<B>(device))
    }
}

pub struct SyntheticLoader<B: Backend> {
    dataset: SyntheticRgbd,
    device: B::Device,
    indices: Vec<usize>,
    current_idx: usize,
}

impl<B: Backend> SyntheticLoader<B> {
    pub fn new(dataset: SyntheticRgbd, epoch: u64, device: B::Device) -> Self {
        let mut indices: Vec<usize> = (0..dataset.len).collect();
        if dataset.shuffle {
            let seed = dataset.seed ^ epoch.wrapping_mul(0x9e37_79b9_7f4a_7c15);
            let mut rng = StdRng::seed_from_u64(seed);
            indices.shuffle(&mut rng);
        }

        Self {
            dataset,
            device,
            indices,
            current_idx: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.dataset.num_batches()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }
}

impl<B: Backend> Iterator for SyntheticLoader<B> {
    type Item = RgbdBatch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx >= self.indices.len() {
            return None;
        }

        let end_idx = (self.current_idx + self.dataset.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.current_idx..end_idx];
        let actual_batch_size = batch_indices.len();

        let mut data_vec = Vec::new();
        let mut label_vec = Vec::new();
        for &idx in batch_indices {
            let (data, labels) = self.dataset.sample(idx);
            data_vec.extend(data);
            label_vec.extend(labels);
        }

        let (h, w) = (self.dataset.height, self.dataset.width);
        let data = Tensor::<B, 4>::from_data(
            TensorData::new(data_vec, [actual_batch_size, 4, h, w]),
            &self.device,
        );
        let labels = Tensor::<B, 3, Int>::from_data(
            TensorData::new(label_vec, [actual_batch_size, h, w]),
            &self.device,
        );

        self.current_idx = end_idx;
        Some(RgbdBatch { data, labels })
    }
}
