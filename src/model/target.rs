use burn::prelude::*;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use serde::{Deserialize, Serialize};

/// How label maps are resampled to the side-output resolutions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelResample {
    /// Bilinear resampling rounded back to class ids.
    #[default]
    Bilinear,
    Nearest,
}

impl From<LabelResample> for InterpolateMode {
    fn from(mode: LabelResample) -> Self {
        match mode {
            LabelResample::Bilinear => InterpolateMode::Bilinear,
            LabelResample::Nearest => InterpolateMode::Nearest,
        }
    }
}

/// Ground truth at the primary and the four side-output resolutions.
#[derive(Debug, Clone)]
pub struct TargetPyramid<B: Backend> {
    /// [B, 1, H, W]
    pub full: Tensor<B, 4, Int>,
    /// H/2
    pub l4: Tensor<B, 4, Int>,
    /// H/4
    pub l3: Tensor<B, 4, Int>,
    /// H/8
    pub l2: Tensor<B, 4, Int>,
    /// H/16
    pub l1: Tensor<B, 4, Int>,
}

impl<B: Backend> TargetPyramid<B> {
    pub fn into_tuple(
        self,
    ) -> (
        Tensor<B, 4, Int>,
        Tensor<B, 4, Int>,
        Tensor<B, 4, Int>,
        Tensor<B, 4, Int>,
        Tensor<B, 4, Int>,
    ) {
        (self.full, self.l4, self.l3, self.l2, self.l1)
    }
}

/// Derives the label hierarchy from a [B, H, W] label map. Level `k` has
/// spatial size `(H >> k, W >> k)`.
///
/// Labels are not differentiable; the resampling happens on a detached copy.
/// Levels whose height or width floors to 0 are empty tensors.
pub fn downsample_targets<B: Backend>(
    labels: Tensor<B, 3, Int>,
    mode: LabelResample,
) -> TargetPyramid<B> {
    let [batch, height, width] = labels.dims();
    let device = labels.device();
    let full = labels.unsqueeze_dim::<4>(1);
    let as_float = full.clone().float().detach();

    let resize = |shift: usize| -> Tensor<B, 4, Int> {
        let size = [height >> shift, width >> shift];
        if size.contains(&0) {
            return Tensor::zeros([batch, 1, size[0], size[1]], &device);
        }
        interpolate(as_float.clone(), size, InterpolateOptions::new(mode.into()))
            .round()
            .int()
    };

    TargetPyramid {
        l4: resize(1),
        l3: resize(2),
        l2: resize(3),
        l1: resize(4),
        full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn pyramid_shapes_follow_floor_halving() {
        let device = Default::default();
        let labels = Tensor::<TestBackend, 3, Int>::zeros([2, 50, 70], &device);

        let (full, l4, l3, l2, l1) =
            downsample_targets(labels, LabelResample::Bilinear).into_tuple();
        assert_eq!(full.dims(), [2, 1, 50, 70]);
        assert_eq!(l4.dims(), [2, 1, 25, 35]);
        assert_eq!(l3.dims(), [2, 1, 12, 17]);
        assert_eq!(l2.dims(), [2, 1, 6, 8]);
        assert_eq!(l1.dims(), [2, 1, 3, 4]);
    }

    #[test]
    fn narrow_label_maps_get_empty_coarse_levels() {
        let device = Default::default();
        for mode in [LabelResample::Bilinear, LabelResample::Nearest] {
            let labels = Tensor::<TestBackend, 3, Int>::ones([1, 8, 40], &device);

            let (full, l4, l3, l2, l1) = downsample_targets(labels, mode).into_tuple();
            assert_eq!(full.dims(), [1, 1, 8, 40]);
            assert_eq!(l4.dims(), [1, 1, 4, 20]);
            assert_eq!(l3.dims(), [1, 1, 2, 10]);
            assert_eq!(l2.dims(), [1, 1, 1, 5]);
            assert_eq!(l1.dims(), [1, 1, 0, 2]);

            let values: Vec<i64> = l2.into_data().convert::<i64>().to_vec().unwrap();
            assert_eq!(values, vec![1; 5], "{mode:?}");
        }
    }

    #[test]
    fn constant_labels_survive_resampling() {
        let device = Default::default();
        for mode in [LabelResample::Bilinear, LabelResample::Nearest] {
            let labels = Tensor::<TestBackend, 3, Int>::full([1, 32, 32], 7, &device);
            let pyramid = downsample_targets(labels, mode);
            let values: Vec<i64> = pyramid.l1.into_data().convert::<i64>().to_vec().unwrap();
            assert!(values.iter().all(|&v| v == 7), "{mode:?}: {values:?}");
        }
    }

    #[test]
    fn resampled_ids_stay_within_label_range() {
        let device = Default::default();
        let data: Vec<i64> = (0..16 * 16).map(|i| ((i / 16) / 4) as i64).collect();
        let labels =
            Tensor::<TestBackend, 3, Int>::from_data(TensorData::new(data, [1, 16, 16]), &device);

        let pyramid = downsample_targets(labels, LabelResample::Bilinear);
        let values: Vec<i64> = pyramid.l4.into_data().convert::<i64>().to_vec().unwrap();
        assert!(values.iter().all(|v| (0..4).contains(v)));
    }
}
