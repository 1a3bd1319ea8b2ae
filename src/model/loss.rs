use super::head::SegmentationOutput;
use super::target::TargetPyramid;
use burn::prelude::*;
use burn::tensor::activation::log_softmax;

/// Softmax cross entropy along the class axis.
///
/// `logits` is [B, C, H, W], `labels` is [B, 1, H, W] with class ids in
/// `[0, C)`. Returns the per-sample mean over pixels, summed over the batch.
pub fn pixel_cross_entropy<B: Backend>(
    logits: Tensor<B, 4>,
    labels: Tensor<B, 4, Int>,
) -> Tensor<B, 1> {
    let [batch, _, height, width] = logits.dims();
    let nll = log_softmax(logits, 1).gather(1, labels).neg(); // [B, 1, H, W]

    nll.reshape([batch, height * width]).mean_dim(1).sum()
}

/// Deep-supervision loss: cross entropy at the primary and every side
/// output, combined by a weighted sum.
#[derive(Debug, Clone)]
pub struct SegmentationLoss {
    /// Primary, side4 (H/2), side3, side2, side1 (H/16).
    weights: [f32; 5],
}

impl Default for SegmentationLoss {
    fn default() -> Self {
        Self::new([1.0; 5])
    }
}

impl SegmentationLoss {
    pub fn new(weights: [f32; 5]) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> [f32; 5] {
        self.weights
    }

    /// Per-scale terms, primary first.
    pub fn terms<B: Backend>(
        &self,
        output: SegmentationOutput<B>,
        targets: TargetPyramid<B>,
    ) -> [Tensor<B, 1>; 5] {
        let (pred, pred4, pred3, pred2, pred1) = output.into_tuple();
        let (label, label4, label3, label2, label1) = targets.into_tuple();

        [
            pixel_cross_entropy(pred, label),
            pixel_cross_entropy(pred4, label4),
            pixel_cross_entropy(pred3, label3),
            pixel_cross_entropy(pred2, label2),
            pixel_cross_entropy(pred1, label1),
        ]
    }

    /// Weighted sum of the five terms, a single-element tensor.
    pub fn compute<B: Backend>(
        &self,
        output: SegmentationOutput<B>,
        targets: TargetPyramid<B>,
    ) -> Tensor<B, 1> {
        let terms = self.terms(output, targets);
        log::debug!(
            "segmentation loss terms: {:?}",
            terms
                .iter()
                .map(|t| t.clone().into_scalar().elem::<f32>())
                .collect::<Vec<_>>()
        );

        let [t0, t1, t2, t3, t4] = terms;
        let [w0, w1, w2, w3, w4] = self.weights;
        t0 * w0 + t1 * w1 + t2 * w2 + t3 * w3 + t4 * w4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    /// Two-class logits where every pixel puts `correct` on class 0.
    fn two_class_loss(correct: f32) -> f32 {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 4>::cat(
            vec![
                Tensor::full([1, 1, 4, 4], correct, &device),
                Tensor::zeros([1, 1, 4, 4], &device),
            ],
            1,
        );
        let labels = Tensor::<TestBackend, 4, Int>::zeros([1, 1, 4, 4], &device);
        pixel_cross_entropy(logits, labels).into_scalar().elem::<f32>()
    }

    #[test]
    fn uniform_prediction_costs_log_class_count() {
        let loss = two_class_loss(0.0);
        assert!((loss - std::f32::consts::LN_2).abs() < 1e-5, "{loss}");
    }

    #[test]
    fn loss_grows_as_correct_mass_shrinks() {
        let losses: Vec<f32> = [4.0, 2.0, 0.0, -2.0, -4.0]
            .into_iter()
            .map(two_class_loss)
            .collect();
        assert!(losses.iter().all(|&l| l >= 0.0));
        assert!(losses.windows(2).all(|pair| pair[0] < pair[1]), "{losses:?}");
    }

    #[test]
    fn batch_terms_are_summed_per_sample_means() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 4>::zeros([3, 4, 2, 2], &device);
        let labels = Tensor::<TestBackend, 4, Int>::zeros([3, 1, 2, 2], &device);
        let loss = pixel_cross_entropy(logits, labels).into_scalar().elem::<f32>();
        assert!((loss - 3.0 * 4.0f32.ln()).abs() < 1e-5, "{loss}");
    }

    #[test]
    fn combined_loss_is_non_negative_and_weighted() {
        let device = Default::default();
        let logits = |size: usize| {
            let normal = Distribution::Normal(0.0, 1.0);
            Tensor::<TestBackend, 4>::random([2, 3, size, size], normal, &device)
        };
        let labels = |size: usize| Tensor::<TestBackend, 4, Int>::ones([2, 1, size, size], &device);
        let output = SegmentationOutput {
            primary: logits(32),
            side4: logits(16),
            side3: logits(8),
            side2: logits(4),
            side1: logits(2),
        };
        let targets = TargetPyramid {
            full: labels(32),
            l4: labels(16),
            l3: labels(8),
            l2: labels(4),
            l1: labels(2),
        };

        let loss = SegmentationLoss::default();
        let terms: Vec<f32> = loss
            .terms(output.clone(), targets.clone())
            .into_iter()
            .map(|t| t.into_scalar().elem::<f32>())
            .collect();
        assert!(terms.iter().all(|&t| t >= 0.0));

        let total = loss.compute(output.clone(), targets.clone()).into_scalar().elem::<f32>();
        assert!((total - terms.iter().sum::<f32>()).abs() < 1e-4);

        let primary_only = SegmentationLoss::new([1.0, 0.0, 0.0, 0.0, 0.0])
            .compute(output, targets)
            .into_scalar()
            .elem::<f32>();
        assert!((primary_only - terms[0]).abs() < 1e-5);
    }
}
