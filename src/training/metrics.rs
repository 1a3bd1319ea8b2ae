use crate::error::{Error, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    MeanIoU,
    PixelAccuracy,
    MeanPixelAccuracy,
    FrequencyWeightedIoU,
}

impl MetricKind {
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::MeanIoU => "mIoU",
            MetricKind::PixelAccuracy => "pixel_accuracy",
            MetricKind::MeanPixelAccuracy => "mean_pixel_accuracy",
            MetricKind::FrequencyWeightedIoU => "fw_iou",
        }
    }
}

/// Treatment of classes missing from an image's ground truth when averaging
/// per-class recall.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbsentClassPolicy {
    /// Leave them out of the mean.
    #[default]
    Skip,
    /// Count them as 0 and average over every class.
    Zero,
}

/// Per-class pixel counts for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTally {
    pub ground_truth: Vec<u64>,
    pub predicted: Vec<u64>,
    pub intersection: Vec<u64>,
    pub pixels: u64,
}

impl ClassTally {
    pub fn from_maps(labels: &[i64], predictions: &[i64], class_count: usize) -> Result<Self> {
        let mut tally = Self {
            ground_truth: vec![0; class_count],
            predicted: vec![0; class_count],
            intersection: vec![0; class_count],
            pixels: labels.len() as u64,
        };

        for (&label, &pred) in labels.iter().zip(predictions) {
            let label = class_index(label, class_count)?;
            let pred = class_index(pred, class_count)?;
            tally.ground_truth[label] += 1;
            tally.predicted[pred] += 1;
            if label == pred {
                tally.intersection[label] += 1;
            }
        }

        Ok(tally)
    }

    fn iou(&self, class: usize) -> f64 {
        let union = self.ground_truth[class] + self.predicted[class] - self.intersection[class];
        self.intersection[class] as f64 / union as f64
    }

    pub fn mean_iou(&self) -> f64 {
        let ious: Vec<f64> = (0..self.ground_truth.len())
            .filter(|&c| self.ground_truth[c] > 0 && self.predicted[c] > 0)
            .map(|c| self.iou(c))
            .collect();
        mean(&ious)
    }

    pub fn pixel_accuracy(&self) -> f64 {
        if self.pixels == 0 {
            return 0.0;
        }
        self.intersection.iter().sum::<u64>() as f64 / self.pixels as f64
    }

    pub fn mean_pixel_accuracy(&self, policy: AbsentClassPolicy) -> f64 {
        let recalls: Vec<f64> = (0..self.ground_truth.len())
            .filter(|&c| self.ground_truth[c] > 0)
            .map(|c| self.intersection[c] as f64 / self.ground_truth[c] as f64)
            .collect();

        match policy {
            AbsentClassPolicy::Skip => mean(&recalls),
            AbsentClassPolicy::Zero if self.ground_truth.is_empty() => 0.0,
            AbsentClassPolicy::Zero => recalls.iter().sum::<f64>() / self.ground_truth.len() as f64,
        }
    }

    pub fn frequency_weighted_iou(&self) -> f64 {
        if self.pixels == 0 {
            return 0.0;
        }
        (0..self.ground_truth.len())
            .filter(|&c| self.ground_truth[c] > 0)
            .map(|c| self.ground_truth[c] as f64 / self.pixels as f64 * self.iou(c))
            .sum()
    }
}

fn class_index(value: i64, class_count: usize) -> Result<usize> {
    if value < 0 || value as usize >= class_count {
        return Err(Error::ClassOutOfRange { value, class_count });
    }
    Ok(value as usize)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Running average of one per-image segmentation score.
#[derive(Debug, Clone)]
pub struct SegmentationMetric {
    kind: MetricKind,
    class_count: usize,
    policy: AbsentClassPolicy,
    sum: f64,
    count: usize,
}

impl SegmentationMetric {
    pub fn new(kind: MetricKind, class_count: usize) -> Self {
        Self {
            kind,
            class_count,
            policy: AbsentClassPolicy::default(),
            sum: 0.0,
            count: 0,
        }
    }

    pub fn with_policy(mut self, policy: AbsentClassPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }

    /// Accumulates one value per image of a [N, H, W] batch.
    pub fn update<B: Backend>(
        &mut self,
        labels: Tensor<B, 3, Int>,
        predictions: Tensor<B, 3, Int>,
    ) -> Result<()> {
        let label_dims = labels.dims();
        let pred_dims = predictions.dims();
        if label_dims != pred_dims {
            return Err(Error::ShapeMismatch {
                labels: label_dims.to_vec(),
                predictions: pred_dims.to_vec(),
            });
        }

        let labels = host_labels(labels)?;
        let predictions = host_labels(predictions)?;
        let [images, height, width] = label_dims;
        let pixels = height * width;

        // A failing image leaves the running sum unchanged.
        let scores = (0..images)
            .map(|image| {
                let range = image * pixels..(image + 1) * pixels;
                ClassTally::from_maps(&labels[range.clone()], &predictions[range], self.class_count)
                    .map(|tally| self.score(&tally))
            })
            .collect::<Result<Vec<f64>>>()?;

        self.sum += scores.iter().sum::<f64>();
        self.count += scores.len();
        Ok(())
    }

    /// Same as [`update`](Self::update) with [N, C, H, W] logits, argmaxed
    /// over the class axis.
    pub fn update_logits<B: Backend>(
        &mut self,
        labels: Tensor<B, 3, Int>,
        logits: Tensor<B, 4>,
    ) -> Result<()> {
        let predictions = logits.argmax(1).squeeze_dim::<3>(1);
        self.update(labels, predictions)
    }

    /// Metric name and the mean over all images seen since the last reset.
    pub fn get(&self) -> (&'static str, f64) {
        let value = if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        };
        (self.kind.name(), value)
    }

    fn score(&self, tally: &ClassTally) -> f64 {
        match self.kind {
            MetricKind::MeanIoU => tally.mean_iou(),
            MetricKind::PixelAccuracy => tally.pixel_accuracy(),
            MetricKind::MeanPixelAccuracy => tally.mean_pixel_accuracy(self.policy),
            MetricKind::FrequencyWeightedIoU => tally.frequency_weighted_iou(),
        }
    }
}

fn host_labels<B: Backend>(tensor: Tensor<B, 3, Int>) -> Result<Vec<i64>> {
    tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| Error::TensorData(format!("{e:?}")))
}
