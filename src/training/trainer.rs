use crate::data::RgbdDataset;
use crate::error::{Error, Result};
use crate::model::{downsample_targets, RgbdSegNet, RgbdSegNetConfig, SegmentationLoss};
use crate::training::metrics::{MetricKind, SegmentationMetric};
use crate::training::TrainingConfig;
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Scores of one evaluation pass, averaged over images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub mean_iou: f64,
    pub pixel_accuracy: f64,
    pub mean_pixel_accuracy: f64,
    pub frequency_weighted_iou: f64,
}

impl EvalMetrics {
    /// (mIoU, pixel accuracy, mean pixel accuracy)
    pub fn as_tuple(&self) -> (f64, f64, f64) {
        (self.mean_iou, self.pixel_accuracy, self.mean_pixel_accuracy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    /// Mean of the batch-size-scaled loss over the epoch's batches.
    pub train_loss: f32,
    pub batches: usize,
    pub eval: Option<EvalMetrics>,
}

/// Trains `model` on `train_data` for `config.epochs` epochs.
///
/// Each batch is split into RGB and depth, run forward, compared against the
/// down-sampled label hierarchy with the five-scale loss, and the loss divided
/// by `config.batch_size` is back-propagated before one optimizer step. A short
/// final batch is still divided by the configured size. When `eval_data` is
/// given, the primary output is scored at every epoch end.
pub fn train<B, O>(
    mut model: RgbdSegNet<B>,
    mut optimizer: O,
    train_data: &dyn RgbdDataset<B>,
    eval_data: Option<&dyn RgbdDataset<B::InnerBackend>>,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<(RgbdSegNet<B>, Vec<EpochSummary>)>
where
    B: AutodiffBackend,
    O: Optimizer<RgbdSegNet<B>, B>,
{
    config.validate()?;
    let loss_fn = SegmentationLoss::new(config.loss_weights);
    let mut history = Vec::with_capacity(config.epochs);

    log::info!(
        "training for {} epochs: classes={} batch_size={} lr={}",
        config.epochs,
        config.num_classes(),
        config.batch_size,
        config.learning_rate
    );

    let pb = ProgressBar::new(config.epochs as u64);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    for epoch in 1..=config.epochs {
        let epoch_start = Instant::now();

        let mut total_loss = 0.0;
        let mut count = 0;

        for (batch_idx, batch) in train_data.batches(device).enumerate() {
            let output = model.forward_rgbd(batch.data);
            let targets = downsample_targets(batch.labels, config.label_resample);

            let loss = loss_fn.compute(output, targets) / config.batch_size as f32;
            let loss_value = loss.clone().into_scalar().elem::<f32>();

            if !loss_value.is_finite() {
                log::warn!("non-finite loss at epoch {} batch {}, skipping", epoch, batch_idx + 1);
                continue;
            }

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(config.learning_rate, model, grads);

            total_loss += loss_value;
            count += 1;

            if logs_batch(batch_idx, config.log_period) {
                log::info!("epoch {} batch {}: loss={:.4}", epoch, batch_idx + 1, loss_value);
            }
        }

        let train_loss = if count > 0 { total_loss / count as f32 } else { 0.0 };

        let eval = match eval_data {
            Some(dataset) => {
                let metrics = evaluate(config.num_classes(), dataset, &model.valid(), device)?;
                log::info!(
                    "epoch {}: loss={:.4} mIoU={:.4} pixel_acc={:.4} mean_pixel_acc={:.4}",
                    epoch,
                    train_loss,
                    metrics.mean_iou,
                    metrics.pixel_accuracy,
                    metrics.mean_pixel_accuracy
                );
                Some(metrics)
            }
            None => {
                log::info!("epoch {} done: loss={:.4}", epoch, train_loss);
                None
            }
        };

        pb.set_message(format!("epoch {}: loss={:.4}", epoch, train_loss));
        pb.inc(1);

        if config.save_interval > 0 && epoch % config.save_interval == 0 {
            let name = format!("epoch_{epoch}");
            save_checkpoint(&model, &config.model, &config.save_dir, &name)?;
        }

        log::debug!("epoch time: {:.2}s", epoch_start.elapsed().as_secs_f32());
        history.push(EpochSummary {
            epoch,
            train_loss,
            batches: count,
            eval,
        });
    }

    save_checkpoint(&model, &config.model, &config.save_dir, "final")?;
    pb.finish_with_message("training completed");

    Ok((model, history))
}

/// Batches 0, period, 2 * period, ... are logged.
fn logs_batch(batch_idx: usize, log_period: usize) -> bool {
    log_period > 0 && batch_idx % log_period == 0
}

/// Scores the primary output of `model` over every batch of `dataset`.
pub fn evaluate<B: Backend>(
    class_count: usize,
    dataset: &dyn RgbdDataset<B>,
    model: &RgbdSegNet<B>,
    device: &B::Device,
) -> Result<EvalMetrics> {
    let mut metrics = [
        SegmentationMetric::new(MetricKind::MeanIoU, class_count),
        SegmentationMetric::new(MetricKind::PixelAccuracy, class_count),
        SegmentationMetric::new(MetricKind::MeanPixelAccuracy, class_count),
        SegmentationMetric::new(MetricKind::FrequencyWeightedIoU, class_count),
    ];
    metrics.iter_mut().for_each(SegmentationMetric::reset);

    for batch in dataset.batches(device) {
        let primary = model.forward_rgbd(batch.data).primary;
        let predictions = primary.argmax(1).squeeze_dim::<3>(1);
        for metric in metrics.iter_mut() {
            metric.update(batch.labels.clone(), predictions.clone())?;
        }
    }

    let [miou, pa, mpa, fwiou] = metrics.map(|metric| metric.get().1);
    Ok(EvalMetrics {
        mean_iou: miou,
        pixel_accuracy: pa,
        mean_pixel_accuracy: mpa,
        frequency_weighted_iou: fwiou,
    })
}

/// Writes `<save_dir>/<name>/model.bin` and `<save_dir>/<name>/config.json`.
pub fn save_checkpoint<B: Backend>(
    model: &RgbdSegNet<B>,
    network: &RgbdSegNetConfig,
    save_dir: impl AsRef<Path>,
    name: &str,
) -> Result<PathBuf> {
    let checkpoint_dir = save_dir.as_ref().join(name);
    std::fs::create_dir_all(&checkpoint_dir)?;

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(model.clone().into_record(), checkpoint_dir.join("model"))
        .map_err(|e| Error::Record(format!("failed to save model: {e:?}")))?;

    let config_json = serde_json::json!({
        "model_type": "RgbdSegNet",
        "num_classes": network.num_classes,
        "network": network,
        "checkpoint_name": name,
    });
    std::fs::write(
        checkpoint_dir.join("config.json"),
        serde_json::to_string_pretty(&config_json)?,
    )?;

    log::info!("checkpoint saved to {}", checkpoint_dir.display());
    Ok(checkpoint_dir)
}

/// Rebuilds the network described by `config.json` and loads its weights.
pub fn load_checkpoint<B: Backend>(
    checkpoint_dir: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(RgbdSegNet<B>, RgbdSegNetConfig)> {
    let checkpoint_dir = checkpoint_dir.as_ref();
    let content = std::fs::read_to_string(checkpoint_dir.join("config.json"))?;
    let mut sidecar: serde_json::Value = serde_json::from_str(&content)?;
    let network = sidecar
        .get_mut("network")
        .map(serde_json::Value::take)
        .ok_or_else(|| Error::Config("checkpoint config.json has no `network` entry".into()))?;
    let network: RgbdSegNetConfig = serde_json::from_value(network)?;

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let record = recorder
        .load(checkpoint_dir.join("model"), device)
        .map_err(|e| Error::Record(format!("failed to load model: {e:?}")))?;
    let model = network.init::<B>(device).load_record(record);

    log::info!("checkpoint loaded from {}", checkpoint_dir.display());
    Ok((model, network))
}
