use burn::backend::{Autodiff, NdArray};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::Distribution;

use rgbd_segnet::data::{RgbdDataset, SyntheticRgbd};
use rgbd_segnet::model::{FlowNetS, FlowNetSConfig, MultiScaleEpe, RgbdSegNet, RgbdSegNetConfig};
use rgbd_segnet::training::{load_checkpoint, train, TrainingConfig};

type TestBackend = NdArray;
type TestAutodiffBackend = Autodiff<TestBackend>;

#[test]
fn one_epoch_on_synthetic_scenes() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();

    let config = TrainingConfig {
        model: RgbdSegNetConfig::slim(3),
        epochs: 1,
        batch_size: 2,
        log_period: 1,
        save_dir: dir.path().to_string_lossy().into_owned(),
        save_interval: 1,
        ..TrainingConfig::default()
    };

    let train_data = SyntheticRgbd::new(4, 32, 32, 3, config.batch_size).with_shuffle(true);
    let eval_data = SyntheticRgbd::new(2, 32, 32, 3, config.batch_size).with_seed(9);

    let model = config.model.init::<TestAutodiffBackend>(&device);
    let optimizer =
        AdamConfig::new().init::<TestAutodiffBackend, RgbdSegNet<TestAutodiffBackend>>();

    let (trained, history) = train(
        model,
        optimizer,
        &train_data,
        Some(&eval_data as &dyn RgbdDataset<TestBackend>),
        &config,
        &device,
    )
    .unwrap();

    assert_eq!(history.len(), 1);
    let summary = &history[0];
    assert_eq!(summary.batches, 2);
    assert!(summary.train_loss.is_finite() && summary.train_loss > 0.0);
    let eval = summary.eval.expect("evaluation ran");
    assert!((0.0..=1.0).contains(&eval.mean_iou));
    assert!((0.0..=1.0).contains(&eval.pixel_accuracy));

    assert!(dir.path().join("epoch_1").join("config.json").exists());
    let (restored, network) =
        load_checkpoint::<TestBackend>(dir.path().join("final"), &device).unwrap();
    assert_eq!(network.num_classes, 3);
    assert_eq!(restored.num_classes(), trained.num_classes());
}

#[test]
fn training_without_evaluation_still_checkpoints() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();

    let config = TrainingConfig {
        model: RgbdSegNetConfig::slim(2),
        epochs: 2,
        batch_size: 1,
        save_dir: dir.path().to_string_lossy().into_owned(),
        save_interval: 0,
        ..TrainingConfig::default()
    };
    let train_data = SyntheticRgbd::new(1, 32, 32, 2, 1);

    let model = config.model.init::<TestAutodiffBackend>(&device);
    let optimizer =
        AdamConfig::new().init::<TestAutodiffBackend, RgbdSegNet<TestAutodiffBackend>>();
    let (_, history) = train(model, optimizer, &train_data, None, &config, &device).unwrap();

    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|s| s.eval.is_none()));
    assert!(dir.path().join("final").join("config.json").exists());
    assert!(!dir.path().join("epoch_1").exists());
}

#[test]
fn flownet_epe_backpropagates() {
    let device = Default::default();
    let model: FlowNetS<TestAutodiffBackend> = FlowNetSConfig::new()
        .with_base_channels(4)
        .init(&device);
    let mut optimizer =
        AdamConfig::new().init::<TestAutodiffBackend, FlowNetS<TestAutodiffBackend>>();

    let frames = Tensor::random([1, 6, 64, 64], Distribution::Normal(0.0, 1.0), &device);
    let target = Tensor::random([1, 2, 64, 64], Distribution::Normal(0.0, 1.0), &device);

    let loss = MultiScaleEpe::default().compute(model.forward(frames), target);
    let value = loss.clone().into_scalar().elem::<f32>();
    assert!(value.is_finite() && value > 0.0);

    let grads = GradientsParams::from_grads(loss.backward(), &model);
    let _model = optimizer.step(1e-3, model, grads);
}
