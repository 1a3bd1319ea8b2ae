use anyhow::Context;
use burn::backend::{Autodiff, NdArray};
use burn::optim::AdamConfig;
use clap::Parser;
use std::path::Path;

use rgbd_segnet::data::{RgbdDataset, SyntheticRgbd};
use rgbd_segnet::model::{RgbdSegNet, RgbdSegNetConfig};
use rgbd_segnet::training::{train, TrainingConfig};

type MyBackend = NdArray;
type MyAutodiffBackend = Autodiff<MyBackend>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train the RGB-D segmentation network on synthetic scenes")]
struct Args {
    /// Training config; a default one is written here when missing
    #[arg(short, long, default_value = "configs/train_config.yaml")]
    config: String,

    /// Override the configured epoch count
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Override the checkpoint directory
    #[arg(short, long)]
    output: Option<String>,

    /// Number of synthetic training samples
    #[arg(long, default_value_t = 32)]
    samples: usize,

    /// Number of synthetic evaluation samples; 0 disables evaluation
    #[arg(long, default_value_t = 8)]
    eval_samples: usize,

    /// Square input size, a multiple of 32
    #[arg(long, default_value_t = 64)]
    size: usize,

    /// Use the narrow network instead of the configured one
    #[arg(long)]
    slim: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        args.size > 0 && args.size % 32 == 0,
        "input size must be a positive multiple of 32, got {}",
        args.size
    );

    let mut config = if Path::new(&args.config).exists() {
        log::info!("loading config from {}", args.config);
        TrainingConfig::from_yaml(&args.config)
            .with_context(|| format!("reading {}", args.config))?
    } else {
        let config = TrainingConfig::default();
        if let Some(parent) = Path::new(&args.config).parent() {
            std::fs::create_dir_all(parent)?;
        }
        config.save(&args.config)?;
        log::info!("created default config at {}", args.config);
        config
    };

    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(output) = args.output {
        config.save_dir = output;
    }
    if args.slim {
        config.model = RgbdSegNetConfig::slim(config.num_classes());
    }

    log::info!("epochs: {}", config.epochs);
    log::info!("batch size: {}", config.batch_size);
    log::info!("learning rate: {}", config.learning_rate);
    log::info!("input size: {}x{}", args.size, args.size);
    log::info!("save dir: {}", config.save_dir);

    let device = Default::default();
    let classes = config.num_classes();

    let (size, batch_size) = (args.size, config.batch_size);
    let train_data = SyntheticRgbd::new(args.samples, size, size, classes, batch_size)
        .with_seed(config.seed)
        .with_shuffle(true);
    let eval_data = SyntheticRgbd::new(args.eval_samples, size, size, classes, batch_size)
        .with_seed(config.seed.wrapping_add(1_000_000));
    let eval_data: Option<&dyn RgbdDataset<MyBackend>> =
        (args.eval_samples > 0).then_some(&eval_data as &dyn RgbdDataset<MyBackend>);

    let model = config.model.init::<MyAutodiffBackend>(&device);
    let optimizer = AdamConfig::new().init::<MyAutodiffBackend, RgbdSegNet<MyAutodiffBackend>>();

    let (_, history) = train(model, optimizer, &train_data, eval_data, &config, &device)
        .context("training failed")?;

    if let Some(last) = history.last() {
        log::info!("final train loss: {:.4}", last.train_loss);
        if let Some(eval) = last.eval {
            log::info!(
                "final mIoU={:.4} pixel_acc={:.4} mean_pixel_acc={:.4} fw_iou={:.4}",
                eval.mean_iou,
                eval.pixel_accuracy,
                eval.mean_pixel_accuracy,
                eval.frequency_weighted_iou
            );
        }
    }
    log::info!("checkpoints saved in {}", config.save_dir);

    Ok(())
}
