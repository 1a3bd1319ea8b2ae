use anyhow::Context;
use burn::backend::NdArray;
use clap::Parser;

use rgbd_segnet::data::SyntheticRgbd;
use rgbd_segnet::training::{evaluate, load_checkpoint};

type MyBackend = NdArray;

#[derive(Parser, Debug)]
#[command(author, version, about = "Score a segmentation checkpoint on synthetic scenes")]
struct Args {
    /// Checkpoint directory (e.g. runs/train/final)
    #[arg(short, long, default_value = "runs/train/final")]
    weights: String,

    /// Number of synthetic samples
    #[arg(long, default_value_t = 16)]
    samples: usize,

    #[arg(long, default_value_t = 2)]
    batch_size: usize,

    /// Square input size, a multiple of 32
    #[arg(long, default_value_t = 64)]
    size: usize,

    #[arg(long, default_value_t = 7)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.batch_size > 0, "batch size must be positive");
    anyhow::ensure!(
        args.size > 0 && args.size % 32 == 0,
        "input size must be a positive multiple of 32, got {}",
        args.size
    );

    let device = Default::default();
    let (model, network) = load_checkpoint::<MyBackend>(&args.weights, &device)
        .with_context(|| format!("loading checkpoint {}", args.weights))?;

    let classes = network.num_classes;
    let dataset = SyntheticRgbd::new(args.samples, args.size, args.size, classes, args.batch_size)
        .with_seed(args.seed);
    let metrics = evaluate(classes, &dataset, &model, &device)?;

    println!("mIoU:                {:.4}", metrics.mean_iou);
    println!("pixel accuracy:      {:.4}", metrics.pixel_accuracy);
    println!("mean pixel accuracy: {:.4}", metrics.mean_pixel_accuracy);
    println!("frequency-weighted IoU: {:.4}", metrics.frequency_weighted_iou);

    Ok(())
}
