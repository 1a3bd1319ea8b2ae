pub mod data;
pub mod error;
pub mod model;
pub mod training;

// Re-exports for convenience
pub use data::{split_rgbd, RgbdBatch, RgbdDataset, SyntheticRgbd};
pub use error::{Error, Result};
pub use model::{
    downsample_targets, FlowNetS, FlowNetSConfig, LabelResample, MultiScaleEpe, RgbdSegNet,
    RgbdSegNetConfig, SegmentationLoss, SegmentationOutput,
};
pub use training::{
    evaluate, train, AbsentClassPolicy, EpochSummary, EvalMetrics, MetricKind, SegmentationMetric,
    TrainingConfig,
};
