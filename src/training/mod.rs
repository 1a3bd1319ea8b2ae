pub mod config;
pub mod metrics;
pub mod trainer;

pub use config::TrainingConfig;
pub use metrics::{AbsentClassPolicy, ClassTally, MetricKind, SegmentationMetric};
pub use trainer::{evaluate, load_checkpoint, save_checkpoint, train, EpochSummary, EvalMetrics};
