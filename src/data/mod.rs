pub mod batch;
pub mod synthetic;

pub use batch::{split_rgbd, RgbdBatch, RgbdDataset};
pub use synthetic::{SyntheticLoader, SyntheticRgbd};
