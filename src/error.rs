//! Error types for the segmentation and flow crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("shape of labels {labels:?} does not match shape of predictions {predictions:?}")]
    ShapeMismatch {
        labels: Vec<usize>,
        predictions: Vec<usize>,
    },

    #[error("label value {value} is outside of [0, {class_count})")]
    ClassOutOfRange { value: i64, class_count: usize },

    #[error("tensor data error: {0}")]
    TensorData(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("checkpoint error: {0}")]
    Record(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
