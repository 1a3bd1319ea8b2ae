use crate::error::{Error, Result};
use crate::model::{LabelResample, RgbdSegNetConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    // Model
    pub model: RgbdSegNetConfig,

    // Training
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub log_period: usize,

    // Loss: primary, side4, side3, side2, side1
    pub loss_weights: [f32; 5],
    pub label_resample: LabelResample,

    // Checkpointing; 0 disables the periodic checkpoints
    pub save_dir: String,
    pub save_interval: usize,

    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model: RgbdSegNetConfig::new(13),
            epochs: 10,
            batch_size: 2,
            learning_rate: 1e-3,
            log_period: 10,
            loss_weights: [1.0; 5],
            label_resample: LabelResample::default(),
            save_dir: "runs/train".to_string(),
            save_interval: 5,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn num_classes(&self) -> usize {
        self.model.num_classes
    }

    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TrainingConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.num_classes == 0 {
            return Err(Error::Config("num_classes must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if self.log_period == 0 {
            return Err(Error::Config("log_period must be positive".into()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(Error::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.loss_weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Config(format!(
                "loss weights must be finite and non-negative, got {:?}",
                self.loss_weights
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_hyper_parameters() {
        let config = TrainingConfig::default();
        assert_eq!(config.num_classes(), 13);
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.log_period, 10);
        assert_eq!(config.loss_weights, [1.0; 5]);
        assert_eq!(config.model.encoder_units, [3, 4, 6, 3]);
        config.validate().unwrap();
    }

    #[test]
    fn yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.yaml");

        let mut config = TrainingConfig {
            model: RgbdSegNetConfig::slim(4),
            epochs: 3,
            label_resample: LabelResample::Nearest,
            ..TrainingConfig::default()
        };
        config.loss_weights[4] = 0.25;
        config.save(&path).unwrap();

        let loaded = TrainingConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.num_classes(), 4);
        assert_eq!(loaded.epochs, 3);
        assert_eq!(loaded.label_resample, LabelResample::Nearest);
        assert_eq!(loaded.loss_weights, [1.0, 1.0, 1.0, 1.0, 0.25]);
        assert_eq!(loaded.model.decoder_channels, [32, 16, 8, 8, 8]);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        let config = TrainingConfig {
            batch_size: 0,
            ..TrainingConfig::default()
        };
        config.save(&path).unwrap();

        assert!(matches!(TrainingConfig::from_yaml(&path), Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TrainingConfig::from_yaml(dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
