//! Run configuration for a training job.

use clap::ValueEnum;
use serde::{Serialize, Deserialize};
use std::path::PathBuf;

use crate::backbone::architecture::Architecture;
use crate::data::transform::Transform;
use crate::error::{Error, Result};
use crate::logging::LogLevel;

/// Preprocessing used for the validation and test sources.
///
/// Training data is always augmented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EvalTransform {
    /// Same random crop and flip as training.
    Augment,
    /// Resize and centre crop.
    Deterministic,
}

impl EvalTransform {
    pub fn transform(self, size: u32) -> Transform {
        match self {
            EvalTransform::Augment => Transform::Augment { size },
            EvalTransform::Deterministic => Transform::Deterministic { size },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Holds `train/`, `valid/` and `test/`, one sub-directory per class.
    pub data_dir: PathBuf,
    /// Checkpoint path.
    pub save_dir: PathBuf,
    pub arch: String,
    pub learning_rate: f64,
    pub hidden_units: usize,
    pub epochs: usize,
    pub use_accelerator: bool,
    /// Pretrained weights cache, one `<arch>.json` per architecture.
    pub weights_dir: PathBuf,
    pub category_names: Option<PathBuf>,
    pub batch_size: usize,
    pub print_every: usize,
    pub image_size: u32,
    pub eval_transform: EvalTransform,
    pub log_level: LogLevel,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("flowers"),
            save_dir: PathBuf::from("train_checkpoint.ckpt"),
            arch: "vgg16".to_string(),
            learning_rate: 0.001,
            hidden_units: 512,
            epochs: 1,
            use_accelerator: false,
            weights_dir: PathBuf::from("pretrained"),
            category_names: None,
            batch_size: 64,
            print_every: 5,
            image_size: 224,
            eval_transform: EvalTransform::Augment,
            log_level: LogLevel::Info,
        }
    }
}

impl TrainingConfig {
    /// Rejects values a run cannot start with. The architecture name is
    /// checked here too so a typo fails before any data is touched.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.hidden_units == 0 {
            return Err(Error::Config("hidden_units must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.print_every == 0 {
            return Err(Error::Config("print_every must be at least 1".to_string()));
        }
        if self.image_size == 0 {
            return Err(Error::Config("image_size must be at least 1".to_string()));
        }
        Architecture::from_name(&self.arch)?;
        Ok(())
    }

    pub fn train_dir(&self) -> PathBuf {
        self.data_dir.join("train")
    }

    pub fn valid_dir(&self) -> PathBuf {
        self.data_dir.join("valid")
    }

    pub fn test_dir(&self) -> PathBuf {
        self.data_dir.join("test")
    }

    pub fn train_transform(&self) -> Transform {
        Transform::Augment { size: self.image_size }
    }

    pub fn eval_transform(&self) -> Transform {
        self.eval_transform.transform(self.image_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrainingConfig::default();
        config.validate().unwrap();
        assert_eq!(config.save_dir, PathBuf::from("train_checkpoint.ckpt"));
        assert_eq!(config.arch, "vgg16");
        assert_eq!(config.hidden_units, 512);
        assert_eq!(config.epochs, 1);
        assert_eq!(config.eval_transform(), Transform::Augment { size: 224 });
    }

    #[test]
    fn test_zero_epochs_is_allowed() {
        let config = TrainingConfig { epochs: 0, ..TrainingConfig::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_values() {
        let bad = [
            TrainingConfig { learning_rate: 0.0, ..TrainingConfig::default() },
            TrainingConfig { learning_rate: f64::NAN, ..TrainingConfig::default() },
            TrainingConfig { hidden_units: 0, ..TrainingConfig::default() },
            TrainingConfig { batch_size: 0, ..TrainingConfig::default() },
            TrainingConfig { print_every: 0, ..TrainingConfig::default() },
        ];
        for config in &bad {
            assert!(matches!(config.validate(), Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_unknown_arch_fails_validation() {
        let config = TrainingConfig { arch: "resnet50".to_string(), ..TrainingConfig::default() };
        assert!(matches!(config.validate(), Err(Error::UnsupportedArchitecture(_))));
    }

    #[test]
    fn test_split_directories() {
        let config = TrainingConfig { data_dir: PathBuf::from("flowers"), ..TrainingConfig::default() };
        assert_eq!(config.valid_dir(), PathBuf::from("flowers/valid"));
        let deterministic = TrainingConfig { eval_transform: EvalTransform::Deterministic, ..config };
        assert_eq!(deterministic.eval_transform(), Transform::Deterministic { size: 224 });
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = TrainingConfig { category_names: Some(PathBuf::from("cat_to_name.json")), ..TrainingConfig::default() };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"eval_transform\":\"augment\""));
        assert_eq!(serde_json::from_str::<TrainingConfig>(&json).unwrap(), config);
    }
}
