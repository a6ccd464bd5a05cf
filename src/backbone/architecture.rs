use serde::{Serialize, Deserialize};
use std::str::FromStr;

use crate::error::{Error, Result};

/// The two pretrained feature extractors a head can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// Wide extractor: flattened 512×7×7 convolutional features.
    Vgg16,
    /// Narrow extractor: globally pooled 1024-channel features.
    Densenet121,
}

impl Architecture {
    pub const ALL: [Architecture; 2] = [Architecture::Vgg16, Architecture::Densenet121];

    pub fn name(&self) -> &'static str {
        match self {
            Architecture::Vgg16 => "vgg16",
            Architecture::Densenet121 => "densenet121",
        }
    }

    /// Width of the feature vector the backbone hands to the classifier head.
    pub fn feature_width(&self) -> usize {
        match self {
            Architecture::Vgg16 => 25088,
            Architecture::Densenet121 => 1024,
        }
    }

    pub fn from_name(name: &str) -> Result<Architecture> {
        Architecture::ALL
            .iter()
            .copied()
            .find(|arch| arch.name() == name)
            .ok_or_else(|| Error::UnsupportedArchitecture(name.to_string()))
    }
}

impl FromStr for Architecture {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Architecture::from_name(s)
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_widths() {
        assert_eq!(Architecture::Vgg16.feature_width(), 25088);
        assert_eq!(Architecture::Densenet121.feature_width(), 1024);
    }

    #[test]
    fn test_name_round_trip() {
        for arch in Architecture::ALL {
            assert_eq!(arch.name().parse::<Architecture>().unwrap(), arch);
        }
    }

    #[test]
    fn test_unsupported_names() {
        for name in ["resnet50", "VGG16", "", "densenet"] {
            assert!(matches!(
                Architecture::from_name(name),
                Err(Error::UnsupportedArchitecture(n)) if n == name
            ));
        }
    }
}
