use tracing::info;

use crate::backbone::architecture::Architecture;
use crate::backbone::backbone::Backbone;
use crate::backbone::weights::WeightSource;
use crate::error::{Error, Result};

/// Maps an architecture name to a pretrained extractor and its feature width.
pub struct BackboneRegistry {
    source: Box<dyn WeightSource>,
}

impl BackboneRegistry {
    pub fn new(source: impl WeightSource + 'static) -> BackboneRegistry {
        BackboneRegistry { source: Box::new(source) }
    }

    /// Resolves `name` to `(backbone, feature_width)`.
    ///
    /// Unknown names fail with `UnsupportedArchitecture` before any weights
    /// are touched; every failure after that is a `BackboneLoadFailure`.
    pub fn resolve(&self, name: &str) -> Result<(Backbone, usize)> {
        let arch = Architecture::from_name(name)?;
        self.resolve_architecture(arch)
    }

    pub fn resolve_architecture(&self, arch: Architecture) -> Result<(Backbone, usize)> {
        let weights = self.source.fetch(arch).map_err(|e| match e {
            Error::BackboneLoadFailure { .. } => e,
            other => Error::BackboneLoadFailure {
                arch: arch.name().to_string(),
                reason: other.to_string(),
            },
        })?;

        if weights.architecture != arch {
            return Err(Error::BackboneLoadFailure {
                arch: arch.name().to_string(),
                reason: format!("weights are tagged '{}'", weights.architecture),
            });
        }

        let backbone = Backbone::from_weights(weights)?;
        info!(
            "Loaded pretrained {} ({} frozen parameters, {} features)",
            arch,
            backbone.parameter_count(),
            backbone.feature_width()
        );
        let width = backbone.feature_width();
        Ok((backbone, width))
    }
}
