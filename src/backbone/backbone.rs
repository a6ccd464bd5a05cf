use tracing::debug;

use crate::activation::activation::ActivationFunction;
use crate::backbone::architecture::Architecture;
use crate::backbone::weights::{PretrainedWeights, StageWeights};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::layers::dense::linear;
use crate::layers::pool::{AvgPool2d, InputShape};
use crate::math::matrix::Matrix;
use crate::network::state_dict::{parameter_from, StateDict};

#[derive(Debug, Clone)]
enum Stage {
    Pool(AvgPool2d),
    Dense {
        weights: Matrix,
        biases: Matrix,
        activation: ActivationFunction,
    },
}

/// Frozen pretrained feature extractor.
///
/// Parameters are read-only: there is no gradient storage and no `&mut`
/// access. Loading different values produces a new `Backbone`.
#[derive(Debug, Clone)]
pub struct Backbone {
    architecture: Architecture,
    input: InputShape,
    stages: Vec<Stage>,
    feature_width: usize,
}

impl Backbone {
    /// Builds the extractor from pretrained weights, checking that every
    /// stage chains onto the previous one and that the final width matches
    /// the architecture.
    pub fn from_weights(weights: PretrainedWeights) -> Result<Backbone> {
        let arch = weights.architecture;
        let fail = |reason: String| Error::BackboneLoadFailure {
            arch: arch.name().to_string(),
            reason,
        };

        let mut shape = Some(weights.input);
        let mut width = weights.input.len();
        let mut stages = Vec::with_capacity(weights.stages.len());

        for (i, stage) in weights.stages.into_iter().enumerate() {
            match stage {
                StageWeights::AvgPool { kernel } => {
                    let spatial = shape.ok_or_else(|| {
                        fail(format!("stage {} pools a flattened feature vector", i))
                    })?;
                    let pool = AvgPool2d::new(spatial, kernel)
                        .map_err(|e| fail(format!("stage {}: {}", i, e)))?;
                    let out = pool.output_shape();
                    width = out.len();
                    shape = Some(out);
                    stages.push(Stage::Pool(pool));
                }
                StageWeights::Dense { weights, biases, activation } => {
                    if weights.rows != width || biases.shape() != (1, weights.cols) {
                        return Err(fail(format!(
                            "stage {} expects {} inputs with weights {}x{} and biases {}x{}",
                            i, width, weights.rows, weights.cols, biases.rows, biases.cols
                        )));
                    }
                    width = weights.cols;
                    shape = None;
                    stages.push(Stage::Dense { weights, biases, activation });
                }
            }
        }

        if width != arch.feature_width() {
            return Err(fail(format!(
                "extractor produces {} features, expected {}",
                width,
                arch.feature_width()
            )));
        }

        debug!("Backbone {} ready: {} stages, {} parameters", arch, stages.len(),
            stages.iter().map(stage_parameter_count).sum::<usize>());

        Ok(Backbone {
            architecture: arch,
            input: weights.input,
            stages,
            feature_width: width,
        })
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn input_shape(&self) -> InputShape {
        self.input
    }

    pub fn input_width(&self) -> usize {
        self.input.len()
    }

    pub fn feature_width(&self) -> usize {
        self.feature_width
    }

    pub fn parameter_count(&self) -> usize {
        self.stages.iter().map(stage_parameter_count).sum()
    }

    /// Maps a batch of flattened images to feature vectors.
    pub fn extract(&self, input: &Matrix, device: Device) -> Result<Matrix> {
        if input.cols != self.input_width() {
            return Err(Error::BatchProcessingFailure(format!(
                "{} expects inputs of width {}, got {}",
                self.architecture,
                self.input_width(),
                input.cols
            )));
        }
        let mut current = input.clone();
        for stage in &self.stages {
            current = match stage {
                Stage::Pool(pool) => pool.forward(&current)?,
                Stage::Dense { weights, biases, activation } => {
                    activation.apply(&linear(&current, weights, biases, device)?)
                }
            };
        }
        Ok(current)
    }

    /// Parameters keyed `features.<stage>.weight` / `features.<stage>.bias`.
    pub fn named_parameters(&self) -> Vec<(String, &Matrix)> {
        let mut params = Vec::new();
        for (i, stage) in self.stages.iter().enumerate() {
            if let Stage::Dense { weights, biases, .. } = stage {
                params.push((format!("features.{}.weight", i), weights));
                params.push((format!("features.{}.bias", i), biases));
            }
        }
        params
    }

    /// Returns a copy of this backbone with every parameter taken from
    /// `state`. Missing keys or shape changes are rejected.
    pub fn with_parameters(&self, state: &StateDict) -> Result<Backbone> {
        let mut stages = Vec::with_capacity(self.stages.len());
        for (i, stage) in self.stages.iter().enumerate() {
            stages.push(match stage {
                Stage::Pool(pool) => Stage::Pool(*pool),
                Stage::Dense { weights, biases, activation } => Stage::Dense {
                    weights: parameter_from(state, &format!("features.{}.weight", i), weights.shape())?,
                    biases: parameter_from(state, &format!("features.{}.bias", i), biases.shape())?,
                    activation: *activation,
                },
            });
        }
        Ok(Backbone { stages, ..self.clone() })
    }
}

fn stage_parameter_count(stage: &Stage) -> usize {
    match stage {
        Stage::Pool(_) => 0,
        Stage::Dense { weights, biases, .. } => weights.len() + biases.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backbone::weights::{SyntheticWeights, WeightSource};

    fn shape() -> InputShape {
        InputShape { channels: 3, height: 4, width: 4 }
    }

    #[test]
    fn test_extract_produces_feature_width() {
        let weights = SyntheticWeights::new(shape(), 5).with_pool(2)
            .fetch(Architecture::Densenet121)
            .unwrap();
        let backbone = Backbone::from_weights(weights).unwrap();
        assert_eq!(backbone.input_width(), 48);
        assert_eq!(backbone.parameter_count(), 12 * 1024 + 1024);

        let features = backbone.extract(&Matrix::zeros(2, 48), Device::Cpu).unwrap();
        assert_eq!(features.shape(), (2, 1024));
    }

    #[test]
    fn test_wrong_final_width_is_load_failure() {
        let mut weights = SyntheticWeights::new(shape(), 5).fetch(Architecture::Densenet121).unwrap();
        weights.architecture = Architecture::Vgg16;
        assert!(matches!(
            Backbone::from_weights(weights),
            Err(Error::BackboneLoadFailure { .. })
        ));
    }

    #[test]
    fn test_pool_after_dense_is_load_failure() {
        let mut weights = SyntheticWeights::new(shape(), 5).fetch(Architecture::Densenet121).unwrap();
        weights.stages.push(StageWeights::AvgPool { kernel: 2 });
        assert!(matches!(
            Backbone::from_weights(weights),
            Err(Error::BackboneLoadFailure { .. })
        ));
    }

    #[test]
    fn test_extract_rejects_wrong_input_width() {
        let weights = SyntheticWeights::new(shape(), 5).fetch(Architecture::Densenet121).unwrap();
        let backbone = Backbone::from_weights(weights).unwrap();
        assert!(matches!(
            backbone.extract(&Matrix::zeros(1, 47), Device::Cpu),
            Err(Error::BatchProcessingFailure(_))
        ));
    }

    #[test]
    fn test_with_parameters_replaces_values() {
        let weights = SyntheticWeights::new(shape(), 5).fetch(Architecture::Densenet121).unwrap();
        let backbone = Backbone::from_weights(weights).unwrap();
        let other = Backbone::from_weights(
            SyntheticWeights::new(shape(), 6).fetch(Architecture::Densenet121).unwrap(),
        ).unwrap();

        let state: StateDict = other.named_parameters().into_iter()
            .map(|(name, m)| (name, m.clone()))
            .collect();
        let loaded = backbone.with_parameters(&state).unwrap();
        let x = Matrix::from_data(vec![vec![0.5; 48]]);
        assert_eq!(
            loaded.extract(&x, Device::Cpu).unwrap(),
            other.extract(&x, Device::Cpu).unwrap()
        );
    }
}
