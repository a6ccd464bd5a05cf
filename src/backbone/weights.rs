use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::activation::activation::ActivationFunction;
use crate::backbone::architecture::Architecture;
use crate::error::{Error, Result};
use crate::layers::pool::InputShape;
use crate::math::matrix::Matrix;

/// One frozen stage of a pretrained extractor, in forward order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageWeights {
    AvgPool { kernel: usize },
    Dense {
        weights: Matrix,
        biases: Matrix,
        activation: ActivationFunction,
    },
}

/// On-disk description of a pretrained backbone.
///
/// Stored as `<weights_dir>/<arch>.json`; `input` is the image shape the
/// extractor was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainedWeights {
    pub architecture: Architecture,
    pub input: InputShape,
    pub stages: Vec<StageWeights>,
}

impl PretrainedWeights {
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<PretrainedWeights> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Where pretrained weights come from.
pub trait WeightSource {
    fn fetch(&self, arch: Architecture) -> Result<PretrainedWeights>;
}

/// Reads `<root>/<arch>.json` from a local weights cache.
#[derive(Debug, Clone)]
pub struct WeightsDir {
    root: PathBuf,
}

impl WeightsDir {
    pub fn new(root: impl Into<PathBuf>) -> WeightsDir {
        WeightsDir { root: root.into() }
    }

    pub fn path_for(&self, arch: Architecture) -> PathBuf {
        self.root.join(format!("{}.json", arch.name()))
    }
}

impl WeightSource for WeightsDir {
    fn fetch(&self, arch: Architecture) -> Result<PretrainedWeights> {
        let path = self.path_for(arch);
        debug!("Reading pretrained weights from {:?}", path);
        PretrainedWeights::load_json(&path)
    }
}

/// Seeded stand-in extractor: optional average pooling, then one frozen
/// ReLU projection to the architecture's feature width.
///
/// Same seed, same weights. Lets smoke runs and tests work without a
/// weights cache.
#[derive(Debug, Clone)]
pub struct SyntheticWeights {
    pub input: InputShape,
    pub pool_kernel: Option<usize>,
    pub seed: u64,
}

impl SyntheticWeights {
    pub fn new(input: InputShape, seed: u64) -> SyntheticWeights {
        SyntheticWeights { input, pool_kernel: None, seed }
    }

    pub fn with_pool(mut self, kernel: usize) -> SyntheticWeights {
        self.pool_kernel = Some(kernel);
        self
    }
}

impl WeightSource for SyntheticWeights {
    fn fetch(&self, arch: Architecture) -> Result<PretrainedWeights> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ arch.feature_width() as u64);
        let mut stages = Vec::new();

        let fan_in = match self.pool_kernel {
            Some(kernel) => {
                if kernel == 0 || kernel > self.input.height || kernel > self.input.width {
                    return Err(Error::Config(format!(
                        "pool kernel {} does not fit a {}x{} input",
                        kernel, self.input.height, self.input.width
                    )));
                }
                stages.push(StageWeights::AvgPool { kernel });
                self.input.channels * (self.input.height / kernel) * (self.input.width / kernel)
            }
            None => self.input.len(),
        };

        stages.push(StageWeights::Dense {
            weights: Matrix::he_with(fan_in, arch.feature_width(), &mut rng),
            biases: Matrix::zeros(1, arch.feature_width()),
            activation: ActivationFunction::ReLU,
        });

        Ok(PretrainedWeights { architecture: arch, input: self.input, stages })
    }
}
