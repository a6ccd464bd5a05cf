pub mod architecture;
pub mod backbone;
pub mod registry;
pub mod weights;

pub use architecture::Architecture;
pub use backbone::Backbone;
pub use registry::BackboneRegistry;
pub use weights::{PretrainedWeights, StageWeights, SyntheticWeights, WeightSource, WeightsDir};
