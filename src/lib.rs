pub mod error;
pub mod device;
pub mod math;
pub mod activation;
pub mod layers;
pub mod backbone;
pub mod network;
pub mod loss;
pub mod optim;
pub mod data;
pub mod train;
pub mod checkpoint;
pub mod config;
pub mod logging;

// Convenience re-exports
pub use error::{Error, Result};
pub use device::Device;
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use backbone::{Architecture, Backbone, BackboneRegistry, SyntheticWeights, WeightsDir};
pub use network::{assemble, ClassifierHead, Network};
pub use loss::nll::NllLoss;
pub use optim::adam::Adam;
pub use data::{BatchSource, ImageFolder, InMemorySource, Transform};
pub use train::{train_model, TrainConfig};
pub use checkpoint::{save_checkpoint, Checkpoint};
pub use config::{EvalTransform, TrainingConfig};
