pub mod loop_fn;
pub mod report;
pub mod session;
pub mod train_config;

pub use loop_fn::{evaluate, format_elapsed, train_model, TrainingSummary};
pub use report::{Evaluation, MetricsReport};
pub use session::{Phase, TrainingSession};
pub use train_config::TrainConfig;
