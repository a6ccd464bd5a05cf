use std::sync::mpsc;
use crate::train::report::MetricsReport;

/// Configuration for a `train_model` run.
///
/// # Fields
/// - `epochs`:      total number of full passes over the training source
/// - `print_every`: training steps between validation passes
/// - `progress_tx`: optional channel sender; one `MetricsReport` is sent
///                   per validation pass. A dropped receiver is ignored:
///                   every configured epoch still runs.
pub struct TrainConfig {
    pub epochs: usize,
    pub print_every: usize,
    pub progress_tx: Option<mpsc::Sender<MetricsReport>>,
}

impl TrainConfig {
    /// Validation cadence used unless overridden.
    pub const DEFAULT_PRINT_EVERY: usize = 5;

    /// Creates a `TrainConfig` with the default cadence and no progress channel.
    pub fn new(epochs: usize) -> Self {
        TrainConfig {
            epochs,
            print_every: TrainConfig::DEFAULT_PRINT_EVERY,
            progress_tx: None,
        }
    }

    pub fn with_print_every(mut self, print_every: usize) -> Self {
        self.print_every = print_every;
        self
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<MetricsReport>) -> Self {
        self.progress_tx = Some(tx);
        self
    }
}
