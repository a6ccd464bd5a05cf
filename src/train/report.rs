use serde::{Serialize, Deserialize};

/// Metrics emitted after every validation pass.
///
/// When a `progress_tx` channel is configured in `TrainConfig`, the loop
/// also sends each report there. Reports are informational only and never
/// steer training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Global training step at which validation ran.
    pub step: usize,
    /// Mean training loss over the last `print_every` steps.
    pub train_loss: f64,
    /// Mean validation loss over every batch of the validation source.
    pub validation_loss: f64,
    /// Mean per-batch top-1 accuracy over the validation source, in [0, 1].
    pub validation_accuracy: f64,
}

/// Loss and accuracy of one gradient-free pass over a source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
    pub batches: usize,
}
