use crate::train::report::MetricsReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Training,
    Validating,
}

/// Mutable state of one training run, passed by `&mut` through the loop.
#[derive(Debug, Clone)]
pub struct TrainingSession {
    /// 0-based index of the epoch in progress.
    pub epoch: usize,
    pub total_epochs: usize,
    /// Global step counter; not reset between epochs.
    pub steps: usize,
    /// Sum of training losses since the last report.
    pub running_loss: f64,
    pub print_every: usize,
    pub phase: Phase,
    pub reports: Vec<MetricsReport>,
}

impl TrainingSession {
    pub fn new(total_epochs: usize, print_every: usize) -> TrainingSession {
        TrainingSession {
            epoch: 0,
            total_epochs,
            steps: 0,
            running_loss: 0.0,
            print_every: print_every.max(1),
            phase: Phase::Training,
            reports: Vec::new(),
        }
    }

    /// True right after every `print_every`-th step.
    pub fn validation_due(&self) -> bool {
        self.steps > 0 && self.steps % self.print_every == 0
    }

    pub fn mean_running_loss(&self) -> f64 {
        self.running_loss / self.print_every as f64
    }
}
