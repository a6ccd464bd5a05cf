use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::data::batch::{Batch, BatchSource};
use crate::error::{Error, Result};
use crate::loss::nll::NllLoss;
use crate::network::network::Network;
use crate::optim::adam::Adam;
use crate::train::report::{Evaluation, MetricsReport};
use crate::train::session::{Phase, TrainingSession};
use crate::train::train_config::TrainConfig;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub session: TrainingSession,
    pub elapsed: Duration,
}

impl TrainingSummary {
    pub fn reports(&self) -> &[MetricsReport] {
        &self.session.reports
    }
}

/// Trains the classifier head for `config.epochs` full passes over `train`.
///
/// Every `config.print_every` steps (counted globally, across epochs) the
/// loop runs one full gradient-free pass over `validate` and emits a
/// `MetricsReport`. There is no early stopping: every epoch runs.
///
/// # Errors
/// Any batch failure aborts the run immediately; nothing is retried or
/// skipped.
pub fn train_model(
    network: &mut Network,
    optimizer: &mut Adam,
    train: &mut dyn BatchSource,
    validate: &mut dyn BatchSource,
    config: &TrainConfig,
) -> Result<TrainingSummary> {
    let mut session = TrainingSession::new(config.epochs, config.print_every);
    let start = Instant::now();
    info!(
        "Model is training: {} epoch(s), {} batches per epoch, validating every {} steps",
        config.epochs,
        train.len(),
        session.print_every
    );

    network.train();
    for epoch in 0..config.epochs {
        session.epoch = epoch;

        for batch in train.batches() {
            training_step(&mut session, network, optimizer, &batch?)?;

            if session.validation_due() {
                let report = validation_pass(&mut session, network, validate)?;
                if let Some(ref tx) = config.progress_tx {
                    // Progress is informational; a gone receiver does not stop training.
                    let _ = tx.send(report);
                }
            }
        }
    }

    let elapsed = start.elapsed();
    info!("Model trained in: {}", format_elapsed(elapsed));

    Ok(TrainingSummary { session, elapsed })
}

/// One optimization step on one batch; adds the batch loss to
/// `session.running_loss`.
pub fn training_step(
    session: &mut TrainingSession,
    network: &mut Network,
    optimizer: &mut Adam,
    batch: &Batch,
) -> Result<f64> {
    if batch.is_empty() {
        return Err(Error::BatchProcessingFailure("empty training batch".to_string()));
    }
    session.steps += 1;
    session.phase = Phase::Training;

    network.zero_grad();
    let log_probs = network.forward(&batch.inputs)?;
    NllLoss::check_labels(&log_probs, &batch.labels)?;

    let loss = NllLoss::loss(&log_probs, &batch.labels);
    if !loss.is_finite() {
        return Err(Error::BatchProcessingFailure(format!(
            "non-finite training loss at step {}",
            session.steps
        )));
    }

    network.backward(&NllLoss::derivative(&log_probs, &batch.labels))?;
    optimizer.step(&mut network.classifier)?;

    session.running_loss += loss;
    Ok(loss)
}

/// Runs one validation pass in eval mode, records and logs the report, then
/// resets the running loss and returns the network to train mode.
pub fn validation_pass(
    session: &mut TrainingSession,
    network: &mut Network,
    validate: &mut dyn BatchSource,
) -> Result<MetricsReport> {
    session.phase = Phase::Validating;
    network.eval();

    let evaluation = evaluate(network, validate)?;
    if evaluation.batches == 0 {
        warn!("Validation source yielded no batches; reporting zero loss and accuracy");
    }

    let report = MetricsReport {
        epoch: session.epoch + 1,
        total_epochs: session.total_epochs,
        step: session.steps,
        train_loss: session.mean_running_loss(),
        validation_loss: evaluation.loss,
        validation_accuracy: evaluation.accuracy,
    };
    info!(
        "Epoch {}/{}.. Train loss: {:.3}.. Test loss: {:.3}.. Test accuracy: {:.3}",
        report.epoch,
        report.total_epochs,
        report.train_loss,
        report.validation_loss,
        report.validation_accuracy
    );

    session.reports.push(report.clone());
    session.running_loss = 0.0;
    network.train();
    session.phase = Phase::Training;
    Ok(report)
}

/// Mean loss and mean per-batch accuracy over one pass of `source`,
/// without tracking gradients.
pub fn evaluate(network: &Network, source: &mut dyn BatchSource) -> Result<Evaluation> {
    let mut total_loss = 0.0;
    let mut total_accuracy = 0.0;
    let mut batches = 0usize;

    for batch in source.batches() {
        let batch = batch?;
        let log_probs = network.predict(&batch.inputs)?;
        NllLoss::check_labels(&log_probs, &batch.labels)?;

        let loss = NllLoss::loss(&log_probs, &batch.labels);
        if !loss.is_finite() {
            return Err(Error::BatchProcessingFailure("non-finite evaluation loss".to_string()));
        }
        total_loss += loss;
        total_accuracy += NllLoss::accuracy(&log_probs, &batch.labels);
        batches += 1;
    }

    if batches == 0 {
        return Ok(Evaluation { loss: 0.0, accuracy: 0.0, batches });
    }
    Ok(Evaluation {
        loss: total_loss / batches as f64,
        accuracy: total_accuracy / batches as f64,
        batches,
    })
}

/// Whole minutes and seconds, e.g. `"3m 7s"`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}
