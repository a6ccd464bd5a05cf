use crate::error::{Error, Result};
use crate::math::matrix::Matrix;

/// Negative log-likelihood over log-probabilities, averaged over the batch.
/// Paired with a log-softmax output this is categorical cross-entropy.
pub struct NllLoss;

impl NllLoss {
    /// L = -(1/B) · Σ_b log_probs[b][label_b]
    pub fn loss(log_probs: &Matrix, labels: &[usize]) -> f64 {
        if labels.is_empty() {
            return 0.0;
        }
        let total: f64 = log_probs.data.iter().zip(labels.iter())
            .map(|(row, &label)| -row[label])
            .sum();
        total / labels.len() as f64
    }

    /// ∂L/∂log_probs: -1/B at each row's label, zero elsewhere.
    pub fn derivative(log_probs: &Matrix, labels: &[usize]) -> Matrix {
        let mut grad = Matrix::zeros(log_probs.rows, log_probs.cols);
        let scale = 1.0 / labels.len().max(1) as f64;
        for (row, &label) in grad.data.iter_mut().zip(labels.iter()) {
            row[label] = -scale;
        }
        grad
    }

    /// Checks that labels line up with the batch and the class count.
    pub fn check_labels(log_probs: &Matrix, labels: &[usize]) -> Result<()> {
        if labels.len() != log_probs.rows {
            return Err(Error::BatchProcessingFailure(format!(
                "{} labels for a batch of {}",
                labels.len(),
                log_probs.rows
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&label| label >= log_probs.cols) {
            return Err(Error::BatchProcessingFailure(format!(
                "label {} out of range for {} classes",
                bad, log_probs.cols
            )));
        }
        Ok(())
    }

    /// Fraction of rows whose highest log-probability is the true label.
    pub fn accuracy(log_probs: &Matrix, labels: &[usize]) -> f64 {
        if labels.is_empty() {
            return 0.0;
        }
        let correct = log_probs.argmax_rows().into_iter().zip(labels.iter())
            .filter(|(predicted, &label)| *predicted == label)
            .count();
        correct as f64 / labels.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_picks_label_entries() {
        let lp = Matrix::from_data(vec![
            vec![(0.7f64).ln(), (0.2f64).ln(), (0.1f64).ln()],
            vec![(0.1f64).ln(), (0.1f64).ln(), (0.8f64).ln()],
        ]);
        let loss = NllLoss::loss(&lp, &[0, 2]);
        let expected = -((0.7f64).ln() + (0.8f64).ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-12);
    }

    #[test]
    fn test_derivative_scaled_by_batch() {
        let lp = Matrix::zeros(2, 3);
        let g = NllLoss::derivative(&lp, &[1, 0]);
        assert_eq!(g.data, vec![vec![0.0, -0.5, 0.0], vec![-0.5, 0.0, 0.0]]);
    }

    #[test]
    fn test_check_labels() {
        let lp = Matrix::zeros(2, 3);
        assert!(NllLoss::check_labels(&lp, &[0, 2]).is_ok());
        assert!(NllLoss::check_labels(&lp, &[0]).is_err());
        assert!(NllLoss::check_labels(&lp, &[0, 3]).is_err());
    }

    #[test]
    fn test_accuracy() {
        let lp = Matrix::from_data(vec![vec![-0.1, -3.0], vec![-2.0, -0.2], vec![-0.5, -1.0]]);
        assert!((NllLoss::accuracy(&lp, &[0, 1, 1]) - 2.0 / 3.0).abs() < 1e-12);
    }
}
