use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::math::matrix::Matrix;
use crate::network::head::ClassifierHead;

/// First and second moment estimates for one parameter tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    pub exp_avg: Matrix,
    pub exp_avg_sq: Matrix,
}

/// Everything Adam needs to resume exactly where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamState {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    /// Number of updates applied so far.
    pub step: u64,
    /// Keyed by head parameter name (`fc1.weight`, ...).
    pub moments: BTreeMap<String, Moments>,
}

/// Adam over the classifier head's parameters only.
///
/// Built from a `ClassifierHead`, so frozen backbone parameters can never
/// reach it.
pub struct Adam {
    state: AdamState,
}

impl Adam {
    pub const BETA1: f64 = 0.9;
    pub const BETA2: f64 = 0.999;
    pub const EPS: f64 = 1e-8;

    pub fn new(head: &ClassifierHead, learning_rate: f64) -> Adam {
        let moments = head.named_parameters().into_iter()
            .map(|(name, value)| {
                (name, Moments {
                    exp_avg: Matrix::zeros(value.rows, value.cols),
                    exp_avg_sq: Matrix::zeros(value.rows, value.cols),
                })
            })
            .collect();
        Adam {
            state: AdamState {
                learning_rate,
                beta1: Adam::BETA1,
                beta2: Adam::BETA2,
                eps: Adam::EPS,
                step: 0,
                moments,
            },
        }
    }

    /// Primes an optimizer with saved state. Every head parameter must have
    /// moments of the same shape, and no others may be present.
    pub fn from_state(head: &ClassifierHead, state: AdamState) -> Result<Adam> {
        let params = head.named_parameters();
        if params.len() != state.moments.len() {
            return Err(Error::Checkpoint(format!(
                "optimizer tracks {} tensors, head has {}",
                state.moments.len(),
                params.len()
            )));
        }
        for (name, value) in params {
            let m = state.moments.get(&name).ok_or_else(|| {
                Error::Checkpoint(format!("optimizer state is missing '{}'", name))
            })?;
            if m.exp_avg.shape() != value.shape() || m.exp_avg_sq.shape() != value.shape() {
                return Err(Error::Checkpoint(format!(
                    "optimizer moments for '{}' do not match its shape",
                    name
                )));
            }
        }
        Ok(Adam { state })
    }

    pub fn learning_rate(&self) -> f64 {
        self.state.learning_rate
    }

    pub fn state(&self) -> &AdamState {
        &self.state
    }

    /// Applies one update to every head parameter that has a gradient.
    pub fn step(&mut self, head: &mut ClassifierHead) -> Result<()> {
        self.state.step += 1;
        let AdamState { learning_rate, beta1, beta2, eps, step, moments } = &mut self.state;
        let t = *step as f64;
        let bias_correction1 = 1.0 - beta1.powf(t);
        let bias_correction2 = 1.0 - beta2.powf(t);
        let step_size = *learning_rate / bias_correction1;
        let bc2_sqrt = bias_correction2.sqrt();

        for param in head.parameters_mut() {
            let grad = match param.grad {
                Some(grad) => grad,
                None => continue,
            };
            let m = moments.get_mut(&param.name).ok_or_else(|| {
                Error::BatchProcessingFailure(format!("no optimizer state for '{}'", param.name))
            })?;
            if grad.shape() != param.value.shape() {
                return Err(Error::BatchProcessingFailure(format!(
                    "gradient for '{}' has the wrong shape",
                    param.name
                )));
            }

            for r in 0..grad.rows {
                for c in 0..grad.cols {
                    let g = grad.data[r][c];
                    let avg = &mut m.exp_avg.data[r][c];
                    *avg = *beta1 * *avg + (1.0 - *beta1) * g;
                    let avg_sq = &mut m.exp_avg_sq.data[r][c];
                    *avg_sq = *beta2 * *avg_sq + (1.0 - *beta2) * g * g;

                    let denom = m.exp_avg_sq.data[r][c].sqrt() / bc2_sqrt + *eps;
                    param.value.data[r][c] -= step_size * m.exp_avg.data[r][c] / denom;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::loss::nll::NllLoss;

    fn head() -> ClassifierHead {
        ClassifierHead::build(4, 3, 2).unwrap()
    }

    #[test]
    fn test_new_tracks_only_head_parameters() {
        let head = head();
        let adam = Adam::new(&head, 0.001);
        let keys: Vec<&str> = adam.state().moments.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["fc1.bias", "fc1.weight", "fc2.bias", "fc2.weight", "fc3.bias", "fc3.weight"]);
        assert_eq!(adam.state().step, 0);
    }

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut head = head();
        let x = Matrix::from_data(vec![vec![1.0, -0.5, 0.25, 2.0]]);
        let out = head.forward(&x, Device::Cpu).unwrap();
        head.backward(&NllLoss::derivative(&out, &[1]), Device::Cpu).unwrap();

        let before: Vec<(String, Matrix, Matrix)> = head.parameters_mut().into_iter()
            .map(|p| (p.name.clone(), p.value.clone(), p.grad.cloned().unwrap()))
            .collect();

        let mut adam = Adam::new(&head, 0.01);
        adam.step(&mut head).unwrap();
        assert_eq!(adam.state().step, 1);

        // With bias correction the first Adam step is lr·g/(|g|+eps) ≈ lr·sign(g).
        let after = head.named_parameters();
        for ((name, old, grad), (after_name, new)) in before.iter().zip(after.iter()) {
            assert_eq!(name, after_name);
            for r in 0..old.rows {
                for c in 0..old.cols {
                    let g = grad.data[r][c];
                    let delta = old.data[r][c] - new.data[r][c];
                    let expected = 0.01 * g / (g.abs() + Adam::EPS);
                    assert!((delta - expected).abs() < 1e-12, "{} moved {} not {}", name, delta, expected);
                }
            }
        }
    }

    #[test]
    fn test_bias_correction_after_many_steps() {
        let mut head = head();
        let x = Matrix::from_data(vec![vec![1.0, -0.5, 0.25, 2.0]]);
        let out = head.forward(&x, Device::Cpu).unwrap();
        head.backward(&NllLoss::derivative(&out, &[0]), Device::Cpu).unwrap();

        let mut state = Adam::new(&head, 0.01).state().clone();
        state.step = u64::from(u32::MAX) + 10;
        let mut adam = Adam::from_state(&head, state).unwrap();

        let before: Vec<(Matrix, Matrix)> = head.parameters_mut().into_iter()
            .map(|p| (p.value.clone(), p.grad.cloned().unwrap()))
            .collect();
        adam.step(&mut head).unwrap();

        // Both corrections have converged to 1: the update is lr·m/(√v+eps).
        for ((old, grad), (_, new)) in before.iter().zip(head.named_parameters()) {
            for r in 0..old.rows {
                for c in 0..old.cols {
                    let g = grad.data[r][c];
                    let m = (1.0 - Adam::BETA1) * g;
                    let v = (1.0 - Adam::BETA2) * g * g;
                    let expected = 0.01 * m / (v.sqrt() + Adam::EPS);
                    let delta = old.data[r][c] - new.data[r][c];
                    assert!(delta.is_finite());
                    assert!((delta - expected).abs() < 1e-10, "moved {} not {}", delta, expected);
                }
            }
        }
    }

    #[test]
    fn test_from_state_validates_shapes() {
        let head = head();
        let adam = Adam::new(&head, 0.001);
        assert!(Adam::from_state(&head, adam.state().clone()).is_ok());

        let other = ClassifierHead::build(4, 5, 2).unwrap();
        assert!(matches!(
            Adam::from_state(&other, adam.state().clone()),
            Err(Error::Checkpoint(_))
        ));
    }
}
