use serde::{Serialize, Deserialize};

use crate::math::matrix::Matrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLU,
    Identity,
    /// Row-wise log-softmax. It is vector-valued, so `apply()` and
    /// `backward()` handle it per row instead of element-wise.
    LogSoftmax,
}

impl ActivationFunction {
    /// Applies the activation to every row of a batch.
    pub fn apply(&self, z: &Matrix) -> Matrix {
        match self {
            ActivationFunction::ReLU => z.map(|x| if x > 0.0 { x } else { 0.0 }),
            ActivationFunction::Identity => z.clone(),
            ActivationFunction::LogSoftmax => Matrix {
                rows: z.rows,
                cols: z.cols,
                data: z.data.iter().map(|row| log_softmax(row)).collect(),
            },
        }
    }

    /// Maps ∂L/∂a back to ∂L/∂z.
    ///
    /// `input` is the pre-activation z and `output` the activation a = f(z)
    /// recorded on the forward pass. ReLU masks by z; log-softmax uses
    /// ∂L/∂z_i = g_i − softmax(z)_i · Σ_j g_j, with softmax recovered as exp(a).
    pub fn backward(&self, grad_output: &Matrix, input: &Matrix, output: &Matrix) -> Matrix {
        match self {
            ActivationFunction::ReLU => Matrix {
                rows: grad_output.rows,
                cols: grad_output.cols,
                data: grad_output.data.iter().zip(input.data.iter())
                    .map(|(g_row, z_row)| {
                        g_row.iter().zip(z_row.iter())
                            .map(|(g, z)| if *z > 0.0 { *g } else { 0.0 })
                            .collect()
                    })
                    .collect(),
            },
            ActivationFunction::Identity => grad_output.clone(),
            ActivationFunction::LogSoftmax => Matrix {
                rows: grad_output.rows,
                cols: grad_output.cols,
                data: grad_output.data.iter().zip(output.data.iter())
                    .map(|(g_row, a_row)| {
                        let g_sum: f64 = g_row.iter().sum();
                        g_row.iter().zip(a_row.iter())
                            .map(|(g, a)| g - a.exp() * g_sum)
                            .collect()
                    })
                    .collect(),
            },
        }
    }
}

/// Numerically stable log-softmax of one row.
fn log_softmax(row: &[f64]) -> Vec<f64> {
    let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let log_sum = row.iter().map(|x| (x - max).exp()).sum::<f64>().ln() + max;
    row.iter().map(|x| x - log_sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_softmax_rows_are_normalized() {
        let z = Matrix::from_data(vec![vec![1.0, 2.0, 3.0], vec![1000.0, 1000.0, 999.0]]);
        let a = ActivationFunction::LogSoftmax.apply(&z);
        for row in &a.data {
            let total: f64 = row.iter().map(|x| x.exp()).sum();
            assert!((total - 1.0).abs() < 1e-12);
            assert!(row.iter().all(|x| x.is_finite()));
        }
    }

    #[test]
    fn test_relu_backward_masks_negative_inputs() {
        let z = Matrix::from_data(vec![vec![-1.0, 0.5, 2.0]]);
        let a = ActivationFunction::ReLU.apply(&z);
        let g = Matrix::from_data(vec![vec![3.0, 3.0, 3.0]]);
        let dz = ActivationFunction::ReLU.backward(&g, &z, &a);
        assert_eq!(dz.data, vec![vec![0.0, 3.0, 3.0]]);
    }

    #[test]
    fn test_log_softmax_backward_with_nll_gradient() {
        // NLL gradient on log-probs is -1 at the label; combined with
        // log-softmax it must give softmax - one_hot.
        let z = Matrix::from_data(vec![vec![0.2, -0.4, 1.1]]);
        let a = ActivationFunction::LogSoftmax.apply(&z);
        let g = Matrix::from_data(vec![vec![0.0, -1.0, 0.0]]);
        let dz = ActivationFunction::LogSoftmax.backward(&g, &z, &a);
        for (j, d) in dz.data[0].iter().enumerate() {
            let expected = a.data[0][j].exp() - if j == 1 { 1.0 } else { 0.0 };
            assert!((d - expected).abs() < 1e-12);
        }
    }
}
