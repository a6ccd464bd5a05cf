use crate::device::Device;
use crate::error::Result;
use crate::math::matrix::Matrix;

/// z = x·W + b for a whole batch. `weights` is (fan_in, fan_out).
pub fn linear(input: &Matrix, weights: &Matrix, biases: &Matrix, device: Device) -> Result<Matrix> {
    input.matmul(weights, device)?.add_row(biases)
}

/// Trainable fully-connected layer.
///
/// Gradients accumulate into `weights_grad` / `biases_grad` until
/// `zero_grad()` clears them, so the optimizer only ever reads what the last
/// backward pass produced.
#[derive(Debug, Clone)]
pub struct Dense {
    pub weights: Matrix,
    pub biases: Matrix,
    pub weights_grad: Option<Matrix>,
    pub biases_grad: Option<Matrix>,
    input: Option<Matrix>,  // batch seen by the last tracked forward pass
}

impl Dense {
    pub fn new(weights: Matrix, biases: Matrix) -> Dense {
        Dense {
            weights,
            biases,
            weights_grad: None,
            biases_grad: None,
            input: None,
        }
    }

    pub fn fan_in(&self) -> usize {
        self.weights.rows
    }

    pub fn fan_out(&self) -> usize {
        self.weights.cols
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    /// Forward pass. When `track` is set the input is kept for `backward()`.
    pub fn forward(&mut self, input: &Matrix, device: Device, track: bool) -> Result<Matrix> {
        let z = linear(input, &self.weights, &self.biases, device)?;
        self.input = if track { Some(input.clone()) } else { None };
        Ok(z)
    }

    /// Accumulates ∂L/∂W and ∂L/∂b from `grad_output` (∂L/∂z) and returns ∂L/∂x.
    pub fn backward(&mut self, grad_output: &Matrix, device: Device) -> Result<Matrix> {
        let input = self.input.as_ref().ok_or_else(|| {
            crate::error::Error::BatchProcessingFailure(
                "backward called without a tracked forward pass".to_string(),
            )
        })?;

        let weights_grad = input.transpose().matmul(grad_output, device)?;
        let biases_grad = grad_output.sum_rows();
        let grad_input = grad_output.matmul(&self.weights.transpose(), device)?;

        accumulate(&mut self.weights_grad, weights_grad)?;
        accumulate(&mut self.biases_grad, biases_grad)?;
        Ok(grad_input)
    }

    /// `(suffix, value, grad)` for the weight and bias tensors.
    pub fn parameters_mut(&mut self) -> [(&'static str, &mut Matrix, Option<&Matrix>); 2] {
        [
            ("weight", &mut self.weights, self.weights_grad.as_ref()),
            ("bias", &mut self.biases, self.biases_grad.as_ref()),
        ]
    }

    pub fn zero_grad(&mut self) {
        self.weights_grad = None;
        self.biases_grad = None;
    }

    pub fn clear_cache(&mut self) {
        self.input = None;
    }
}

fn accumulate(slot: &mut Option<Matrix>, grad: Matrix) -> Result<()> {
    match slot {
        Some(existing) => existing.add_assign(&grad),
        None => {
            *slot = Some(grad);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> Dense {
        Dense::new(
            Matrix::from_data(vec![vec![1.0, -1.0], vec![0.5, 2.0], vec![0.0, 1.0]]),
            Matrix::from_data(vec![vec![0.1, 0.2]]),
        )
    }

    #[test]
    fn test_forward_shape_and_values() {
        let mut dense = layer();
        let x = Matrix::from_data(vec![vec![1.0, 2.0, 3.0]]);
        let z = dense.forward(&x, Device::Cpu, false).unwrap();
        assert_eq!(z.shape(), (1, 2));
        assert!((z.data[0][0] - 2.1).abs() < 1e-12);
        assert!((z.data[0][1] - 6.2).abs() < 1e-12);
    }

    #[test]
    fn test_backward_requires_tracked_forward() {
        let mut dense = layer();
        let x = Matrix::from_data(vec![vec![1.0, 2.0, 3.0]]);
        dense.forward(&x, Device::Cpu, false).unwrap();
        let g = Matrix::from_data(vec![vec![1.0, 1.0]]);
        assert!(dense.backward(&g, Device::Cpu).is_err());
    }

    #[test]
    fn test_backward_gradients() {
        let mut dense = layer();
        let x = Matrix::from_data(vec![vec![1.0, 2.0, 3.0], vec![0.0, 1.0, 0.0]]);
        dense.forward(&x, Device::Cpu, true).unwrap();
        let g = Matrix::from_data(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let dx = dense.backward(&g, Device::Cpu).unwrap();

        // dW = xᵀ·g
        assert_eq!(
            dense.weights_grad.as_ref().unwrap().data,
            vec![vec![1.0, 0.0], vec![2.0, 1.0], vec![3.0, 0.0]]
        );
        assert_eq!(dense.biases_grad.as_ref().unwrap().data, vec![vec![1.0, 1.0]]);
        // dx = g·Wᵀ
        assert_eq!(dx.data, vec![vec![1.0, 0.5, 0.0], vec![-1.0, 2.0, 1.0]]);

        dense.zero_grad();
        assert!(dense.weights_grad.is_none());
    }
}
