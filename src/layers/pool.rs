use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::math::matrix::Matrix;

/// Shape of one channel-major (C, H, W) sample flattened into a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl InputShape {
    pub fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Non-overlapping k×k average pooling over channel-major rows.
/// Trailing rows/columns that do not fill a full window are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvgPool2d {
    pub input: InputShape,
    pub kernel: usize,
}

impl AvgPool2d {
    pub fn new(input: InputShape, kernel: usize) -> Result<AvgPool2d> {
        if kernel == 0 || kernel > input.height || kernel > input.width {
            return Err(Error::Config(format!(
                "pool kernel {} does not fit a {}x{} input",
                kernel, input.height, input.width
            )));
        }
        Ok(AvgPool2d { input, kernel })
    }

    pub fn output_shape(&self) -> InputShape {
        InputShape {
            channels: self.input.channels,
            height: self.input.height / self.kernel,
            width: self.input.width / self.kernel,
        }
    }

    pub fn forward(&self, x: &Matrix) -> Result<Matrix> {
        if x.cols != self.input.len() {
            return Err(Error::BatchProcessingFailure(format!(
                "pool expects rows of width {}, got {}",
                self.input.len(),
                x.cols
            )));
        }
        let out = self.output_shape();
        let k = self.kernel;
        let area = (k * k) as f64;
        let (h, w) = (self.input.height, self.input.width);

        let data = x.data.iter()
            .map(|row| {
                let mut pooled = Vec::with_capacity(out.len());
                for c in 0..out.channels {
                    let plane = &row[c * h * w..(c + 1) * h * w];
                    for oy in 0..out.height {
                        for ox in 0..out.width {
                            let mut sum = 0.0;
                            for dy in 0..k {
                                let start = (oy * k + dy) * w + ox * k;
                                sum += plane[start..start + k].iter().sum::<f64>();
                            }
                            pooled.push(sum / area);
                        }
                    }
                }
                pooled
            })
            .collect();

        Ok(Matrix { rows: x.rows, cols: out.len(), data })
    }
}
