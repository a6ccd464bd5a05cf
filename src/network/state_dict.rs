use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::math::matrix::Matrix;

/// Every parameter of a model keyed by its dotted path
/// (`features.0.weight`, `classifier.fc1.bias`, ...).
pub type StateDict = BTreeMap<String, Matrix>;

/// Copies `key` out of `state`, insisting on the expected shape.
pub fn parameter_from(state: &StateDict, key: &str, shape: (usize, usize)) -> Result<Matrix> {
    let value = state
        .get(key)
        .ok_or_else(|| Error::Checkpoint(format!("state dict is missing '{}'", key)))?;
    if value.shape() != shape {
        return Err(Error::Checkpoint(format!(
            "'{}' has shape {}x{}, model expects {}x{}",
            key, value.rows, value.cols, shape.0, shape.1
        )));
    }
    Ok(value.clone())
}
