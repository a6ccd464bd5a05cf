use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};

/// Number of flower species the classifier predicts.
pub const OUTPUT_CLASSES: usize = 102;

/// What a single head layer computes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    Linear { in_features: usize, out_features: usize },
    Activation(ActivationFunction),
}

/// One named layer in a head specification.
///
/// Names are part of the checkpoint contract: parameters are stored as
/// `classifier.<name>.weight` / `classifier.<name>.bias`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub kind: LayerKind,
}

impl LayerSpec {
    fn linear(name: &str, in_features: usize, out_features: usize) -> LayerSpec {
        LayerSpec {
            name: name.to_string(),
            kind: LayerKind::Linear { in_features, out_features },
        }
    }

    fn activation(name: &str, function: ActivationFunction) -> LayerSpec {
        LayerSpec {
            name: name.to_string(),
            kind: LayerKind::Activation(function),
        }
    }
}

/// Serializable description of the classifier head's topology, in forward
/// order. Carries no parameter values, so two specs built from the same
/// widths always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadSpec {
    pub layers: Vec<LayerSpec>,
}

impl HeadSpec {
    /// fc1 → relu1 → fc2 → relu2 → fc3 → output(log-softmax).
    pub fn standard(input_width: usize, hidden_width: usize, output_width: usize) -> Result<HeadSpec> {
        if input_width == 0 || hidden_width == 0 || output_width == 0 {
            return Err(Error::InvalidHeadDimensions {
                input: input_width,
                hidden: hidden_width,
                output: output_width,
            });
        }
        Ok(HeadSpec {
            layers: vec![
                LayerSpec::linear("fc1", input_width, hidden_width),
                LayerSpec::activation("relu1", ActivationFunction::ReLU),
                LayerSpec::linear("fc2", hidden_width, hidden_width),
                LayerSpec::activation("relu2", ActivationFunction::ReLU),
                LayerSpec::linear("fc3", hidden_width, output_width),
                LayerSpec::activation("output", ActivationFunction::LogSoftmax),
            ],
        })
    }

    fn linear_widths(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.layers.iter().filter_map(|layer| match layer.kind {
            LayerKind::Linear { in_features, out_features } => Some((in_features, out_features)),
            LayerKind::Activation(_) => None,
        })
    }

    pub fn input_width(&self) -> usize {
        self.linear_widths().next().map_or(0, |(i, _)| i)
    }

    pub fn output_width(&self) -> usize {
        self.linear_widths().last().map_or(0, |(_, o)| o)
    }

    pub fn parameter_count(&self) -> usize {
        self.linear_widths().map(|(i, o)| i * o + o).sum()
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name.as_str()).collect()
    }
}
