use crate::activation::activation::ActivationFunction;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::layers::dense::{linear, Dense};
use crate::math::matrix::Matrix;
use crate::network::spec::{HeadSpec, LayerKind};
use crate::network::state_dict::{parameter_from, StateDict};

#[derive(Debug, Clone)]
enum HeadOp {
    Linear(Dense),
    Activation {
        function: ActivationFunction,
        // z and f(z) from the last tracked forward pass
        input: Option<Matrix>,
        output: Option<Matrix>,
    },
}

#[derive(Debug, Clone)]
struct HeadLayer {
    name: String,
    op: HeadOp,
}

/// A trainable parameter together with its current gradient.
pub struct ParamMut<'a> {
    pub name: String,
    pub value: &'a mut Matrix,
    pub grad: Option<&'a Matrix>,
}

/// The trainable classifier attached on top of the frozen backbone.
#[derive(Debug, Clone)]
pub struct ClassifierHead {
    spec: HeadSpec,
    layers: Vec<HeadLayer>,
}

impl ClassifierHead {
    pub fn build(input_width: usize, hidden_width: usize, output_width: usize) -> Result<ClassifierHead> {
        ClassifierHead::from_spec(HeadSpec::standard(input_width, hidden_width, output_width)?)
    }

    /// Instantiates a spec with fresh weights: He init for linear layers
    /// feeding a ReLU, Xavier otherwise, zero biases.
    pub fn from_spec(spec: HeadSpec) -> Result<ClassifierHead> {
        let mut layers = Vec::with_capacity(spec.layers.len());
        for (i, layer) in spec.layers.iter().enumerate() {
            let op = match &layer.kind {
                LayerKind::Linear { in_features, out_features } => {
                    if *in_features == 0 || *out_features == 0 {
                        return Err(Error::InvalidHeadDimensions {
                            input: *in_features,
                            hidden: *out_features,
                            output: spec.output_width(),
                        });
                    }
                    let feeds_relu = matches!(
                        spec.layers.get(i + 1).map(|next| &next.kind),
                        Some(LayerKind::Activation(ActivationFunction::ReLU))
                    );
                    let weights = if feeds_relu {
                        Matrix::he(*in_features, *out_features)
                    } else {
                        Matrix::xavier(*in_features, *out_features)
                    };
                    HeadOp::Linear(Dense::new(weights, Matrix::zeros(1, *out_features)))
                }
                LayerKind::Activation(function) => HeadOp::Activation {
                    function: *function,
                    input: None,
                    output: None,
                },
            };
            layers.push(HeadLayer { name: layer.name.clone(), op });
        }
        Ok(ClassifierHead { spec, layers })
    }

    pub fn spec(&self) -> &HeadSpec {
        &self.spec
    }

    pub fn input_width(&self) -> usize {
        self.spec.input_width()
    }

    pub fn output_width(&self) -> usize {
        self.spec.output_width()
    }

    pub fn parameter_count(&self) -> usize {
        self.linears().map(|(_, dense)| dense.parameter_count()).sum()
    }

    fn linears(&self) -> impl Iterator<Item = (&str, &Dense)> {
        self.layers.iter().filter_map(|layer| match &layer.op {
            HeadOp::Linear(dense) => Some((layer.name.as_str(), dense)),
            HeadOp::Activation { .. } => None,
        })
    }

    /// Tracked forward pass: keeps what `backward()` needs.
    pub fn forward(&mut self, input: &Matrix, device: Device) -> Result<Matrix> {
        let mut current = input.clone();
        for layer in &mut self.layers {
            current = match &mut layer.op {
                HeadOp::Linear(dense) => dense.forward(&current, device, true)?,
                HeadOp::Activation { function, input, output } => {
                    let a = function.apply(&current);
                    *input = Some(current);
                    *output = Some(a.clone());
                    a
                }
            };
        }
        Ok(current)
    }

    /// Untracked forward pass for evaluation.
    pub fn infer(&self, input: &Matrix, device: Device) -> Result<Matrix> {
        let mut current = input.clone();
        for layer in &self.layers {
            current = match &layer.op {
                HeadOp::Linear(dense) => linear(&current, &dense.weights, &dense.biases, device)?,
                HeadOp::Activation { function, .. } => function.apply(&current),
            };
        }
        Ok(current)
    }

    /// Back-propagates ∂L/∂output through every layer, accumulating
    /// gradients on the linear layers.
    pub fn backward(&mut self, grad_output: &Matrix, device: Device) -> Result<()> {
        let mut grad = grad_output.clone();
        for layer in self.layers.iter_mut().rev() {
            grad = match &mut layer.op {
                HeadOp::Linear(dense) => dense.backward(&grad, device)?,
                HeadOp::Activation { function, input, output } => {
                    match (input.as_ref(), output.as_ref()) {
                        (Some(z), Some(a)) => function.backward(&grad, z, a),
                        _ => {
                            return Err(Error::BatchProcessingFailure(format!(
                                "layer '{}' has no tracked forward pass",
                                layer.name
                            )))
                        }
                    }
                }
            };
        }
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        for layer in &mut self.layers {
            if let HeadOp::Linear(dense) = &mut layer.op {
                dense.zero_grad();
            }
        }
    }

    /// Drops activations kept for back-propagation.
    pub fn clear_cache(&mut self) {
        for layer in &mut self.layers {
            match &mut layer.op {
                HeadOp::Linear(dense) => dense.clear_cache(),
                HeadOp::Activation { input, output, .. } => {
                    *input = None;
                    *output = None;
                }
            }
        }
    }

    /// Parameters keyed `<layer>.weight` / `<layer>.bias`, in layer order.
    pub fn named_parameters(&self) -> Vec<(String, &Matrix)> {
        let mut params = Vec::new();
        for (name, dense) in self.linears() {
            params.push((format!("{}.weight", name), &dense.weights));
            params.push((format!("{}.bias", name), &dense.biases));
        }
        params
    }

    pub fn parameters_mut(&mut self) -> Vec<ParamMut<'_>> {
        let mut params = Vec::new();
        for layer in &mut self.layers {
            if let HeadOp::Linear(dense) = &mut layer.op {
                for (suffix, value, grad) in dense.parameters_mut() {
                    params.push(ParamMut {
                        name: format!("{}.{}", layer.name, suffix),
                        value,
                        grad,
                    });
                }
            }
        }
        params
    }

    /// Overwrites every parameter with `state[<prefix><layer>.<weight|bias>]`.
    ///
    /// Nothing is replaced unless every tensor is present with the right shape.
    pub fn load_parameters(&mut self, state: &StateDict, prefix: &str) -> Result<()> {
        let loaded = self.named_parameters().into_iter()
            .map(|(name, value)| parameter_from(state, &format!("{}{}", prefix, name), value.shape()))
            .collect::<Result<Vec<Matrix>>>()?;
        for (param, value) in self.parameters_mut().into_iter().zip(loaded) {
            *param.value = value;
        }
        Ok(())
    }
}
