use tracing::info;

use crate::backbone::backbone::Backbone;
use crate::backbone::registry::BackboneRegistry;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::math::matrix::Matrix;
use crate::network::head::ClassifierHead;
use crate::network::metadata::ClassToIdx;
use crate::network::spec::OUTPUT_CLASSES;
use crate::network::state_dict::StateDict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Frozen backbone + trainable classifier head, bound to one device.
pub struct Network {
    backbone: Backbone,
    pub classifier: ClassifierHead,
    device: Device,
    mode: Mode,
    /// Attached when the model is checkpointed.
    pub class_to_idx: Option<ClassToIdx>,
}

/// Resolves the device and backbone, builds the head on top and binds the
/// result. Returns `(model, device, feature_width)`.
pub fn assemble(
    registry: &BackboneRegistry,
    arch: &str,
    hidden_units: usize,
    use_accelerator: bool,
) -> Result<(Network, Device, usize)> {
    let device = Device::select(use_accelerator)?;
    assemble_on(registry, arch, hidden_units, device)
}

/// `assemble` with an already resolved device.
pub fn assemble_on(
    registry: &BackboneRegistry,
    arch: &str,
    hidden_units: usize,
    device: Device,
) -> Result<(Network, Device, usize)> {
    let (backbone, feature_width) = registry.resolve(arch)?;
    let classifier = ClassifierHead::build(feature_width, hidden_units, OUTPUT_CLASSES)?;
    let network = Network::new(backbone, classifier, device)?;
    info!(
        "Assembled {} + classifier({} -> {} -> {}): {} trainable / {} frozen parameters on {}",
        arch,
        feature_width,
        hidden_units,
        OUTPUT_CLASSES,
        network.trainable_parameter_count(),
        network.frozen_parameter_count(),
        device
    );
    Ok((network, device, feature_width))
}

impl Network {
    pub fn new(backbone: Backbone, classifier: ClassifierHead, device: Device) -> Result<Network> {
        if classifier.input_width() != backbone.feature_width() {
            return Err(Error::InvalidHeadDimensions {
                input: classifier.input_width(),
                hidden: backbone.feature_width(),
                output: classifier.output_width(),
            });
        }
        Ok(Network {
            backbone,
            classifier,
            device,
            mode: Mode::Train,
            class_to_idx: None,
        })
    }

    pub fn backbone(&self) -> &Backbone {
        &self.backbone
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn train(&mut self) {
        self.mode = Mode::Train;
    }

    /// Switches to evaluation: forward passes stop keeping activations.
    pub fn eval(&mut self) {
        self.mode = Mode::Eval;
        self.classifier.clear_cache();
    }

    pub fn input_width(&self) -> usize {
        self.backbone.input_width()
    }

    pub fn output_width(&self) -> usize {
        self.classifier.output_width()
    }

    pub fn trainable_parameter_count(&self) -> usize {
        self.classifier.parameter_count()
    }

    pub fn frozen_parameter_count(&self) -> usize {
        self.backbone.parameter_count()
    }

    /// Class log-probabilities for a batch. Activations are only kept in
    /// train mode.
    pub fn forward(&mut self, inputs: &Matrix) -> Result<Matrix> {
        let features = self.backbone.extract(inputs, self.device)?;
        match self.mode {
            Mode::Train => self.classifier.forward(&features, self.device),
            Mode::Eval => self.classifier.infer(&features, self.device),
        }
    }

    /// Gradient-free forward pass, usable regardless of mode.
    pub fn predict(&self, inputs: &Matrix) -> Result<Matrix> {
        let features = self.backbone.extract(inputs, self.device)?;
        self.classifier.infer(&features, self.device)
    }

    /// Back-propagates into the classifier head only; the backbone has no
    /// gradients to receive.
    pub fn backward(&mut self, grad_output: &Matrix) -> Result<()> {
        if self.mode != Mode::Train {
            return Err(Error::BatchProcessingFailure(
                "backward called in eval mode".to_string(),
            ));
        }
        self.classifier.backward(grad_output, self.device)
    }

    pub fn zero_grad(&mut self) {
        self.classifier.zero_grad();
    }

    /// Every parameter, backbone (`features.*`) and head (`classifier.*`).
    pub fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for (name, value) in self.backbone.named_parameters() {
            state.insert(name, value.clone());
        }
        for (name, value) in self.classifier.named_parameters() {
            state.insert(format!("classifier.{}", name), value.clone());
        }
        state
    }

    /// Strict load: every key must be present with the same shape, and no
    /// extra keys are tolerated.
    pub fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let expected = self.backbone.named_parameters().len() + self.classifier.named_parameters().len();
        if state.len() != expected {
            return Err(Error::Checkpoint(format!(
                "state dict has {} tensors, model has {}",
                state.len(),
                expected
            )));
        }
        let backbone = self.backbone.with_parameters(state)?;
        self.classifier.load_parameters(state, "classifier.")?;
        self.backbone = backbone;
        Ok(())
    }
}
