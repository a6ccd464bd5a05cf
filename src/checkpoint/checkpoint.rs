//! Versioned, self-describing training checkpoint.
//!
//! On-disk layout: `MAGIC` (4 bytes), `FORMAT_VERSION` as little-endian
//! `u32`, then the bincode-encoded [`Checkpoint`] record.

use serde::{Serialize, Deserialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backbone::architecture::Architecture;
use crate::backbone::registry::BackboneRegistry;
use crate::data::batch::BatchSource;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::network::head::ClassifierHead;
use crate::network::metadata::ClassToIdx;
use crate::network::network::Network;
use crate::network::spec::HeadSpec;
use crate::network::state_dict::StateDict;
use crate::optim::adam::{Adam, AdamState};

pub const MAGIC: [u8; 4] = *b"FPCK";
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = MAGIC.len() + 4;

/// Everything needed to rebuild a trained model, resume training or run
/// inference. Never carries training-loop state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    pub pretrained_model: Architecture,
    /// Backbone feature width feeding the head.
    pub input_size: usize,
    pub output_size: usize,
    pub learning_rate: f64,
    pub hidden_units: usize,
    pub classifier: HeadSpec,
    /// Epochs completed.
    pub epochs: usize,
    pub state_dict: StateDict,
    pub class_to_idx: ClassToIdx,
    pub optimizer: AdamState,
}

/// Attaches the source's class mapping to `network` and writes a checkpoint
/// to `path`, replacing whatever was there.
///
/// The metadata must describe `network` and `optimizer` exactly, so that
/// whatever is written can be restored; a mismatch writes nothing.
#[allow(clippy::too_many_arguments)]
pub fn save_checkpoint(
    path: &Path,
    network: &mut Network,
    class_source: &dyn BatchSource,
    epochs: usize,
    optimizer: &Adam,
    learning_rate: f64,
    input_size: usize,
    output_size: usize,
    arch: Architecture,
    hidden_units: usize,
) -> Result<Checkpoint> {
    check_metadata(network, optimizer, learning_rate, input_size, output_size, arch, hidden_units)?;
    network.class_to_idx = Some(class_source.class_to_idx().clone());

    let checkpoint = Checkpoint {
        format_version: FORMAT_VERSION,
        pretrained_model: arch,
        input_size,
        output_size,
        learning_rate,
        hidden_units,
        classifier: network.classifier.spec().clone(),
        epochs,
        state_dict: network.state_dict(),
        class_to_idx: class_source.class_to_idx().clone(),
        optimizer: optimizer.state().clone(),
    };
    checkpoint.write(path)?;
    Ok(checkpoint)
}

fn check_metadata(
    network: &Network,
    optimizer: &Adam,
    learning_rate: f64,
    input_size: usize,
    output_size: usize,
    arch: Architecture,
    hidden_units: usize,
) -> Result<()> {
    let backbone = network.backbone();
    if arch != backbone.architecture() {
        return Err(Error::Checkpoint(format!(
            "architecture {} does not match the model's {} backbone",
            arch,
            backbone.architecture()
        )));
    }
    if input_size != backbone.feature_width() {
        return Err(Error::Checkpoint(format!(
            "input_size {} does not match the backbone feature width {}",
            input_size,
            backbone.feature_width()
        )));
    }
    if output_size != network.classifier.output_width() {
        return Err(Error::Checkpoint(format!(
            "output_size {} does not match the head's {} outputs",
            output_size,
            network.classifier.output_width()
        )));
    }
    let expected = HeadSpec::standard(input_size, hidden_units, output_size).ok();
    if expected.as_ref() != Some(network.classifier.spec()) {
        return Err(Error::Checkpoint(format!(
            "hidden_units {} does not describe the model's classifier",
            hidden_units
        )));
    }
    if learning_rate != optimizer.learning_rate() {
        return Err(Error::Checkpoint(format!(
            "learning_rate {} differs from the optimizer's {}",
            learning_rate,
            optimizer.learning_rate()
        )));
    }
    Ok(())
}

impl Checkpoint {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(HEADER_LEN);
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend(bincode::serialize(self)?);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Checkpoint> {
        if bytes.len() < HEADER_LEN || bytes[..MAGIC.len()] != MAGIC {
            return Err(Error::Checkpoint("not a checkpoint file (bad magic)".to_string()));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[MAGIC.len()..HEADER_LEN]);
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(Error::Checkpoint(format!(
                "unsupported checkpoint format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }

        let checkpoint: Checkpoint = bincode::deserialize(&bytes[HEADER_LEN..])?;
        if checkpoint.format_version != version {
            return Err(Error::Checkpoint(format!(
                "header version {} disagrees with record version {}",
                version, checkpoint.format_version
            )));
        }
        Ok(checkpoint)
    }

    /// Writes to a sibling temp file, then renames it over `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = self.to_bytes()?;
        let tmp = temp_path(path);
        if let Err(e) = write_synced(&tmp, &bytes).and_then(|()| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        info!(
            "Saved {} checkpoint ({} epochs, {} tensors, {} bytes) to {:?}",
            self.pretrained_model,
            self.epochs,
            self.state_dict.len(),
            bytes.len(),
            path
        );
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Checkpoint> {
        let bytes = fs::read(path)?;
        Checkpoint::from_bytes(&bytes)
    }

    /// Rebuilds the model and optimizer exactly as they were saved.
    ///
    /// The backbone comes from `registry`, the head from the stored widths;
    /// the rebuilt head must match the stored definition before any
    /// parameter is loaded.
    pub fn restore(&self, registry: &BackboneRegistry, device: Device) -> Result<(Network, Adam)> {
        let (backbone, feature_width) = registry.resolve_architecture(self.pretrained_model)?;
        if feature_width != self.input_size {
            return Err(Error::Checkpoint(format!(
                "checkpoint input_size {} does not match {} feature width {}",
                self.input_size, self.pretrained_model, feature_width
            )));
        }

        let head = ClassifierHead::build(feature_width, self.hidden_units, self.output_size)?;
        if head.spec() != &self.classifier {
            return Err(Error::Checkpoint(
                "stored classifier definition does not match the rebuilt head".to_string(),
            ));
        }

        let mut network = Network::new(backbone, head, device)?;
        network.load_state_dict(&self.state_dict)?;
        network.class_to_idx = Some(self.class_to_idx.clone());
        let optimizer = Adam::from_state(&network.classifier, self.optimizer.clone())?;
        Ok((network, optimizer))
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
