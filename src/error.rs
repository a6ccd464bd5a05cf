//! Error types shared by every stage of a training run.

use thiserror::Error;

/// Every failure a training run can hit. None of them are recovered locally;
/// they all unwind to the caller and abort the run before a checkpoint is written.
#[derive(Error, Debug)]
pub enum Error {
    /// Architecture name outside the fixed registry.
    #[error("unsupported architecture '{0}' (expected one of: vgg16, densenet121)")]
    UnsupportedArchitecture(String),

    /// A classifier head was requested with a zero width.
    #[error("invalid head dimensions: input={input}, hidden={hidden}, output={output}")]
    InvalidHeadDimensions {
        input: usize,
        hidden: usize,
        output: usize,
    },

    /// An accelerator was requested but none exists.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Pretrained weights could not be fetched, decoded or validated.
    #[error("failed to load pretrained backbone '{arch}': {reason}")]
    BackboneLoadFailure { arch: String, reason: String },

    /// Numerical or shape failure while processing a batch.
    #[error("batch processing failed: {0}")]
    BatchProcessingFailure(String),

    /// Checkpoint artifact is malformed or inconsistent with the registry.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image processing error: {0}")]
    Image(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
