pub mod batch;
pub mod image_folder;
pub mod transform;

pub use batch::{ensure_same_classes, Batch, BatchSource, InMemorySource};
pub use image_folder::ImageFolder;
pub use transform::Transform;
