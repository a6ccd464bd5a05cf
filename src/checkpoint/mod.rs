pub mod checkpoint;

pub use checkpoint::{save_checkpoint, Checkpoint, FORMAT_VERSION, MAGIC};
