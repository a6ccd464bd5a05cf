pub mod head;
pub mod metadata;
pub mod network;
pub mod spec;
pub mod state_dict;

pub use head::ClassifierHead;
pub use metadata::{ClassToIdx, CategoryNames};
pub use network::{assemble, assemble_on, Mode, Network};
pub use spec::{HeadSpec, LayerKind, LayerSpec, OUTPUT_CLASSES};
pub use state_dict::StateDict;
