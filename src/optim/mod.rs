pub mod adam;

pub use adam::{Adam, AdamState, Moments};
