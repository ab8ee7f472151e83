mod activation;
mod flat;

pub use activation::{ActivationFn, SIGMOID_FLAT_SPOT};
pub use flat::{FlatLayer, FlatNetwork};
