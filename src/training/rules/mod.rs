mod backprop;
mod manhattan;
mod rprop;
mod rule;

pub use backprop::Backpropagation;
pub use manhattan::ManhattanUpdate;
pub use rprop::{DEFAULT_INITIAL_UPDATE, DEFAULT_MAX_STEP, ResilientPropagation};
pub use rule::{FnRule, RuleState, UpdateRule};
