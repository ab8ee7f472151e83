use serde::{Deserialize, Serialize};

use super::rules::RuleState;
use crate::error::ConfigErr;

/// The state a paused trainer needs to carry on exactly where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingContinuation {
    /// The name of the update rule that produced this state.
    pub trainer: String,
    pub last_gradient: Vec<f64>,
    pub state: RuleState,
}

impl TrainingContinuation {
    pub fn new(trainer: &str, last_gradient: Vec<f64>, state: RuleState) -> Self {
        Self {
            trainer: trainer.to_owned(),
            last_gradient,
            state,
        }
    }

    /// Checks that this continuation can resume a trainer.
    ///
    /// # Arguments
    /// * `trainer` - The name of the resuming trainer's update rule.
    /// * `weight_count` - The length of the resuming trainer's weight vector.
    pub fn validate(&self, trainer: &str, weight_count: usize) -> Result<(), ConfigErr> {
        if self.trainer != trainer {
            return Err(ConfigErr::Continuation(format!(
                "produced by `{}`, cannot resume `{trainer}`",
                self.trainer
            )));
        }

        if self.last_gradient.len() != weight_count {
            return Err(ConfigErr::Continuation(format!(
                "holds {} gradients, the network has {weight_count} weights",
                self.last_gradient.len()
            )));
        }

        Ok(())
    }
}
