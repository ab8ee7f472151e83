use super::{RuleState, UpdateRule, rule};
use crate::error::ConfigErr;

const LAST_DELTA: &str = "last_delta";

/// Gradient descent with momentum.
#[derive(Debug, Clone)]
pub struct Backpropagation {
    learning_rate: f64,
    momentum: f64,
    last_delta: Vec<f64>,
}

impl Backpropagation {
    /// Creates a new `Backpropagation` rule.
    ///
    /// # Arguments
    /// * `learning_rate` - The coefficient applied to the gradient.
    /// * `momentum` - The coefficient applied to the previous delta.
    pub fn new(learning_rate: f64, momentum: f64) -> Self {
        Self {
            learning_rate,
            momentum,
            last_delta: Vec::new(),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    pub fn set_momentum(&mut self, momentum: f64) {
        self.momentum = momentum;
    }
}

impl UpdateRule for Backpropagation {
    fn init(&mut self, weight_count: usize) {
        rule::ensure_len(&mut self.last_delta, weight_count, 0.);
    }

    fn update_weight(&mut self, gradients: &[f64], _: &mut [f64], index: usize, _: f64) -> f64 {
        let delta = gradients[index] * self.learning_rate + self.last_delta[index] * self.momentum;
        self.last_delta[index] = delta;
        delta
    }

    fn name(&self) -> &'static str {
        "backpropagation"
    }

    fn export_state(&self) -> RuleState {
        RuleState::from([(LAST_DELTA.to_owned(), self.last_delta.clone())])
    }

    fn import_state(&mut self, state: &RuleState) -> Result<(), ConfigErr> {
        self.last_delta = rule::restore(state, LAST_DELTA, self.last_delta.len())?;
        Ok(())
    }
}
