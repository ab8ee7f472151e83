use super::{RuleState, UpdateRule, rule};
use crate::error::ConfigErr;

pub const DEFAULT_INITIAL_UPDATE: f64 = 0.1;
pub const DEFAULT_MAX_STEP: f64 = 50.;

const POSITIVE_ETA: f64 = 1.2;
const NEGATIVE_ETA: f64 = 0.5;
const DELTA_MIN: f64 = 1e-6;
const ZERO_TOLERANCE: f64 = 1e-17;

const UPDATE_VALUES: &str = "update_values";
const LAST_WEIGHT_CHANGE: &str = "last_weight_change";

/// Resilient propagation (RPROP+) with weight backtracking.
///
/// Each weight carries its own step size, grown while the gradient keeps its sign and shrunk
/// when it flips. Only the gradient's sign is used.
#[derive(Debug, Clone)]
pub struct ResilientPropagation {
    initial_update: f64,
    max_step: f64,
    update_values: Vec<f64>,
    last_weight_change: Vec<f64>,
}

impl Default for ResilientPropagation {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_UPDATE, DEFAULT_MAX_STEP)
    }
}

impl ResilientPropagation {
    /// Creates a new `ResilientPropagation` rule.
    ///
    /// # Arguments
    /// * `initial_update` - The step size every weight starts with.
    /// * `max_step` - The largest step size a weight may reach.
    pub fn new(initial_update: f64, max_step: f64) -> Self {
        Self {
            initial_update,
            max_step,
            update_values: Vec::new(),
            last_weight_change: Vec::new(),
        }
    }

    /// The current step size of every weight.
    pub fn update_values(&self) -> &[f64] {
        &self.update_values
    }
}

fn sign(value: f64) -> f64 {
    if value.abs() < ZERO_TOLERANCE {
        0.
    } else if value > 0. {
        1.
    } else {
        -1.
    }
}

impl UpdateRule for ResilientPropagation {
    fn init(&mut self, weight_count: usize) {
        rule::ensure_len(&mut self.update_values, weight_count, self.initial_update);
        rule::ensure_len(&mut self.last_weight_change, weight_count, 0.);
    }

    fn update_weight(
        &mut self,
        gradients: &[f64],
        last_gradient: &mut [f64],
        index: usize,
        _: f64,
    ) -> f64 {
        let gradient = gradients[index];
        let change = sign(gradient * last_gradient[index]);

        let weight_change = if change > 0. {
            let delta = (self.update_values[index] * POSITIVE_ETA).min(self.max_step);
            self.update_values[index] = delta;
            last_gradient[index] = gradient;
            sign(gradient) * delta
        } else if change < 0. {
            // Sign flip: the last step overshot, so take it back.
            let delta = (self.update_values[index] * NEGATIVE_ETA).max(DELTA_MIN);
            self.update_values[index] = delta;
            last_gradient[index] = 0.;
            -self.last_weight_change[index]
        } else {
            last_gradient[index] = gradient;
            sign(gradient) * self.update_values[index]
        };

        self.last_weight_change[index] = weight_change;
        weight_change
    }

    fn name(&self) -> &'static str {
        "resilient_propagation"
    }

    fn export_state(&self) -> RuleState {
        RuleState::from([
            (UPDATE_VALUES.to_owned(), self.update_values.clone()),
            (LAST_WEIGHT_CHANGE.to_owned(), self.last_weight_change.clone()),
        ])
    }

    fn import_state(&mut self, state: &RuleState) -> Result<(), ConfigErr> {
        let update_values = rule::restore(state, UPDATE_VALUES, self.update_values.len())?;
        let last_weight_change =
            rule::restore(state, LAST_WEIGHT_CHANGE, self.last_weight_change.len())?;

        self.update_values = update_values;
        self.last_weight_change = last_weight_change;
        Ok(())
    }
}
