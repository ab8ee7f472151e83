use std::collections::BTreeMap;

use crate::error::ConfigErr;

/// Saved per-weight state of an update rule, keyed by name.
pub type RuleState = BTreeMap<String, Vec<f64>>;

/// Defines how a weight changes given the merged gradient.
///
/// The trainer calls `update_weight` once per weight index after every gradient pass and adds
/// the returned delta to the weight. Gradients point from the network's output towards the
/// ideal output, so a positive delta follows the gradient.
pub trait UpdateRule: Send {
    /// Sizes any per-weight state. Called once by the trainer before the first pass. It must
    /// keep existing state of the right length, so state imported beforehand survives.
    fn init(&mut self, _weight_count: usize) {}

    /// Computes the change of one weight.
    ///
    /// # Arguments
    /// * `gradients` - The merged gradient of the current pass.
    /// * `last_gradient` - The gradient the rule kept from the previous pass. Rules that need
    ///   it are responsible for updating it.
    /// * `index` - The index of the weight being updated.
    /// * `weight` - The current value of that weight.
    ///
    /// # Returns
    /// The delta to add to the weight.
    fn update_weight(
        &mut self,
        gradients: &[f64],
        last_gradient: &mut [f64],
        index: usize,
        weight: f64,
    ) -> f64;

    /// A stable name identifying the rule inside a training continuation.
    fn name(&self) -> &'static str;

    /// Exports the rule's per-weight state.
    fn export_state(&self) -> RuleState {
        RuleState::new()
    }

    /// Restores state previously produced by `export_state`.
    ///
    /// # Returns
    /// A `ConfigErr` if some entry is missing or has the wrong length.
    fn import_state(&mut self, _state: &RuleState) -> Result<(), ConfigErr> {
        Ok(())
    }
}

impl<R: UpdateRule + ?Sized> UpdateRule for Box<R> {
    fn init(&mut self, weight_count: usize) {
        (**self).init(weight_count)
    }

    fn update_weight(
        &mut self,
        gradients: &[f64],
        last_gradient: &mut [f64],
        index: usize,
        weight: f64,
    ) -> f64 {
        (**self).update_weight(gradients, last_gradient, index, weight)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn export_state(&self) -> RuleState {
        (**self).export_state()
    }

    fn import_state(&mut self, state: &RuleState) -> Result<(), ConfigErr> {
        (**self).import_state(state)
    }
}

/// An update rule given by a closure with the signature of [`UpdateRule::update_weight`].
pub struct FnRule<F>(pub F);

impl<F> UpdateRule for FnRule<F>
where
    F: FnMut(&[f64], &mut [f64], usize, f64) -> f64 + Send,
{
    fn update_weight(
        &mut self,
        gradients: &[f64],
        last_gradient: &mut [f64],
        index: usize,
        weight: f64,
    ) -> f64 {
        (self.0)(gradients, last_gradient, index, weight)
    }

    fn name(&self) -> &'static str {
        "fn"
    }
}

/// Takes the entry `key` out of `state`, checking its length.
pub(super) fn restore(state: &RuleState, key: &str, len: usize) -> Result<Vec<f64>, ConfigErr> {
    let values = state
        .get(key)
        .ok_or_else(|| ConfigErr::Continuation(format!("missing `{key}`")))?;

    if values.len() != len {
        return Err(ConfigErr::Continuation(format!(
            "`{key}` holds {} values, expected {len}",
            values.len()
        )));
    }

    Ok(values.clone())
}

/// Resizes `buf` to `len` zeros unless it already has that length.
pub(super) fn ensure_len(buf: &mut Vec<f64>, len: usize, fill: f64) {
    if buf.len() != len {
        *buf = vec![fill; len];
    }
}
