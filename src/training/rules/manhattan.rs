use super::UpdateRule;

/// Gradients smaller than this are treated as zero.
const ZERO_TOLERANCE: f64 = 1e-17;

/// Moves every weight by a fixed amount in the direction of its gradient, ignoring the
/// gradient's magnitude.
#[derive(Debug, Clone, Copy)]
pub struct ManhattanUpdate {
    learning_rate: f64,
}

impl ManhattanUpdate {
    /// Creates a new `ManhattanUpdate` rule.
    ///
    /// # Arguments
    /// * `learning_rate` - The fixed step taken by every weight.
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl UpdateRule for ManhattanUpdate {
    fn update_weight(&mut self, gradients: &[f64], _: &mut [f64], index: usize, _: f64) -> f64 {
        let g = gradients[index];
        if g.abs() < ZERO_TOLERANCE {
            0.
        } else if g > 0. {
            self.learning_rate
        } else {
            -self.learning_rate
        }
    }

    fn name(&self) -> &'static str {
        "manhattan"
    }
}
