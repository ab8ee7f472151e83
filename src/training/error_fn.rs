use std::fmt::Debug;

/// Computes the output-layer error signal that backpropagation starts from.
///
/// The signal points from `actual` towards `ideal`, so update rules add their deltas.
pub trait ErrorFunction: Debug + Send + Sync {
    /// Writes the error of each output neuron.
    ///
    /// # Arguments
    /// * `ideal` - The expected output row.
    /// * `actual` - The network's output row.
    /// * `error` - Where the per-neuron error will be written to.
    fn calculate_error(&self, ideal: &[f64], actual: &[f64], error: &mut [f64]);
}

/// The plain difference `ideal - actual`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearErrorFunction;

impl ErrorFunction for LinearErrorFunction {
    fn calculate_error(&self, ideal: &[f64], actual: &[f64], error: &mut [f64]) {
        for ((e, i), a) in error.iter_mut().zip(ideal).zip(actual) {
            *e = i - a;
        }
    }
}

/// The arc tangent of the difference, damping the influence of large errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArcTanErrorFunction;

impl ErrorFunction for ArcTanErrorFunction {
    fn calculate_error(&self, ideal: &[f64], actual: &[f64], error: &mut [f64]) {
        for ((e, i), a) in error.iter_mut().zip(ideal).zip(actual) {
            *e = (i - a).atan();
        }
    }
}
