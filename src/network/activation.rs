use serde::{Deserialize, Serialize};

/// The flat spot correction applied to sigmoid-shaped activations.
pub const SIGMOID_FLAT_SPOT: f64 = 0.1;

/// The activation function of a layer.
///
/// Activations carry no per-call state, so network clones can share nothing and still
/// evaluate identically.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFn {
    Linear,
    Sigmoid,
    Tanh,
    Elliott { slope: f64 },
    ElliottSymmetric { slope: f64 },
}

use ActivationFn::*;

impl ActivationFn {
    /// Applies the activation in place over a slice of layer sums.
    ///
    /// # Arguments
    /// * `values` - The sums of a layer, overwritten with its outputs.
    pub fn activate(&self, values: &mut [f64]) {
        match *self {
            Linear => {}
            Sigmoid => values.iter_mut().for_each(|v| *v = 1. / (1. + (-*v).exp())),
            Tanh => values.iter_mut().for_each(|v| *v = v.tanh()),
            Elliott { slope } => values.iter_mut().for_each(|v| {
                let s = *v * slope;
                *v = (s / 2.) / (1. + s.abs()) + 0.5;
            }),
            ElliottSymmetric { slope } => values.iter_mut().for_each(|v| {
                let s = *v * slope;
                *v = s / (1. + s.abs());
            }),
        }
    }

    /// Computes the derivative of the activation.
    ///
    /// # Arguments
    /// * `sum` - The neuron's weighted sum before activation.
    /// * `output` - The neuron's output after activation.
    ///
    /// # Returns
    /// The derivative at that point.
    pub fn derivative(&self, sum: f64, output: f64) -> f64 {
        match *self {
            Linear => 1.,
            Sigmoid => output * (1. - output),
            Tanh => 1. - output * output,
            Elliott { slope } => {
                let d = 1. + (sum * slope).abs();
                slope / (2. * d * d)
            }
            ElliottSymmetric { slope } => {
                let d = 1. + (sum * slope).abs();
                slope / (d * d)
            }
        }
    }

    /// Returns the derivative floor used when flat spot fixing is enabled.
    pub fn flat_spot(&self) -> f64 {
        match self {
            Sigmoid | Tanh => SIGMOID_FLAT_SPOT,
            _ => 0.,
        }
    }
}

impl Default for ActivationFn {
    fn default() -> Self {
        Sigmoid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_derivative(act: ActivationFn, x: f64) -> f64 {
        const H: f64 = 1e-6;
        let mut v = [x + H, x - H];
        act.activate(&mut v);
        (v[0] - v[1]) / (2. * H)
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let acts = [
            Linear,
            Sigmoid,
            Tanh,
            Elliott { slope: 1. },
            ElliottSymmetric { slope: 0.5 },
        ];

        for act in acts {
            for x in [-2.0, -0.3, 0.4, 1.7] {
                let mut out = [x];
                act.activate(&mut out);
                let analytic = act.derivative(x, out[0]);
                let numeric = numeric_derivative(act, x);
                assert!(
                    (analytic - numeric).abs() < 1e-6,
                    "{act:?} at {x}: {analytic} vs {numeric}"
                );
            }
        }
    }

    #[test]
    fn only_sigmoid_shapes_get_a_flat_spot() {
        assert_eq!(Sigmoid.flat_spot(), SIGMOID_FLAT_SPOT);
        assert_eq!(Tanh.flat_spot(), SIGMOID_FLAT_SPOT);
        assert_eq!(Linear.flat_spot(), 0.);
        assert_eq!(Elliott { slope: 1. }.flat_spot(), 0.);
    }
}
