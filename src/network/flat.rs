use rand::{Rng, distr::Uniform, prelude::Distribution};
use serde::{Deserialize, Serialize};

use super::ActivationFn;
use crate::error::{ConfigErr, SizeMismatch};

/// The description of one layer, given input layer first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatLayer {
    /// The amount of neurons fed by the previous layer.
    pub count: usize,
    pub activation: ActivationFn,
    /// The constant output of this layer's bias neuron, if it has one.
    #[serde(default)]
    pub bias: Option<f64>,
    /// The (input-first) index of the layer whose outputs are copied into this layer's
    /// context neurons after every forward pass.
    #[serde(default)]
    pub context_fed_by: Option<usize>,
}

impl FlatLayer {
    /// Creates a layer without bias nor context.
    pub fn new(count: usize, activation: ActivationFn) -> Self {
        Self {
            count,
            activation,
            bias: None,
            context_fed_by: None,
        }
    }

    /// Adds a bias neuron with an output of `1.0`.
    pub fn with_bias(mut self) -> Self {
        self.bias = Some(1.);
        self
    }

    /// Adds context neurons holding the previous outputs of layer `fed_by`.
    pub fn with_context(mut self, fed_by: usize) -> Self {
        self.context_fed_by = Some(fed_by);
        self
    }
}

/// A dense, array-encoded neural network.
///
/// Every per-layer table is stored in reverse order: index `0` is the output layer and the
/// last index is the input layer. Inside `layer_output`, each layer's region holds its fed
/// neurons, then its bias neuron, then its context neurons.
///
/// The weights connecting layer `i + 1` into layer `i` start at `weight_index[i]` and are laid
/// out target-major: the weight from neuron `y` of layer `i + 1` into neuron `x` of layer `i` is
/// `weights[weight_index[i] + x * layer_counts[i + 1] + y]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatNetwork {
    input_count: usize,
    output_count: usize,

    layer_counts: Vec<usize>,
    layer_feed_counts: Vec<usize>,
    layer_context_counts: Vec<usize>,
    layer_index: Vec<usize>,
    weight_index: Vec<usize>,
    activations: Vec<ActivationFn>,
    bias_activation: Vec<f64>,

    context_target_offset: Vec<usize>,
    context_target_size: Vec<usize>,

    weights: Vec<f64>,
    layer_output: Vec<f64>,
    layer_sums: Vec<f64>,

    connection_limit: Option<f64>,
    has_context: bool,
}

impl FlatNetwork {
    /// Creates a new `FlatNetwork` with all weights at zero.
    ///
    /// # Arguments
    /// * `layers` - The layers, input layer first and output layer last.
    ///
    /// # Returns
    /// The network, or a `ConfigErr` if the layout is invalid.
    pub fn new(layers: &[FlatLayer]) -> Result<Self, ConfigErr> {
        let n = layers.len();
        if n < 2 {
            return Err(ConfigErr::TooFewLayers { got: n });
        }

        if let Some(layer) = layers.iter().position(|l| l.count == 0) {
            return Err(ConfigErr::EmptyLayer { layer });
        }

        let rev = |i: usize| n - 1 - i;

        let mut context_counts = vec![0; n];
        let mut context_target_size = vec![0; n];
        for (i, layer) in layers.iter().enumerate() {
            let Some(fed_by) = layer.context_fed_by else {
                continue;
            };

            if fed_by >= n || fed_by == 0 {
                return Err(ConfigErr::InvalidContext { layer: i, fed_by });
            }

            if context_target_size[rev(fed_by)] != 0 {
                return Err(ConfigErr::SharedContextSource { fed_by });
            }

            context_counts[rev(i)] = layers[fed_by].count;
            context_target_size[rev(fed_by)] = layers[fed_by].count;
        }

        let mut layer_counts = vec![0; n];
        let mut layer_feed_counts = vec![0; n];
        let mut activations = Vec::with_capacity(n);
        let mut bias_activation = vec![0.; n];

        for r in 0..n {
            let layer = &layers[rev(r)];
            let bias = usize::from(layer.bias.is_some());
            layer_feed_counts[r] = layer.count;
            layer_counts[r] = layer.count + bias + context_counts[r];
            bias_activation[r] = layer.bias.unwrap_or_default();
            activations.push(layer.activation);
        }

        let mut layer_index = vec![0; n];
        let mut weight_index = vec![0; n];
        for r in 1..n {
            layer_index[r] = layer_index[r - 1] + layer_counts[r - 1];
            weight_index[r] = weight_index[r - 1] + layer_feed_counts[r - 1] * layer_counts[r];
        }

        let neuron_count = layer_index[n - 1] + layer_counts[n - 1];
        let weight_count = weight_index[n - 1];

        let mut context_target_offset = vec![0; n];
        for (i, layer) in layers.iter().enumerate() {
            if let Some(fed_by) = layer.context_fed_by {
                let r = rev(i);
                let bias = usize::from(layer.bias.is_some());
                context_target_offset[rev(fed_by)] = layer_index[r] + layer_feed_counts[r] + bias;
            }
        }

        let mut network = Self {
            input_count: layers[0].count,
            output_count: layers[n - 1].count,
            layer_counts,
            layer_feed_counts,
            layer_context_counts: context_counts,
            layer_index,
            weight_index,
            activations,
            bias_activation,
            context_target_offset,
            context_target_size,
            weights: vec![0.; weight_count],
            layer_output: vec![0.; neuron_count],
            layer_sums: vec![0.; neuron_count],
            connection_limit: None,
            has_context: layers.iter().any(|l| l.context_fed_by.is_some()),
        };

        network.clear_context();
        Ok(network)
    }

    /// Computes the output of the network for one input row.
    ///
    /// Context neurons are updated as a side effect, so consecutive calls see the state left
    /// by the previous row.
    ///
    /// # Arguments
    /// * `input` - The input row.
    /// * `output` - Where the output row will be written to.
    ///
    /// # Returns
    /// A `SizeMismatch` if either slice doesn't match the network's input or output count.
    pub fn compute(&mut self, input: &[f64], output: &mut [f64]) -> Result<(), SizeMismatch> {
        SizeMismatch::check("input", input.len(), self.input_count)?;
        SizeMismatch::check("output", output.len(), self.output_count)?;

        let last = self.layer_count() - 1;
        let source = self.layer_index[last];
        self.layer_output[source..source + self.input_count].copy_from_slice(input);

        for layer in (1..=last).rev() {
            self.compute_layer(layer);
        }

        output.copy_from_slice(&self.layer_output[..self.output_count]);
        Ok(())
    }

    fn compute_layer(&mut self, current: usize) {
        let target = current - 1;
        let input_index = self.layer_index[current];
        let input_size = self.layer_counts[current];
        let output_index = self.layer_index[target];
        let output_size = self.layer_feed_counts[target];
        let mut wi = self.weight_index[target];

        for x in output_index..output_index + output_size {
            let mut sum = 0.;
            for y in input_index..input_index + input_size {
                sum += self.weights[wi] * self.layer_output[y];
                wi += 1;
            }
            self.layer_sums[x] = sum;
            self.layer_output[x] = sum;
        }

        let outputs = &mut self.layer_output[output_index..output_index + output_size];
        self.activations[target].activate(outputs);

        let size = self.context_target_size[target];
        if size > 0 {
            let offset = self.context_target_offset[target];
            self.layer_output
                .copy_within(output_index..output_index + size, offset);
        }
    }

    /// Resets every neuron output to zero, bias neurons to their activation and context
    /// neurons to zero.
    pub fn clear_context(&mut self) {
        let mut index = 0;
        for r in 0..self.layer_count() {
            let feed = self.layer_feed_counts[r];
            self.layer_output[index..index + feed].fill(0.);
            index += feed;

            if self.has_bias(r) {
                self.layer_output[index] = self.bias_activation[r];
                index += 1;
            }

            let context = self.layer_context_counts[r];
            self.layer_output[index..index + context].fill(0.);
            index += context;
        }
    }

    /// Gathers the values of every context neuron, output layer region first.
    pub fn context(&self) -> Vec<f64> {
        self.context_regions()
            .flat_map(|(start, len)| self.layer_output[start..start + len].iter().copied())
            .collect()
    }

    /// Overwrites every context neuron, in the order given by [`FlatNetwork::context`].
    ///
    /// # Returns
    /// A `SizeMismatch` if `context` doesn't hold exactly one value per context neuron.
    pub fn set_context(&mut self, context: &[f64]) -> Result<(), SizeMismatch> {
        SizeMismatch::check("context", context.len(), self.context_count())?;

        let regions: Vec<_> = self.context_regions().collect();
        let mut src = context;
        for (start, len) in regions {
            let (head, tail) = src.split_at(len);
            self.layer_output[start..start + len].copy_from_slice(head);
            src = tail;
        }

        Ok(())
    }

    fn context_regions(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.layer_count())
            .filter(|&r| self.layer_context_counts[r] > 0)
            .map(|r| {
                let bias = usize::from(self.has_bias(r));
                let start = self.layer_index[r] + self.layer_feed_counts[r] + bias;
                (start, self.layer_context_counts[r])
            })
    }

    /// Sets every weight to a uniform sample in `[low, high)`.
    ///
    /// # Returns
    /// An error if the range is invalid.
    pub fn randomize<R: Rng>(&mut self, rng: &mut R, low: f64, high: f64) -> Result<(), ConfigErr> {
        let dist = Uniform::new(low, high)?;
        self.weights.iter_mut().for_each(|w| *w = dist.sample(rng));
        Ok(())
    }

    /// Overwrites the weights of this network.
    ///
    /// # Returns
    /// A `SizeMismatch` if `weights` isn't as long as this network's weight vector.
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<(), SizeMismatch> {
        SizeMismatch::check("weights", weights.len(), self.weights.len())?;
        self.weights.copy_from_slice(weights);
        Ok(())
    }

    /// Enables weight pruning: weights whose magnitude falls under `limit` are zeroed during
    /// training. `None` disables it.
    pub fn set_connection_limit(&mut self, limit: Option<f64>) {
        self.connection_limit = limit;
    }

    pub fn connection_limit(&self) -> Option<f64> {
        self.connection_limit
    }

    pub fn is_limited(&self) -> bool {
        self.connection_limit.is_some()
    }

    pub fn has_context(&self) -> bool {
        self.has_context
    }

    fn has_bias(&self, r: usize) -> bool {
        self.layer_feed_counts[r] + self.layer_context_counts[r] != self.layer_counts[r]
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut [f64] {
        &mut self.weights
    }

    pub fn weight_count(&self) -> usize {
        self.weights.len()
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn output_count(&self) -> usize {
        self.output_count
    }

    pub fn layer_count(&self) -> usize {
        self.layer_counts.len()
    }

    pub fn neuron_count(&self) -> usize {
        self.layer_output.len()
    }

    pub fn context_count(&self) -> usize {
        self.layer_context_counts.iter().sum()
    }

    /// The activations, output layer first.
    pub fn activations(&self) -> &[ActivationFn] {
        &self.activations
    }

    pub fn layer_output(&self) -> &[f64] {
        &self.layer_output
    }

    pub fn layer_sums(&self) -> &[f64] {
        &self.layer_sums
    }

    pub fn layer_counts(&self) -> &[usize] {
        &self.layer_counts
    }

    pub fn layer_feed_counts(&self) -> &[usize] {
        &self.layer_feed_counts
    }

    pub fn layer_index(&self) -> &[usize] {
        &self.layer_index
    }

    pub fn weight_index(&self) -> &[usize] {
        &self.weight_index
    }
}
