use std::sync::Arc;

use log::{debug, warn};

use super::{
    accumulator::GradientAccumulator,
    cancel::CancellationToken,
    error_calc::{ErrorCalculation, ErrorMode},
    error_fn::ErrorFunction,
    flat_spot::FlatSpotTable,
    partition::WorkRange,
};
use crate::{
    data::{DataPair, DatasetHandle},
    error::{SizeMismatch, WorkerErr},
    network::FlatNetwork,
};

/// Computes the gradient of one contiguous range of rows over a private copy of the network.
pub struct GradientWorker<H: DatasetHandle> {
    id: usize,
    network: FlatNetwork,
    handle: H,
    range: WorkRange,
    flat_spot: Arc<FlatSpotTable>,
    error_fn: Arc<dyn ErrorFunction>,
    calc: ErrorCalculation,

    gradients: Vec<f64>,
    layer_delta: Vec<f64>,
    actual: Vec<f64>,
    pair: DataPair,
    cancel: CancellationToken,
}

impl<H: DatasetHandle> GradientWorker<H> {
    /// Creates a new `GradientWorker`.
    ///
    /// # Arguments
    /// * `id` - The position of this worker in the pool.
    /// * `network` - The worker's own copy of the network.
    /// * `handle` - The worker's own read handle over the training set.
    /// * `range` - The rows this worker is responsible for.
    /// * `flat_spot` - The derivative floors, shared by every worker.
    /// * `error_fn` - The output error function, shared by every worker.
    /// * `mode` - How the worker condenses its squared errors.
    /// * `cancel` - Checked before every row.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        network: FlatNetwork,
        handle: H,
        range: WorkRange,
        flat_spot: Arc<FlatSpotTable>,
        error_fn: Arc<dyn ErrorFunction>,
        mode: ErrorMode,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            gradients: vec![0.; network.weight_count()],
            layer_delta: vec![0.; network.neuron_count()],
            actual: vec![0.; network.output_count()],
            pair: DataPair::new(network.input_count(), network.output_count()),
            calc: ErrorCalculation::new(mode),
            network,
            handle,
            range,
            flat_spot,
            error_fn,
            cancel,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn range(&self) -> WorkRange {
        self.range
    }

    pub fn network(&self) -> &FlatNetwork {
        &self.network
    }

    /// The gradient produced by the last run.
    pub fn gradients(&self) -> &[f64] {
        &self.gradients
    }

    /// Copies the coordinator's weights into this worker's network.
    pub fn sync_weights(&mut self, weights: &[f64]) -> Result<(), SizeMismatch> {
        self.network.set_weights(weights)
    }

    /// Overwrites this worker's context neurons.
    pub fn set_context(&mut self, context: &[f64]) -> Result<(), SizeMismatch> {
        self.network.set_context(context)
    }

    pub fn clear_context(&mut self) {
        self.network.clear_context();
    }

    /// Runs over every row of the range and merges the outcome into `acc`.
    pub(crate) fn run_and_report(&mut self, acc: &GradientAccumulator) {
        let outcome = self.run();
        match &outcome {
            Ok(error) => debug!(worker_id = self.id, error = *error; "gradient ready"),
            Err(e) => warn!(worker_id = self.id; "gradient pass failed: {e}"),
        }

        acc.report(self.id, outcome.map(|error| (&self.gradients[..], error)));
    }

    /// Computes the gradient and error of every row in the range.
    ///
    /// # Returns
    /// This worker's error over its range, or the error that stopped it.
    pub fn run(&mut self) -> Result<f64, WorkerErr> {
        self.gradients.fill(0.);
        self.calc.reset();

        for row in self.range.rows() {
            if self.cancel.is_cancelled() {
                return Err(WorkerErr::Cancelled { row });
            }

            self.handle
                .read_row(row, &mut self.pair)
                .map_err(|source| WorkerErr::Dataset { row, source })?;

            self.process(row)?;
        }

        Ok(self.calc.calculate())
    }

    fn process(&mut self, row: usize) -> Result<(), WorkerErr> {
        let prior = self.network.has_context().then(|| self.network.context());

        self.network
            .compute(&self.pair.input, &mut self.actual)
            .map_err(|source| WorkerErr::Network { row, source })?;

        if self.actual.iter().any(|v| !v.is_finite()) {
            return Err(WorkerErr::NonFinite { row });
        }

        self.calc
            .update_error(&self.actual, &self.pair.ideal, self.pair.significance);

        // Backprop must see the context that fed this row, not the one it produced.
        let next = match prior {
            Some(prior) => {
                let next = self.network.context();
                self.network
                    .set_context(&prior)
                    .map_err(|source| WorkerErr::Network { row, source })?;
                Some(next)
            }
            None => None,
        };

        self.backpropagate();

        if let Some(next) = next {
            self.network
                .set_context(&next)
                .map_err(|source| WorkerErr::Network { row, source })?;
        }

        Ok(())
    }

    /// Computes the output deltas of the last forward pass and pushes them down every level.
    fn backpropagate(&mut self) {
        let outputs = self.actual.len();
        self.error_fn.calculate_error(
            &self.pair.ideal,
            &self.actual,
            &mut self.layer_delta[..outputs],
        );

        let act = self.network.activations()[0];
        let flat_spot = self.flat_spot[0];
        let sums = self.network.layer_sums();
        let layer_output = self.network.layer_output();
        for i in 0..outputs {
            let derivative = act.derivative(sums[i], layer_output[i]) + flat_spot;
            self.layer_delta[i] *= derivative * self.pair.significance;
        }

        for level in 0..self.network.layer_count() - 1 {
            self.process_level(level);
        }
    }

    /// Pushes the deltas of layer `level` back into layer `level + 1`, accumulating the
    /// gradient of the weights between them.
    fn process_level(&mut self, level: usize) {
        let net = &self.network;
        let from_index = net.layer_index()[level + 1];
        let to_index = net.layer_index()[level];
        let from_size = net.layer_counts()[level + 1];
        let to_size = net.layer_feed_counts()[level];
        let index = net.weight_index()[level];
        let act = net.activations()[level + 1];
        let flat_spot = self.flat_spot[level + 1];

        let weights = net.weights();
        let sums = net.layer_sums();
        let outputs = net.layer_output();

        for y in 0..from_size {
            let yi = from_index + y;
            let output = outputs[yi];
            let mut wi = index + y;
            let mut sum = 0.;

            for xi in to_index..to_index + to_size {
                let delta = self.layer_delta[xi];
                self.gradients[wi] += output * delta;
                sum += weights[wi] * delta;
                wi += from_size;
            }

            self.layer_delta[yi] = sum * (act.derivative(sums[yi], outputs[yi]) + flat_spot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{InMemoryDataset, InMemoryHandle, IndexableDataset},
        network::{ActivationFn::*, FlatLayer},
        training::error_fn::LinearErrorFunction,
    };

    fn network() -> FlatNetwork {
        let mut net = FlatNetwork::new(&[
            FlatLayer::new(2, Linear).with_bias(),
            FlatLayer::new(3, Sigmoid).with_bias(),
            FlatLayer::new(1, Sigmoid),
        ])
        .unwrap();

        let weights: Vec<f64> = (0..net.weight_count())
            .map(|i| ((i * 7 % 11) as f64 - 5.) / 10.)
            .collect();
        net.set_weights(&weights).unwrap();
        net
    }

    fn dataset() -> InMemoryDataset {
        InMemoryDataset::from_rows(
            &[vec![0., 1.], vec![1., 0.], vec![1., 1.]],
            &[vec![1.], vec![1.], vec![0.]],
        )
        .unwrap()
    }

    fn worker(
        net: FlatNetwork,
        ds: &InMemoryDataset,
        range: WorkRange,
    ) -> GradientWorker<InMemoryHandle> {
        let flat_spot = Arc::new(FlatSpotTable::new(&net, false));
        GradientWorker::new(
            0,
            net,
            ds.open_additional(),
            range,
            flat_spot,
            Arc::new(LinearErrorFunction),
            ErrorMode::Mse,
            CancellationToken::new(),
        )
    }

    fn half_sse(net: &FlatNetwork, ds: &InMemoryDataset) -> f64 {
        let mut net = net.clone();
        let mut handle = ds.open_additional();
        let mut pair = DataPair::new(2, 1);
        let mut out = [0.];

        (0..ds.len())
            .map(|row| {
                handle.read_row(row, &mut pair).unwrap();
                net.compute(&pair.input, &mut out).unwrap();
                0.5 * (pair.ideal[0] - out[0]).powi(2)
            })
            .sum()
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let net = network();
        let ds = dataset();
        let mut w = worker(net.clone(), &ds, WorkRange::new(0, 3));
        w.run().unwrap();

        let h = 1e-6;
        for i in 0..net.weight_count() {
            let mut plus = net.clone();
            plus.weights_mut()[i] += h;
            let mut minus = net.clone();
            minus.weights_mut()[i] -= h;

            let numeric = -(half_sse(&plus, &ds) - half_sse(&minus, &ds)) / (2. * h);
            assert!(
                (w.gradients()[i] - numeric).abs() < 1e-6,
                "weight {i}: {} vs {numeric}",
                w.gradients()[i]
            );
        }
    }

    #[test]
    fn context_weights_see_the_previous_context() {
        let mut net = FlatNetwork::new(&[
            FlatLayer::new(1, Linear).with_bias().with_context(1),
            FlatLayer::new(2, Tanh).with_bias(),
            FlatLayer::new(1, Linear),
        ])
        .unwrap();
        let weights: Vec<f64> = (0..net.weight_count())
            .map(|i| ((i * 5 % 9) as f64 - 4.) / 8.)
            .collect();
        net.set_weights(&weights).unwrap();

        let ds = InMemoryDataset::from_rows(&[vec![0.6]], &[vec![0.2]]).unwrap();
        let prior = [0.4, -0.7];

        let mut w = worker(net.clone(), &ds, WorkRange::new(0, 1));
        w.set_context(&prior).unwrap();
        w.run().unwrap();

        let half_se = |net: &FlatNetwork| {
            let mut net = net.clone();
            net.set_context(&prior).unwrap();
            let mut out = [0.];
            net.compute(&[0.6], &mut out).unwrap();
            0.5 * (0.2 - out[0]).powi(2)
        };

        let h = 1e-6;
        for i in 0..net.weight_count() {
            let mut plus = net.clone();
            plus.weights_mut()[i] += h;
            let mut minus = net.clone();
            minus.weights_mut()[i] -= h;

            let numeric = -(half_se(&plus) - half_se(&minus)) / (2. * h);
            assert!(
                (w.gradients()[i] - numeric).abs() < 1e-6,
                "weight {i}: {} vs {numeric}",
                w.gradients()[i]
            );
        }

        // The context still advances to this row's hidden outputs.
        let mut forward = net.clone();
        forward.set_context(&prior).unwrap();
        forward.compute(&[0.6], &mut [0.]).unwrap();
        assert_eq!(w.network().context(), forward.context());
    }

    #[test]
    fn error_covers_only_the_range() {
        let ds = dataset();
        let mut w = worker(network(), &ds, WorkRange::new(1, 2));
        let error = w.run().unwrap();

        let mut net = network();
        let mut out = [0.];
        net.compute(&[1., 0.], &mut out).unwrap();
        assert!((error - (1. - out[0]).powi(2)).abs() < 1e-12);
    }

    #[test]
    fn empty_range_yields_nothing() {
        let ds = dataset();
        let mut w = worker(network(), &ds, WorkRange::new(3, 3));
        assert_eq!(w.run().unwrap(), 0.);
        assert!(w.gradients().iter().all(|g| *g == 0.));
    }

    #[test]
    fn failures_name_the_row() {
        let ds = dataset();

        let mut nan = network();
        nan.weights_mut()[0] = f64::NAN;
        let mut w = worker(nan, &ds, WorkRange::new(1, 3));
        assert_eq!(w.run(), Err(WorkerErr::NonFinite { row: 1 }));

        let mut w = worker(network(), &ds, WorkRange::new(2, 5));
        assert!(matches!(w.run(), Err(WorkerErr::Dataset { row: 3, .. })));

        let mut w = worker(network(), &ds, WorkRange::new(0, 3));
        w.cancel.cancel();
        assert_eq!(w.run(), Err(WorkerErr::Cancelled { row: 0 }));
    }

    #[test]
    fn reports_into_the_accumulator() {
        let ds = dataset();
        let mut w = worker(network(), &ds, WorkRange::new(0, 3));
        let mut acc = GradientAccumulator::new(network().weight_count());

        w.run_and_report(&acc);
        let totals = acc.get_mut();
        assert_eq!(totals.reports, 1);
        assert_eq!(totals.gradients, w.gradients());
    }
}
