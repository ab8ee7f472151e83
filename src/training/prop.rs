use std::sync::Arc;

use log::{debug, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::{
    Train,
    accumulator::GradientAccumulator,
    cancel::CancellationToken,
    continuation::TrainingContinuation,
    error_calc::ErrorMode,
    error_fn::{ErrorFunction, LinearErrorFunction},
    flat_spot::FlatSpotTable,
    partition::WorkloadPartitioner,
    rules::UpdateRule,
    worker::GradientWorker,
};
use crate::{
    data::{DatasetHandle, IndexableDataset},
    error::{ConfigErr, Result, SizeMismatch, TrainErr},
    network::FlatNetwork,
};

/// The workers of a trainer and the pool they run on.
struct Workforce<H: DatasetHandle> {
    workers: Vec<GradientWorker<H>>,
    pool: Option<ThreadPool>,
}

/// Trains a `FlatNetwork` by gradient propagation, splitting every gradient pass across
/// several workers.
///
/// Each worker owns a copy of the network and a contiguous range of rows. After every pass
/// their gradients are merged, the update rule changes the master weights, and the new
/// weights are copied back into every worker. For recurrent networks the context flows from
/// one worker to the next, so the workers behave as one pipeline over the whole dataset.
pub struct TrainFlatNetworkProp<D: IndexableDataset, R: UpdateRule> {
    network: FlatNetwork,
    training: D,
    rule: R,
    error_fn: Arc<dyn ErrorFunction>,
    error_mode: ErrorMode,

    accumulator: GradientAccumulator,
    last_gradient: Vec<f64>,
    workforce: Option<Workforce<D::Handle>>,

    num_threads: usize,
    fix_flat_spot: bool,
    error: f64,
    iteration: usize,
    cancel: CancellationToken,
}

impl<D: IndexableDataset, R: UpdateRule> TrainFlatNetworkProp<D, R> {
    /// Creates a new `TrainFlatNetworkProp`.
    ///
    /// # Arguments
    /// * `network` - The network to train.
    /// * `training` - The training set, its widths must match the network's.
    /// * `rule` - How the merged gradient changes the weights.
    ///
    /// # Returns
    /// The trainer, or a `ConfigErr` if the network has no weights or the widths don't match.
    pub fn new(network: FlatNetwork, training: D, mut rule: R) -> Result<Self> {
        let weight_count = network.weight_count();
        if weight_count == 0 {
            return Err(ConfigErr::EmptyNetwork.into());
        }

        SizeMismatch::check("input", training.input_size(), network.input_count())
            .map_err(ConfigErr::from)?;
        SizeMismatch::check("ideal", training.ideal_size(), network.output_count())
            .map_err(ConfigErr::from)?;

        rule.init(weight_count);

        Ok(Self {
            network,
            training,
            rule,
            error_fn: Arc::new(LinearErrorFunction),
            error_mode: ErrorMode::default(),
            accumulator: GradientAccumulator::new(weight_count),
            last_gradient: vec![0.; weight_count],
            workforce: None,
            num_threads: 0,
            fix_flat_spot: true,
            error: 0.,
            iteration: 0,
            cancel: CancellationToken::new(),
        })
    }

    /// Computes the merged gradient of the whole training set with the current weights.
    ///
    /// Initialises the workers on the first call. On failure the partial sums are dropped and
    /// the previous error is kept.
    pub fn calculate_gradients(&mut self) -> Result<()> {
        let mut workforce = match self.workforce.take() {
            Some(workforce) => workforce,
            None => self.init_workforce()?,
        };

        let outcome = self.run_pass(&mut workforce);
        self.workforce = Some(workforce);
        outcome
    }

    fn init_workforce(&self) -> Result<Workforce<D::Handle>> {
        let partitioner = WorkloadPartitioner::new(self.num_threads, self.training.len());
        let flat_spot = Arc::new(FlatSpotTable::new(&self.network, self.fix_flat_spot));

        let workers: Vec<_> = partitioner
            .ranges()
            .into_iter()
            .enumerate()
            .map(|(id, range)| {
                GradientWorker::new(
                    id,
                    self.network.clone(),
                    self.training.open_additional(),
                    range,
                    Arc::clone(&flat_spot),
                    Arc::clone(&self.error_fn),
                    self.error_mode,
                    self.cancel.clone(),
                )
            })
            .collect();

        let pool = if workers.len() > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(workers.len())
                .thread_name(|i| format!("gradient-worker-{i}"))
                .build()
                .map_err(ConfigErr::from)?;
            Some(pool)
        } else {
            None
        };

        info!(
            workers = workers.len(),
            rows = partitioner.total_rows(),
            requested_threads = self.num_threads;
            "gradient workers ready"
        );

        Ok(Workforce { workers, pool })
    }

    fn run_pass(&mut self, workforce: &mut Workforce<D::Handle>) -> Result<()> {
        // Kept so a failed pass leaves every worker where it started.
        let contexts: Option<Vec<_>> = self.network.has_context().then(|| {
            workforce
                .workers
                .iter()
                .map(|w| w.network().context())
                .collect()
        });

        // Only the head starts from a clean context, the others get theirs handed over.
        if contexts.is_some() {
            if let Some(head) = workforce.workers.first_mut() {
                head.clear_context();
            }
        }

        self.accumulator.begin_pass();
        let acc = &self.accumulator;
        let workers = &mut workforce.workers;

        match &workforce.pool {
            Some(pool) => pool.scope(|s| {
                for worker in workers.iter_mut() {
                    s.spawn(move |_| worker.run_and_report(acc));
                }
            }),
            None => workers.iter_mut().for_each(|w| w.run_and_report(acc)),
        }

        let worker_count = workforce.workers.len();
        let totals = self.accumulator.get_mut();

        if let Some(mismatch) = totals.inconsistency.take() {
            totals.discard();
            restore_contexts(&mut workforce.workers, contexts.as_deref())?;
            return Err(TrainErr::StateConsistency(mismatch));
        }

        if let Some((worker, cause)) = totals.failure.take() {
            totals.discard();
            restore_contexts(&mut workforce.workers, contexts.as_deref())?;
            warn!(worker_id = worker, iteration = self.iteration; "discarding gradient pass");
            return Err(TrainErr::Worker {
                worker,
                iteration: self.iteration,
                cause,
            });
        }

        self.error = totals.total_error / worker_count as f64;
        Ok(())
    }

    /// Applies the merged gradient to every weight and zeroes it.
    pub fn learn(&mut self) -> Result<()> {
        let totals = self.accumulator.get_mut();
        let weights = self.network.weights_mut();

        for i in 0..weights.len() {
            let weight = weights[i];
            let gradients = &totals.gradients;
            let delta = self.rule.update_weight(gradients, &mut self.last_gradient, i, weight);
            weights[i] = weight + delta;
            totals.gradients[i] = 0.;
        }

        self.sync_weights()
    }

    /// Like [`TrainFlatNetworkProp::learn`], but weights whose magnitude is below the
    /// network's connection limit are pruned to zero instead of updated.
    pub fn learn_limited(&mut self) -> Result<()> {
        let Some(limit) = self.network.connection_limit() else {
            return self.learn();
        };

        let totals = self.accumulator.get_mut();
        let weights = self.network.weights_mut();

        for i in 0..weights.len() {
            let weight = weights[i];
            weights[i] = if weight.abs() < limit {
                0.
            } else {
                let gradients = &totals.gradients;
                weight + self.rule.update_weight(gradients, &mut self.last_gradient, i, weight)
            };
            totals.gradients[i] = 0.;
        }

        self.sync_weights()
    }

    fn sync_weights(&mut self) -> Result<()> {
        let Some(workforce) = self.workforce.as_mut() else {
            return Ok(());
        };

        let weights = self.network.weights();
        for worker in &mut workforce.workers {
            worker
                .sync_weights(weights)
                .map_err(TrainErr::StateConsistency)?;
        }

        Ok(())
    }

    /// Hands every worker's end-of-range context to the next worker, and the last one's to
    /// the master network.
    fn propagate_context(&mut self) -> Result<()> {
        if !self.network.has_context() {
            return Ok(());
        }

        let Some(workforce) = self.workforce.as_mut() else {
            return Ok(());
        };

        let snapshots: Vec<_> = workforce
            .workers
            .iter()
            .map(|w| w.network().context())
            .collect();

        for (worker, context) in workforce.workers.iter_mut().skip(1).zip(&snapshots) {
            worker
                .set_context(context)
                .map_err(TrainErr::StateConsistency)?;
        }

        if let Some(last) = snapshots.last() {
            self.network
                .set_context(last)
                .map_err(TrainErr::StateConsistency)?;
        }

        Ok(())
    }

    /// Exports the state needed to resume training later.
    pub fn pause(&self) -> TrainingContinuation {
        TrainingContinuation::new(
            self.rule.name(),
            self.last_gradient.clone(),
            self.rule.export_state(),
        )
    }

    /// Restores a state exported by [`TrainFlatNetworkProp::pause`].
    ///
    /// # Returns
    /// A `ConfigErr` if the continuation belongs to another update rule or network size.
    pub fn resume(&mut self, continuation: &TrainingContinuation) -> Result<()> {
        continuation.validate(self.rule.name(), self.last_gradient.len())?;
        self.rule.import_state(&continuation.state)?;
        self.last_gradient.copy_from_slice(&continuation.last_gradient);
        Ok(())
    }

    pub fn training(&self) -> &D {
        &self.training
    }

    pub fn rule(&self) -> &R {
        &self.rule
    }

    pub fn rule_mut(&mut self) -> &mut R {
        &mut self.rule
    }

    /// Copies the merged gradient that the next `learn` will consume.
    pub fn gradients(&self) -> Vec<f64> {
        self.accumulator.gradients()
    }

    pub fn last_gradient(&self) -> &[f64] {
        &self.last_gradient
    }

    /// Returns the amount of workers a gradient pass is split into.
    pub fn worker_count(&self) -> usize {
        match &self.workforce {
            Some(workforce) => workforce.workers.len(),
            None => WorkloadPartitioner::new(self.num_threads, self.training.len()).worker_count(),
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Sets the amount of workers, `0` meaning one per available core.
    pub fn set_num_threads(&mut self, num_threads: usize) {
        self.num_threads = num_threads;
        self.workforce = None;
    }

    pub fn fix_flat_spot(&self) -> bool {
        self.fix_flat_spot
    }

    pub fn set_fix_flat_spot(&mut self, fix_flat_spot: bool) {
        self.fix_flat_spot = fix_flat_spot;
        self.workforce = None;
    }

    pub fn set_error_function(&mut self, error_fn: Arc<dyn ErrorFunction>) {
        self.error_fn = error_fn;
        self.workforce = None;
    }

    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }

    pub fn set_error_mode(&mut self, error_mode: ErrorMode) {
        self.error_mode = error_mode;
        self.workforce = None;
    }

    /// Sets the magnitude below which weights are pruned by every following iteration.
    pub fn set_connection_limit(&mut self, limit: Option<f64>) {
        self.network.set_connection_limit(limit);
    }
}

fn restore_contexts<H: DatasetHandle>(
    workers: &mut [GradientWorker<H>],
    contexts: Option<&[Vec<f64>]>,
) -> Result<()> {
    let Some(contexts) = contexts else {
        return Ok(());
    };

    for (worker, context) in workers.iter_mut().zip(contexts) {
        worker
            .set_context(context)
            .map_err(TrainErr::StateConsistency)?;
    }

    Ok(())
}

impl<D: IndexableDataset, R: UpdateRule> Train for TrainFlatNetworkProp<D, R> {
    fn iteration(&mut self) -> Result<()> {
        self.iteration += 1;

        self.calculate_gradients()?;
        if self.network.is_limited() {
            self.learn_limited()?;
        } else {
            self.learn()?;
        }
        self.propagate_context()?;

        debug!(iteration = self.iteration, error = self.error; "iteration complete");
        Ok(())
    }

    fn error(&self) -> f64 {
        self.error
    }

    fn iteration_number(&self) -> usize {
        self.iteration
    }

    fn set_iteration_number(&mut self, iteration: usize) {
        self.iteration = iteration;
    }

    fn network(&self) -> &FlatNetwork {
        &self.network
    }

    fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
