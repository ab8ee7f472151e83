use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};

use super::{
    ArcTanErrorFunction, ErrorFunction, LinearErrorFunction, Train, TrainFlatNetworkProp,
    rules::{Backpropagation, ManhattanUpdate, ResilientPropagation, UpdateRule},
};
use crate::{
    data::InMemoryDataset,
    error::{ConfigErr, Result},
    network::FlatNetwork,
    specs::{
        DatasetSpec, ErrorFunctionSpec, ExperimentSpec, NetworkSpec, TrainerSpec, UpdateRuleSpec,
    },
};

/// Builds `Train`ers given a specification.
#[derive(Default)]
pub struct TrainerBuilder;

impl TrainerBuilder {
    /// Creates a new `TrainerBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds a new trainer following a spec.
    ///
    /// # Arguments
    /// * `spec` - The specification of the network, dataset and trainer.
    ///
    /// # Returns
    /// The trainer, or an error if some part of the spec is invalid.
    pub fn build(&self, spec: &ExperimentSpec) -> Result<Box<dyn Train>> {
        let network = self.resolve_network(&spec.network, spec.trainer.connection_limit)?;
        let dataset = self.resolve_dataset(&spec.dataset)?;
        self.resolve_rule(&spec.trainer, network, dataset)
    }

    /// Builds a new trainer from a JSON encoded `ExperimentSpec`.
    pub fn from_json(&self, json: &str) -> Result<Box<dyn Train>> {
        let spec: ExperimentSpec = serde_json::from_str(json).map_err(ConfigErr::from)?;
        self.build(&spec)
    }

    fn resolve_network(&self, spec: &NetworkSpec, limit: Option<f64>) -> Result<FlatNetwork> {
        let mut network = FlatNetwork::new(&spec.layers)?;

        let (low, high) = spec.weight_range;
        let mut rng = self.generate_rng(spec.seed);
        network.randomize(&mut rng, low, high)?;
        network.set_connection_limit(limit);

        Ok(network)
    }

    fn resolve_dataset(&self, spec: &DatasetSpec) -> Result<InMemoryDataset> {
        let dataset = InMemoryDataset::new(spec.data.clone(), spec.x_size, spec.y_size)?;
        Ok(dataset)
    }

    fn resolve_rule(
        &self,
        spec: &TrainerSpec,
        network: FlatNetwork,
        dataset: InMemoryDataset,
    ) -> Result<Box<dyn Train>> {
        match spec.rule {
            UpdateRuleSpec::Backpropagation {
                learning_rate,
                momentum,
            } => {
                let rule = Backpropagation::new(learning_rate, momentum);
                self.terminate_build(spec, network, dataset, rule)
            }
            UpdateRuleSpec::Manhattan { learning_rate } => {
                let rule = ManhattanUpdate::new(learning_rate);
                self.terminate_build(spec, network, dataset, rule)
            }
            UpdateRuleSpec::ResilientPropagation {
                initial_update,
                max_step,
            } => {
                let rule = ResilientPropagation::new(initial_update, max_step);
                self.terminate_build(spec, network, dataset, rule)
            }
        }
    }

    fn resolve_error_function(&self, spec: ErrorFunctionSpec) -> Arc<dyn ErrorFunction> {
        match spec {
            ErrorFunctionSpec::Linear => Arc::new(LinearErrorFunction),
            ErrorFunctionSpec::ArcTan => Arc::new(ArcTanErrorFunction),
        }
    }

    fn terminate_build<R>(
        &self,
        spec: &TrainerSpec,
        network: FlatNetwork,
        dataset: InMemoryDataset,
        rule: R,
    ) -> Result<Box<dyn Train>>
    where
        R: UpdateRule + 'static,
    {
        let mut trainer = TrainFlatNetworkProp::new(network, dataset, rule)?;
        trainer.set_num_threads(spec.threads);
        trainer.set_fix_flat_spot(spec.fix_flat_spot);
        trainer.set_error_function(self.resolve_error_function(spec.error_function));
        trainer.set_error_mode(spec.error_mode);

        Ok(Box::new(trainer))
    }

    fn generate_rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
