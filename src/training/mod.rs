mod accumulator;
mod builder;
mod cancel;
mod continuation;
mod error_calc;
mod error_fn;
mod flat_spot;
mod partition;
mod prop;
pub mod rules;
mod worker;

pub use builder::TrainerBuilder;
pub use cancel::CancellationToken;
pub use continuation::TrainingContinuation;
pub use error_calc::{ErrorCalculation, ErrorMode};
pub use error_fn::{ArcTanErrorFunction, ErrorFunction, LinearErrorFunction};
pub use flat_spot::FlatSpotTable;
pub use partition::{WorkRange, WorkloadPartitioner, partition};
pub use prop::TrainFlatNetworkProp;
pub use worker::GradientWorker;

use crate::{error::Result, network::FlatNetwork};

/// The contract every trainer exposes to its callers.
pub trait Train {
    /// Performs one training iteration: a full gradient pass followed by a weight update.
    fn iteration(&mut self) -> Result<()>;

    /// Performs `count` iterations, stopping at the first failure.
    fn iterations(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.iteration()?;
        }

        Ok(())
    }

    /// The error measured during the last successful gradient pass.
    fn error(&self) -> f64;

    fn iteration_number(&self) -> usize;

    fn set_iteration_number(&mut self, iteration: usize);

    /// Called once the caller is done training.
    fn finish_training(&mut self) {}

    fn network(&self) -> &FlatNetwork;

    /// A token that cancels the running and following gradient passes.
    fn cancellation_token(&self) -> CancellationToken;
}
