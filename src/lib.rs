pub mod data;
pub mod error;
pub mod network;
pub mod specs;
pub mod training;

pub use error::{ConfigErr, DatasetErr, Result, SizeMismatch, TrainErr, WorkerErr};
