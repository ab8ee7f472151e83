use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used across the trainer.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// A buffer didn't have the length its consumer expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeMismatch {
    pub what: &'static str,
    pub got: usize,
    pub expected: usize,
}

impl SizeMismatch {
    /// Checks that `got == expected`.
    ///
    /// # Arguments
    /// * `what` - A name for the checked buffer.
    /// * `got` - The actual length.
    /// * `expected` - The required length.
    ///
    /// # Returns
    /// A `SizeMismatch` error describing the difference, if any.
    pub fn check(what: &'static str, got: usize, expected: usize) -> std::result::Result<(), Self> {
        if got != expected {
            return Err(Self {
                what,
                got,
                expected,
            });
        }

        Ok(())
    }
}

impl Display for SizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            what,
            got,
            expected,
        } = self;

        write!(f, "size mismatch in {what}: got {got}, expected {expected}")
    }
}

impl Error for SizeMismatch {}

/// Failures reading a row through a dataset handle.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetErr {
    RowOutOfRange { row: usize, len: usize },
    Malformed { row: usize, reason: String },
}

impl Display for DatasetErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetErr::RowOutOfRange { row, len } => {
                write!(f, "row {row} is out of range for a dataset of {len} rows")
            }
            DatasetErr::Malformed { row, reason } => write!(f, "row {row} is malformed: {reason}"),
        }
    }
}

impl Error for DatasetErr {}

/// Setup-time failures. These are fatal and never retried.
#[derive(Debug)]
pub enum ConfigErr {
    EmptyNetwork,
    EmptyDataset,
    TooFewLayers { got: usize },
    EmptyLayer { layer: usize },
    InvalidContext { layer: usize, fed_by: usize },
    SharedContextSource { fed_by: usize },
    WeightRange(rand::distr::uniform::Error),
    Size(SizeMismatch),
    ThreadPool(rayon::ThreadPoolBuildError),
    Continuation(String),
    Spec(serde_json::Error),
}

impl Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::EmptyNetwork => write!(f, "the network has no weights"),
            ConfigErr::EmptyDataset => write!(f, "the dataset has no columns"),
            ConfigErr::TooFewLayers { got } => {
                write!(f, "a network needs at least 2 layers, got {got}")
            }
            ConfigErr::EmptyLayer { layer } => write!(f, "layer {layer} has no neurons"),
            ConfigErr::InvalidContext { layer, fed_by } => {
                write!(f, "layer {layer} can't have its context fed by layer {fed_by}")
            }
            ConfigErr::SharedContextSource { fed_by } => {
                write!(f, "layer {fed_by} already feeds another layer's context")
            }
            ConfigErr::WeightRange(e) => write!(f, "invalid weight range: {e}"),
            ConfigErr::Size(e) => write!(f, "{e}"),
            ConfigErr::ThreadPool(e) => write!(f, "failed to build the worker pool: {e}"),
            ConfigErr::Continuation(msg) => write!(f, "can't resume training: {msg}"),
            ConfigErr::Spec(e) => write!(f, "invalid spec: {e}"),
        }
    }
}

impl Error for ConfigErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigErr::WeightRange(e) => Some(e),
            ConfigErr::Size(e) => Some(e),
            ConfigErr::ThreadPool(e) => Some(e),
            ConfigErr::Spec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SizeMismatch> for ConfigErr {
    fn from(value: SizeMismatch) -> Self {
        Self::Size(value)
    }
}

impl From<rayon::ThreadPoolBuildError> for ConfigErr {
    fn from(value: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(value)
    }
}

impl From<rand::distr::uniform::Error> for ConfigErr {
    fn from(value: rand::distr::uniform::Error) -> Self {
        Self::WeightRange(value)
    }
}

impl From<serde_json::Error> for ConfigErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Spec(value)
    }
}

/// A failure raised while a worker processed its rows.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerErr {
    Dataset { row: usize, source: DatasetErr },
    Network { row: usize, source: SizeMismatch },
    NonFinite { row: usize },
    Cancelled { row: usize },
}

impl Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Dataset { row, .. } => write!(f, "failed to read row {row}"),
            WorkerErr::Network { row, .. } => write!(f, "failed to compute row {row}"),
            WorkerErr::NonFinite { row } => {
                write!(f, "the network produced a non-finite output at row {row}")
            }
            WorkerErr::Cancelled { row } => write!(f, "cancelled before row {row}"),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Dataset { source, .. } => Some(source),
            WorkerErr::Network { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// The single error type callers see from a trainer.
#[derive(Debug)]
pub enum TrainErr {
    Config(ConfigErr),
    Worker {
        worker: usize,
        iteration: usize,
        cause: WorkerErr,
    },
    StateConsistency(SizeMismatch),
}

impl TrainErr {
    /// Returns `true` if the failure was a cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            TrainErr::Worker {
                cause: WorkerErr::Cancelled { .. },
                ..
            }
        )
    }
}

impl Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Config(e) => write!(f, "configuration error: {e}"),
            TrainErr::Worker {
                worker,
                iteration,
                cause,
            } => write!(
                f,
                "worker {worker} failed at iteration {iteration}: {cause}"
            ),
            TrainErr::StateConsistency(e) => write!(f, "inconsistent trainer state: {e}"),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Config(e) => Some(e),
            TrainErr::Worker { cause, .. } => Some(cause),
            TrainErr::StateConsistency(e) => Some(e),
        }
    }
}

impl From<ConfigErr> for TrainErr {
    fn from(value: ConfigErr) -> Self {
        Self::Config(value)
    }
}
