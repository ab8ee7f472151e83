mod dataset;
mod memory;

pub use dataset::{DataPair, DatasetHandle, IndexableDataset};
pub use memory::{InMemoryDataset, InMemoryHandle};
