use std::sync::Arc;

use super::{DataPair, DatasetHandle, IndexableDataset};
use crate::error::{ConfigErr, DatasetErr, SizeMismatch};

/// An in-memory dataset backed by a single shared buffer.
///
/// Rows are stored contiguously as `input_size` input values followed by `ideal_size` ideal
/// values. Handles share the buffer, never a cursor.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    input_size: usize,
    ideal_size: usize,
    data: Arc<[f64]>,
    significance: Option<Arc<[f64]>>,
}

impl InMemoryDataset {
    /// Creates a new `InMemoryDataset` from interleaved rows.
    ///
    /// # Arguments
    /// * `data` - Every row's input values followed by its ideal values.
    /// * `input_size` - The width of the input rows.
    /// * `ideal_size` - The width of the ideal rows.
    ///
    /// # Returns
    /// A `ConfigErr` if there are no columns or `data` isn't a whole amount of rows.
    pub fn new(data: Vec<f64>, input_size: usize, ideal_size: usize) -> Result<Self, ConfigErr> {
        let width = input_size + ideal_size;
        if width == 0 {
            return Err(ConfigErr::EmptyDataset);
        }

        let rows = data.len() / width;
        SizeMismatch::check("dataset", data.len(), rows * width)?;

        Ok(Self {
            input_size,
            ideal_size,
            data: Arc::from(data),
            significance: None,
        })
    }

    /// Creates a new `InMemoryDataset` from separate input and ideal rows.
    ///
    /// # Returns
    /// A `ConfigErr` if the rows are ragged or the two sides have a different amount of rows.
    pub fn from_rows(inputs: &[Vec<f64>], ideals: &[Vec<f64>]) -> Result<Self, ConfigErr> {
        SizeMismatch::check("ideal rows", ideals.len(), inputs.len())?;

        let input_size = inputs.first().map_or(0, Vec::len);
        let ideal_size = ideals.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(inputs.len() * (input_size + ideal_size));

        for (input, ideal) in inputs.iter().zip(ideals) {
            SizeMismatch::check("input row", input.len(), input_size)?;
            SizeMismatch::check("ideal row", ideal.len(), ideal_size)?;
            data.extend_from_slice(input);
            data.extend_from_slice(ideal);
        }

        Self::new(data, input_size, ideal_size)
    }

    /// Attaches a per-row significance, scaling each row's contribution to error and gradient.
    ///
    /// # Returns
    /// A `ConfigErr` if there isn't exactly one significance per row.
    pub fn with_significance(mut self, significance: Vec<f64>) -> Result<Self, ConfigErr> {
        SizeMismatch::check("significance", significance.len(), self.len())?;
        self.significance = Some(Arc::from(significance));
        Ok(self)
    }
}

impl IndexableDataset for InMemoryDataset {
    type Handle = InMemoryHandle;

    fn len(&self) -> usize {
        self.data.len() / (self.input_size + self.ideal_size)
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn ideal_size(&self) -> usize {
        self.ideal_size
    }

    fn open_additional(&self) -> InMemoryHandle {
        InMemoryHandle {
            dataset: self.clone(),
        }
    }
}

/// An independent read handle over an `InMemoryDataset`.
#[derive(Debug, Clone)]
pub struct InMemoryHandle {
    dataset: InMemoryDataset,
}

impl DatasetHandle for InMemoryHandle {
    fn read_row(&mut self, index: usize, pair: &mut DataPair) -> Result<(), DatasetErr> {
        let ds = &self.dataset;
        let len = ds.len();
        if index >= len {
            return Err(DatasetErr::RowOutOfRange { row: index, len });
        }

        if pair.input.len() != ds.input_size || pair.ideal.len() != ds.ideal_size {
            return Err(DatasetErr::Malformed {
                row: index,
                reason: format!(
                    "expected a {}x{} pair, got {}x{}",
                    ds.input_size,
                    ds.ideal_size,
                    pair.input.len(),
                    pair.ideal.len()
                ),
            });
        }

        let start = index * (ds.input_size + ds.ideal_size);
        let (input, ideal) = ds.data[start..start + ds.input_size + ds.ideal_size]
            .split_at(ds.input_size);
        pair.input.copy_from_slice(input);
        pair.ideal.copy_from_slice(ideal);
        pair.significance = ds.significance.as_ref().map_or(1., |s| s[index]);

        Ok(())
    }
}
