use crate::error::DatasetErr;

/// A reusable buffer for one supervised row.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPair {
    pub input: Vec<f64>,
    pub ideal: Vec<f64>,
    pub significance: f64,
}

impl DataPair {
    /// Creates a zeroed pair of the given widths with a significance of `1.0`.
    pub fn new(input_size: usize, ideal_size: usize) -> Self {
        Self {
            input: vec![0.; input_size],
            ideal: vec![0.; ideal_size],
            significance: 1.,
        }
    }
}

/// A dataset whose rows can be read by position from several threads at once.
///
/// Every call to `open_additional` must return a handle that shares no cursor with any other,
/// so each worker can read its own rows without coordination.
pub trait IndexableDataset {
    type Handle: DatasetHandle + Send;

    /// Returns the amount of rows.
    fn len(&self) -> usize;

    /// Returns `true` if the dataset has no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the width of every input row.
    fn input_size(&self) -> usize;

    /// Returns the width of every ideal row.
    fn ideal_size(&self) -> usize;

    /// Opens a new independent read handle.
    fn open_additional(&self) -> Self::Handle;
}

/// A position-addressable read handle over an `IndexableDataset`.
pub trait DatasetHandle {
    /// Reads the row at `index` into `pair`.
    ///
    /// # Arguments
    /// * `index` - The absolute row index.
    /// * `pair` - The buffer the row will be written to, sized with the dataset's widths.
    ///
    /// # Returns
    /// A `DatasetErr` if the row doesn't exist or can't be decoded.
    fn read_row(&mut self, index: usize, pair: &mut DataPair) -> Result<(), DatasetErr>;
}
