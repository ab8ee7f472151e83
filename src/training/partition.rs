use std::{num::NonZeroUsize, ops::Range, thread};

/// A contiguous half-open range of rows assigned to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkRange {
    low: usize,
    high: usize,
}

impl WorkRange {
    pub fn new(low: usize, high: usize) -> Self {
        debug_assert!(low <= high);
        Self { low, high }
    }

    pub fn low(&self) -> usize {
        self.low
    }

    pub fn high(&self) -> usize {
        self.high
    }

    pub fn len(&self) -> usize {
        self.high - self.low
    }

    pub fn is_empty(&self) -> bool {
        self.low == self.high
    }

    /// Returns the row indices covered by this range.
    pub fn rows(&self) -> Range<usize> {
        self.low..self.high
    }
}

/// Splits `total` rows among `workers` and returns the range of `worker_id`.
///
/// Ranges are contiguous, disjoint and cover `[0..total)`, the first `total % workers` ranges
/// take one extra row.
///
/// # Returns
/// The worker's range, or `None` if `worker_id` isn't one of the `workers`.
pub fn partition(total: usize, worker_id: usize, workers: NonZeroUsize) -> Option<WorkRange> {
    let workers = workers.get();
    if worker_id >= workers {
        return None;
    }

    let base = total / workers;
    let rem = total % workers;

    let low = worker_id * base + worker_id.min(rem);
    let extra = usize::from(worker_id < rem);

    Some(WorkRange::new(low, low + base + extra))
}

/// Decides how many workers a dataset is split into, and which rows each one gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadPartitioner {
    workers: NonZeroUsize,
    total_rows: usize,
}

impl WorkloadPartitioner {
    /// Creates a new `WorkloadPartitioner`.
    ///
    /// # Arguments
    /// * `requested` - The wanted amount of workers, `0` meaning one per available core.
    /// * `total_rows` - The amount of rows to split.
    pub fn new(requested: usize, total_rows: usize) -> Self {
        let wanted = match requested {
            0 => available_cores(),
            n => n,
        };

        let workers = NonZeroUsize::new(wanted.min(total_rows)).unwrap_or(NonZeroUsize::MIN);
        Self {
            workers,
            total_rows,
        }
    }

    /// Returns the effective amount of workers.
    pub fn worker_count(&self) -> usize {
        self.workers.get()
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Returns one range per worker, in row order.
    pub fn ranges(&self) -> Vec<WorkRange> {
        (0..self.workers.get())
            .filter_map(|id| partition(self.total_rows, id, self.workers))
            .collect()
    }
}

fn available_cores() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}
