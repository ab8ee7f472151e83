use parking_lot::Mutex;

use crate::error::{SizeMismatch, WorkerErr};

/// The merged outcome of every worker's report.
#[derive(Debug)]
pub(crate) struct Totals {
    pub gradients: Vec<f64>,
    pub total_error: f64,
    pub reports: usize,
    pub failure: Option<(usize, WorkerErr)>,
    pub inconsistency: Option<SizeMismatch>,
}

impl Totals {
    /// Drops any partial sums, leaving the accumulator ready for a new pass.
    pub fn discard(&mut self) {
        self.gradients.fill(0.);
        self.total_error = 0.;
        self.reports = 0;
        self.failure = None;
        self.inconsistency = None;
    }
}

/// The coordinator-owned gradient and error accumulator workers report into.
///
/// Every report is a single critical section, so contributions never interleave.
#[derive(Debug)]
pub(crate) struct GradientAccumulator {
    totals: Mutex<Totals>,
}

impl GradientAccumulator {
    /// Creates a new zeroed `GradientAccumulator`.
    ///
    /// # Arguments
    /// * `len` - The length of the network's weight vector.
    pub fn new(len: usize) -> Self {
        Self {
            totals: Mutex::new(Totals {
                gradients: vec![0.; len],
                total_error: 0.,
                reports: 0,
                failure: None,
                inconsistency: None,
            }),
        }
    }

    /// Merges a worker's outcome.
    ///
    /// A successful outcome adds its gradient and error. A failed one only records the first
    /// failure, leaving the sums untouched.
    ///
    /// # Arguments
    /// * `worker` - The id of the reporting worker.
    /// * `outcome` - The worker's gradient and error, or the error that stopped it.
    pub fn report(&self, worker: usize, outcome: Result<(&[f64], f64), WorkerErr>) {
        let mut totals = self.totals.lock();
        totals.reports += 1;

        let (grad, error) = match outcome {
            Ok(contribution) => contribution,
            Err(cause) => {
                totals.failure.get_or_insert((worker, cause));
                return;
            }
        };

        if let Err(mismatch) = SizeMismatch::check("gradient", grad.len(), totals.gradients.len()) {
            totals.inconsistency.get_or_insert(mismatch);
            return;
        }

        totals
            .gradients
            .iter_mut()
            .zip(grad)
            .for_each(|(acc, g)| *acc += g);
        totals.total_error += error;
    }

    /// Zeroes the sums and report bookkeeping before a new gradient pass.
    pub fn begin_pass(&self) {
        self.totals.lock().discard();
    }

    /// Gives lock-free access to the totals while no worker is running.
    pub fn get_mut(&mut self) -> &mut Totals {
        self.totals.get_mut()
    }

    /// Copies the current gradient sums.
    pub fn gradients(&self) -> Vec<f64> {
        self.totals.lock().gradients.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_are_summed() {
        let mut acc = GradientAccumulator::new(3);
        acc.report(0, Ok((&[1., 2., 3.][..], 0.5)));
        acc.report(1, Ok((&[1., 1., 1.][..], 0.25)));

        let totals = acc.get_mut();
        assert_eq!(totals.gradients, [2., 3., 4.]);
        assert_eq!(totals.total_error, 0.75);
        assert_eq!(totals.reports, 2);
        assert!(totals.failure.is_none());
    }

    #[test]
    fn failures_do_not_touch_the_sums() {
        let mut acc = GradientAccumulator::new(2);
        acc.report(0, Ok((&[1., 1.][..], 1.)));
        acc.report(1, Err(WorkerErr::NonFinite { row: 3 }));
        acc.report(2, Err(WorkerErr::NonFinite { row: 9 }));

        let totals = acc.get_mut();
        assert_eq!(totals.gradients, [1., 1.]);
        assert_eq!(totals.total_error, 1.);
        assert_eq!(totals.failure, Some((1, WorkerErr::NonFinite { row: 3 })));

        totals.discard();
        assert_eq!(totals.gradients, [0., 0.]);
        assert!(totals.failure.is_none());
    }

    #[test]
    fn wrong_length_is_an_inconsistency() {
        let mut acc = GradientAccumulator::new(2);
        acc.report(0, Ok((&[1., 1., 1.][..], 1.)));

        let totals = acc.get_mut();
        assert_eq!(totals.gradients, [0., 0.]);
        assert_eq!(
            totals.inconsistency,
            Some(SizeMismatch {
                what: "gradient",
                got: 3,
                expected: 2
            })
        );
    }

    #[test]
    fn a_new_pass_starts_from_zero() {
        let mut acc = GradientAccumulator::new(2);
        acc.report(0, Ok((&[1., -2.][..], 0.5)));
        acc.begin_pass();
        acc.report(0, Ok((&[1., -2.][..], 0.5)));

        let totals = acc.get_mut();
        assert_eq!(totals.gradients, [1., -2.]);
        assert_eq!(totals.total_error, 0.5);
        assert_eq!(totals.reports, 1);
    }

    #[test]
    fn concurrent_reports() {
        let acc = GradientAccumulator::new(4);
        std::thread::scope(|s| {
            for id in 0..8 {
                let acc = &acc;
                s.spawn(move || acc.report(id, Ok((&[1.; 4][..], 1.))));
            }
        });

        let totals = acc.totals.lock();
        assert_eq!(totals.gradients, [8.; 4]);
        assert_eq!(totals.total_error, 8.);
    }
}
