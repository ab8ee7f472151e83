use serde::{Deserialize, Serialize};

/// How a worker condenses its squared errors into a single value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    /// Mean squared error.
    #[default]
    Mse,
    /// Root mean squared error.
    Rms,
    /// Half the sum of squared errors.
    Sse,
}

/// Running error over a set of rows.
#[derive(Debug, Clone, Default)]
pub struct ErrorCalculation {
    mode: ErrorMode,
    global_error: f64,
    set_size: usize,
}

impl ErrorCalculation {
    pub fn new(mode: ErrorMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Adds one row's error.
    ///
    /// # Arguments
    /// * `actual` - The network's output row.
    /// * `ideal` - The expected output row.
    /// * `significance` - The weight of this row.
    pub fn update_error(&mut self, actual: &[f64], ideal: &[f64], significance: f64) {
        for (a, i) in actual.iter().zip(ideal) {
            let delta = (i - a) * significance;
            self.global_error += delta * delta;
        }

        self.set_size += ideal.len();
    }

    /// Returns the error of every row seen since the last reset, `0` if there were none.
    pub fn calculate(&self) -> f64 {
        if self.set_size == 0 {
            return 0.;
        }

        match self.mode {
            ErrorMode::Mse => self.global_error / self.set_size as f64,
            ErrorMode::Rms => (self.global_error / self.set_size as f64).sqrt(),
            ErrorMode::Sse => self.global_error / 2.,
        }
    }

    pub fn reset(&mut self) {
        self.global_error = 0.;
        self.set_size = 0;
    }

    pub fn mode(&self) -> ErrorMode {
        self.mode
    }
}
