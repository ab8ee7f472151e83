use std::ops::Index;

use crate::network::FlatNetwork;

/// One derivative floor per activation function of a network, output layer first.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatSpotTable(Box<[f64]>);

impl FlatSpotTable {
    /// Builds the table for `network`.
    ///
    /// # Arguments
    /// * `network` - The network whose activations decide each entry.
    /// * `fix_flat_spot` - If `false`, every entry is zero and no correction is applied.
    pub fn new(network: &FlatNetwork, fix_flat_spot: bool) -> Self {
        let table = network
            .activations()
            .iter()
            .map(|act| if fix_flat_spot { act.flat_spot() } else { 0. })
            .collect();

        Self(table)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Index<usize> for FlatSpotTable {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}
