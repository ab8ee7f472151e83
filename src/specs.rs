use serde::{Deserialize, Serialize};

use crate::{
    network::{ActivationFn, FlatLayer},
    training::ErrorMode,
};

/// The specification for the `FlatNetwork` struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// The layers, input layer first.
    pub layers: Vec<FlatLayer>,
    pub seed: Option<u64>,
    #[serde(default = "default_weight_range")]
    pub weight_range: (f64, f64),
}

fn default_weight_range() -> (f64, f64) {
    (-1., 1.)
}

/// The specification for the `UpdateRule` trait.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRuleSpec {
    Backpropagation {
        learning_rate: f64,
        momentum: f64,
    },
    Manhattan {
        learning_rate: f64,
    },
    ResilientPropagation {
        #[serde(default = "default_initial_update")]
        initial_update: f64,
        #[serde(default = "default_max_step")]
        max_step: f64,
    },
}

fn default_initial_update() -> f64 {
    crate::training::rules::DEFAULT_INITIAL_UPDATE
}

fn default_max_step() -> f64 {
    crate::training::rules::DEFAULT_MAX_STEP
}

/// The specification for the `ErrorFunction` trait.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorFunctionSpec {
    #[default]
    Linear,
    ArcTan,
}

/// The specification for the `TrainFlatNetworkProp` struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerSpec {
    /// The amount of workers, `0` meaning one per available core.
    #[serde(default)]
    pub threads: usize,
    #[serde(default = "default_fix_flat_spot")]
    pub fix_flat_spot: bool,
    #[serde(default)]
    pub error_function: ErrorFunctionSpec,
    #[serde(default)]
    pub error_mode: ErrorMode,
    pub rule: UpdateRuleSpec,
    pub connection_limit: Option<f64>,
}

fn default_fix_flat_spot() -> bool {
    true
}

/// The specification for the `InMemoryDataset` struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// Every row's input followed by its ideal output.
    pub data: Vec<f64>,
    pub x_size: usize,
    pub y_size: usize,
}

/// A full training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSpec {
    pub network: NetworkSpec,
    pub trainer: TrainerSpec,
    pub dataset: DatasetSpec,
    pub max_iterations: usize,
    pub target_error: f64,
}

impl ExperimentSpec {
    /// The classic XOR problem on a 2-3-1 sigmoid network trained with RPROP.
    pub fn xor() -> Self {
        let layers = vec![
            FlatLayer::new(2, ActivationFn::Linear).with_bias(),
            FlatLayer::new(3, ActivationFn::Sigmoid).with_bias(),
            FlatLayer::new(1, ActivationFn::Sigmoid),
        ];

        #[rustfmt::skip]
        let data = vec![
            0., 0., 0.,
            1., 0., 1.,
            0., 1., 1.,
            1., 1., 0.,
        ];

        Self {
            network: NetworkSpec {
                layers,
                seed: Some(42),
                weight_range: default_weight_range(),
            },
            trainer: TrainerSpec {
                threads: 0,
                fix_flat_spot: true,
                error_function: ErrorFunctionSpec::Linear,
                error_mode: ErrorMode::Mse,
                rule: UpdateRuleSpec::ResilientPropagation {
                    initial_update: default_initial_update(),
                    max_step: default_max_step(),
                },
                connection_limit: None,
            },
            dataset: DatasetSpec {
                data,
                x_size: 2,
                y_size: 1,
            },
            max_iterations: 1000,
            target_error: 0.01,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trainer_defaults() {
        let json = r#"{ "rule": { "manhattan": { "learning_rate": 0.01 } } }"#;
        let spec: TrainerSpec = serde_json::from_str(json).unwrap();

        assert_eq!(spec.threads, 0);
        assert!(spec.fix_flat_spot);
        assert!(matches!(spec.error_function, ErrorFunctionSpec::Linear));
        assert_eq!(spec.error_mode, ErrorMode::Mse);
        assert!(spec.connection_limit.is_none());
    }

    #[test]
    fn negative_threads_are_rejected() {
        let json = r#"{ "threads": -2, "rule": { "manhattan": { "learning_rate": 0.01 } } }"#;
        assert!(serde_json::from_str::<TrainerSpec>(json).is_err());
    }

    #[test]
    fn rprop_defaults() {
        let json = r#"{ "resilient_propagation": {} }"#;
        let spec: UpdateRuleSpec = serde_json::from_str(json).unwrap();
        let UpdateRuleSpec::ResilientPropagation {
            initial_update,
            max_step,
        } = spec
        else {
            panic!("expected rprop, got {spec:?}");
        };
        assert_eq!(initial_update, 0.1);
        assert_eq!(max_step, 50.);
    }

    #[test]
    fn xor_round_trip() {
        let json = serde_json::to_string(&ExperimentSpec::xor()).unwrap();
        let spec: ExperimentSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec.network.layers, ExperimentSpec::xor().network.layers);
        assert_eq!(spec.dataset.data.len(), 12);
    }
}
