use rand::{SeedableRng, rngs::StdRng};

use flatprop::{
    ConfigErr, DatasetErr, TrainErr, WorkerErr,
    data::{DataPair, DatasetHandle, InMemoryDataset, InMemoryHandle, IndexableDataset},
    network::{ActivationFn::*, FlatLayer, FlatNetwork},
    training::{
        Train, TrainFlatNetworkProp, TrainerBuilder, TrainingContinuation,
        rules::{Backpropagation, ManhattanUpdate, ResilientPropagation},
    },
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn network(seed: u64) -> FlatNetwork {
    let mut net = FlatNetwork::new(&[
        FlatLayer::new(2, Linear).with_bias(),
        FlatLayer::new(4, Sigmoid).with_bias(),
        FlatLayer::new(1, Sigmoid),
    ])
    .unwrap();
    net.randomize(&mut StdRng::seed_from_u64(seed), -1., 1.)
        .unwrap();
    net
}

/// XOR, with every row twice and slightly perturbed inputs.
fn xor_like() -> InMemoryDataset {
    let inputs: Vec<_> = (0..8)
        .map(|i| {
            let jitter = if i < 4 { 0. } else { 0.05 };
            vec![(i % 2) as f64 + jitter, (i / 2 % 2) as f64 - jitter]
        })
        .collect();
    let ideals: Vec<_> = (0..8)
        .map(|i| vec![((i % 2) ^ (i / 2 % 2)) as f64])
        .collect();
    InMemoryDataset::from_rows(&inputs, &ideals).unwrap()
}

fn assert_close(a: &[f64], b: &[f64], tolerance: f64) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() < tolerance, "index {i}: {x} vs {y}");
    }
}

#[test]
fn merged_gradient_does_not_depend_on_the_worker_count() {
    init_logger();

    let gradients = |threads| {
        let mut trainer =
            TrainFlatNetworkProp::new(network(1), xor_like(), ManhattanUpdate::new(0.1)).unwrap();
        trainer.set_num_threads(threads);
        trainer.calculate_gradients().unwrap();
        assert_eq!(trainer.worker_count(), threads);
        trainer.gradients()
    };

    let single = gradients(1);
    assert!(single.iter().any(|g| *g != 0.));
    assert_close(&gradients(3), &single, 1e-12);
    assert_close(&gradients(8), &single, 1e-12);
}

#[test]
fn zero_gradients_leave_the_weights_alone() {
    let net = FlatNetwork::new(&[
        FlatLayer::new(2, Linear).with_bias(),
        FlatLayer::new(2, Linear).with_bias(),
        FlatLayer::new(1, Linear),
    ])
    .unwrap();
    let ds = InMemoryDataset::new(vec![0.; 12], 2, 1).unwrap();

    let mut trainer = TrainFlatNetworkProp::new(net, ds, ResilientPropagation::default()).unwrap();
    trainer.set_num_threads(2);
    trainer.iterations(10).unwrap();

    assert!(trainer.network().weights().iter().all(|w| *w == 0.));
    assert_eq!(trainer.error(), 0.);
    assert_eq!(trainer.iteration_number(), 10);
}

#[test]
fn empty_dataset_leaves_the_network_alone() {
    let net = network(8);
    let ds = InMemoryDataset::new(Vec::new(), 2, 1).unwrap();

    let mut trainer =
        TrainFlatNetworkProp::new(net.clone(), ds, ResilientPropagation::default()).unwrap();
    trainer.set_num_threads(4);
    trainer.iterations(3).unwrap();

    assert_eq!(trainer.worker_count(), 1);
    assert_eq!(trainer.error(), 0.);
    assert!(trainer.gradients().iter().all(|g| *g == 0.));
    assert_eq!(trainer.network().weights(), net.weights());
    assert_eq!(trainer.iteration_number(), 3);
}

#[test]
fn one_and_four_workers_train_the_same_network() {
    init_logger();

    let train = |threads| {
        let rule = Backpropagation::new(0.5, 0.2);
        let mut trainer = TrainFlatNetworkProp::new(network(7), xor_like(), rule).unwrap();
        trainer.set_num_threads(threads);
        trainer.iterations(50).unwrap();
        assert_eq!(trainer.worker_count(), threads);
        (trainer.network().weights().to_vec(), trainer.error())
    };

    let (single, single_error) = train(1);
    let (parallel, parallel_error) = train(4);

    assert_close(&parallel, &single, 1e-9);
    assert_ne!(single, network(7).weights());
    // Four equal partitions: the mean of worker errors is the global error.
    assert!((single_error - parallel_error).abs() < 1e-9);
}

#[test]
fn training_reduces_the_error() {
    let mut trainer =
        TrainFlatNetworkProp::new(network(3), xor_like(), ResilientPropagation::default())
            .unwrap();
    trainer.iteration().unwrap();
    let first = trainer.error();

    trainer.iterations(200).unwrap();
    assert!(trainer.error() < first);
}

/// A dataset whose handles fail when reading a given row.
#[derive(Clone)]
struct Flaky {
    inner: InMemoryDataset,
    fail_at: usize,
}

struct FlakyHandle {
    inner: InMemoryHandle,
    fail_at: usize,
}

impl IndexableDataset for Flaky {
    type Handle = FlakyHandle;

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn input_size(&self) -> usize {
        self.inner.input_size()
    }

    fn ideal_size(&self) -> usize {
        self.inner.ideal_size()
    }

    fn open_additional(&self) -> FlakyHandle {
        FlakyHandle {
            inner: self.inner.open_additional(),
            fail_at: self.fail_at,
        }
    }
}

impl DatasetHandle for FlakyHandle {
    fn read_row(&mut self, index: usize, pair: &mut DataPair) -> Result<(), DatasetErr> {
        if index == self.fail_at {
            return Err(DatasetErr::Malformed {
                row: index,
                reason: "corrupted".into(),
            });
        }

        self.inner.read_row(index, pair)
    }
}

#[test]
fn worker_failure_is_reported_without_touching_the_weights() {
    init_logger();

    let net = network(4);
    let ds = Flaky {
        inner: xor_like(),
        fail_at: 5,
    };

    let mut trainer =
        TrainFlatNetworkProp::new(net.clone(), ds, ManhattanUpdate::new(0.1)).unwrap();
    trainer.set_num_threads(4);

    let err = trainer.iteration().unwrap_err();
    match err {
        TrainErr::Worker {
            worker,
            iteration,
            cause: WorkerErr::Dataset { row, .. },
        } => {
            assert_eq!(worker, 2);
            assert_eq!(iteration, 1);
            assert_eq!(row, 5);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(trainer.network().weights(), net.weights());
    assert_eq!(trainer.error(), 0.);
    assert!(trainer.gradients().iter().all(|g| *g == 0.));
    assert!(!trainer.iteration().unwrap_err().is_cancelled());
}

#[test]
fn cancellation_stops_training() {
    let mut trainer =
        TrainFlatNetworkProp::new(network(5), xor_like(), ManhattanUpdate::new(0.1)).unwrap();
    trainer.set_num_threads(2);
    let before = trainer.network().weights().to_vec();

    trainer.cancellation_token().cancel();
    let err = trainer.iterations(5).unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(trainer.iteration_number(), 1);
    assert_eq!(trainer.network().weights(), before);
}

#[test]
fn paused_training_resumes_identically() {
    let mut uninterrupted =
        TrainFlatNetworkProp::new(network(6), xor_like(), ResilientPropagation::default())
            .unwrap();
    uninterrupted.set_num_threads(1);
    uninterrupted.iterations(5).unwrap();

    let json = serde_json::to_string(&uninterrupted.pause()).unwrap();
    let continuation: TrainingContinuation = serde_json::from_str(&json).unwrap();

    let mut resumed = TrainFlatNetworkProp::new(
        uninterrupted.network().clone(),
        xor_like(),
        ResilientPropagation::default(),
    )
    .unwrap();
    resumed.set_num_threads(1);
    resumed.resume(&continuation).unwrap();

    uninterrupted.iterations(5).unwrap();
    resumed.iterations(5).unwrap();
    assert_close(resumed.network().weights(), uninterrupted.network().weights(), 1e-12);

    let mut other =
        TrainFlatNetworkProp::new(network(6), xor_like(), ManhattanUpdate::new(0.1)).unwrap();
    assert!(matches!(
        other.resume(&continuation),
        Err(TrainErr::Config(ConfigErr::Continuation(_)))
    ));
}

#[test]
fn builds_from_json() {
    let json = r#"{
        "network": {
            "layers": [
                { "count": 2, "activation": "linear", "bias": 1.0 },
                { "count": 3, "activation": "tanh", "bias": 1.0 },
                { "count": 1, "activation": "linear" }
            ],
            "seed": 11
        },
        "trainer": {
            "threads": 2,
            "error_function": "arc_tan",
            "error_mode": "rms",
            "rule": { "backpropagation": { "learning_rate": 0.1, "momentum": 0.0 } },
            "connection_limit": 0.05
        },
        "dataset": { "data": [0, 0, 0, 1, 0, 1, 0, 1, 1, 1, 1, 0], "x_size": 2, "y_size": 1 },
        "max_iterations": 10,
        "target_error": 0.01
    }"#;

    let mut trainer = TrainerBuilder::new().from_json(json).unwrap();
    assert_eq!(trainer.network().connection_limit(), Some(0.05));

    trainer.iterations(3).unwrap();
    assert_eq!(trainer.iteration_number(), 3);
    assert!(trainer.error() > 0.);
    trainer.finish_training();
}
