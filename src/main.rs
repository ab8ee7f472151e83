use std::{env, fs};

use anyhow::Context;
use log::info;

use flatprop::{
    specs::ExperimentSpec,
    training::{Train, TrainerBuilder},
};

const REPORT_EVERY: usize = 100;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let spec = match env::args().nth(1) {
        Some(path) => {
            let json = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            serde_json::from_str(&json).with_context(|| format!("parsing {path}"))?
        }
        None => {
            info!("no experiment given, training XOR");
            ExperimentSpec::xor()
        }
    };

    let mut trainer = TrainerBuilder::new().build(&spec)?;

    loop {
        trainer.iteration()?;

        let iteration = trainer.iteration_number();
        let error = trainer.error();
        if iteration % REPORT_EVERY == 0 {
            info!(iteration, error; "training");
        }

        if error < spec.target_error || iteration >= spec.max_iterations {
            break;
        }
    }

    trainer.finish_training();
    info!(
        iterations = trainer.iteration_number(),
        error = trainer.error();
        "training finished"
    );

    let mut network = trainer.network().clone();
    let rows = spec.dataset.data.chunks_exact(spec.dataset.x_size + spec.dataset.y_size);
    let mut output = vec![0.; spec.dataset.y_size];
    for row in rows {
        let (input, ideal) = row.split_at(spec.dataset.x_size);
        network.compute(input, &mut output)?;
        info!("{input:?} -> {output:.4?} (ideal {ideal:?})");
    }

    Ok(())
}
