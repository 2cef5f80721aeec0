use clap::Args;
use serde_json::Value;

use practice_valuation_core::simulation::engine::{self, StochasticInput};

use crate::input;

/// Arguments for a standalone Monte Carlo valuation
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Seed for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Iterations (clamped to 100-5000)
    #[arg(long)]
    pub runs: Option<u32>,
}

pub fn run_simulate(args: SimulateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut sim_input: StochasticInput = input::read_input(args.input.as_deref(), "Monte Carlo simulation")?;
    if args.seed.is_some() {
        sim_input.seed = args.seed;
    }
    if let Some(runs) = args.runs {
        sim_input.runs = runs;
    }
    let result = engine::run_simulation(&sim_input)?;
    Ok(serde_json::to_value(result)?)
}
