use clap::Args;
use serde_json::Value;

use practice_valuation_core::input::ValuationInput;
use practice_valuation_core::safeguard::{self, SafeguardInput};
use practice_valuation_core::validation::bounds::{self, InputBounds};

use crate::input;

/// Arguments for the practice-size safeguard
#[derive(Args)]
pub struct SafeguardArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for input bounds validation
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to a practice record (JSON or YAML)
    #[arg(long)]
    pub input: Option<String>,

    /// Alternative bounds table (JSON or YAML)
    #[arg(long)]
    pub bounds: Option<String>,
}

pub fn run_safeguard(args: SafeguardArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let sg_input: SafeguardInput = input::read_input(args.input.as_deref(), "safeguard")?;
    let result = safeguard::apply_safeguard(&sg_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_validate(args: ValidateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let record: ValuationInput = input::read_input(args.input.as_deref(), "validation")?;
    let table: InputBounds = match args.bounds {
        Some(ref path) => input::file::read_structured(path)?,
        None => InputBounds::default(),
    };
    let result = bounds::validate_inputs(&record, &table)?;
    Ok(serde_json::to_value(result)?)
}
