use clap::Args;
use serde_json::Value;

use practice_valuation_core::config::EngineConfig;
use practice_valuation_core::engine::{self, EngineRequest};
use practice_valuation_core::hybrid::policy::WeightingPolicy;
use practice_valuation_core::valuation::dcf::{self, DcfInput};
use practice_valuation_core::valuation::epv::{self, EpvInput};
use practice_valuation_core::valuation::synergy::{self, SynergyInput};

use crate::input;

/// Arguments for the full practice valuation
#[derive(Args)]
pub struct ValueArgs {
    /// Path to a practice record, or a `{input, config}` request (JSON or YAML)
    #[arg(long)]
    pub input: Option<String>,

    /// Engine configuration file (JSON or YAML); overrides any embedded config
    #[arg(long)]
    pub config: Option<String>,

    /// Seed for reproducible Monte Carlo passes
    #[arg(long)]
    pub seed: Option<u64>,

    /// Primary Monte Carlo iterations (clamped to 100-5000)
    #[arg(long)]
    pub runs: Option<u32>,

    /// Force a weighting policy: conservative, balanced or growth-biased
    #[arg(long)]
    pub policy: Option<WeightingPolicy>,

    /// Skip the primary Monte Carlo pass
    #[arg(long)]
    pub no_simulation: bool,
}

/// Arguments for an Earnings Power Value calculation
#[derive(Args)]
pub struct EpvArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for the decaying-growth DCF
#[derive(Args)]
pub struct DcfArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Projection years (overrides the input file)
    #[arg(long)]
    pub years: Option<u32>,
}

/// Arguments for the synergy calculator
#[derive(Args)]
pub struct SynergyArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_value(args: ValueArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let raw: Value = input::read_input(args.input.as_deref(), "practice valuation")?;
    let mut request: EngineRequest = if raw.get("input").is_some() {
        serde_json::from_value(raw)?
    } else {
        EngineRequest {
            input: serde_json::from_value(raw)?,
            config: EngineConfig::default(),
        }
    };

    if let Some(ref path) = args.config {
        request.config = input::file::read_structured(path)?;
    }
    if let Some(seed) = args.seed {
        request.config.seed = Some(seed);
    }
    if let Some(runs) = args.runs {
        request.config.runs = runs;
    }
    if args.policy.is_some() {
        request.config.weighting_override = args.policy;
    }
    if args.no_simulation {
        request.config.run_primary_simulation = false;
    }

    let result = engine::run_request(&request)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_epv(args: EpvArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let epv_input: EpvInput = input::read_input(args.input.as_deref(), "EPV")?;
    let result = epv::calculate_epv(&epv_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_dcf(args: DcfArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut dcf_input: DcfInput = input::read_input(args.input.as_deref(), "DCF")?;
    if let Some(years) = args.years {
        dcf_input.projection_years = years;
    }
    let result = dcf::calculate_dcf(&dcf_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_synergy(args: SynergyArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let synergy_input: SynergyInput = input::read_input(args.input.as_deref(), "synergy analysis")?;
    let result = synergy::calculate_synergies(&synergy_input)?;
    Ok(serde_json::to_value(result)?)
}
