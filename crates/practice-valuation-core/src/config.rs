//! Engine configuration.
//!
//! Every tunable constant of the pipeline lives here with a default, so a
//! caller can substitute benchmark sets, bounds tables or policies per
//! industry or region without touching code. Every field is optional when
//! deserialising.

use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::hybrid::policy::WeightingPolicy;
use crate::safeguard::SafeguardPolicy;
use crate::simulation::engine::{StochasticDistributions, DEFAULT_RUNS};
use crate::types::Rate;
use crate::validation::bounds::InputBounds;
use crate::valuation::benchmarks::BenchmarkSet;
use crate::valuation::dcf::GrowthPolicy;
use crate::valuation::epv::Reinvestment;
use crate::valuation::synergy::SynergyPolicy;
use crate::PracticeValuationResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Primary Monte-Carlo iterations, clamped to [100, 5000]
    pub runs: u32,
    /// Seed for reproducible runs; the confidence-interval pass uses `seed + 1`
    pub seed: Option<u64>,
    /// Forces a weighting preset instead of deriving one
    pub weighting_override: Option<WeightingPolicy>,
    pub distributions: StochasticDistributions,
    /// Iterations for the confidence-interval pass
    pub confidence_runs: u32,
    pub run_primary_simulation: bool,
    pub projection_years: u32,
    pub mid_year_convention: bool,
    /// Net working capital as a fraction of incremental revenue
    pub nwc_pct_incremental_revenue: Rate,
    /// EPV reinvestment; maintenance capex when absent
    pub reinvestment: Option<Reinvestment>,
    pub growth_policy: GrowthPolicy,
    pub synergy_policy: SynergyPolicy,
    pub benchmarks: BenchmarkSet,
    pub bounds: InputBounds,
    pub safeguard: SafeguardPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            runs: DEFAULT_RUNS,
            seed: None,
            weighting_override: None,
            distributions: StochasticDistributions::default(),
            confidence_runs: DEFAULT_RUNS,
            run_primary_simulation: true,
            projection_years: 5,
            mid_year_convention: false,
            nwc_pct_incremental_revenue: dec!(0.05),
            reinvestment: None,
            growth_policy: GrowthPolicy::default(),
            synergy_policy: SynergyPolicy::default(),
            benchmarks: BenchmarkSet::default(),
            bounds: InputBounds::default(),
            safeguard: SafeguardPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> PracticeValuationResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Seed for the confidence-interval pass, independent of the primary run.
    pub fn confidence_seed(&self) -> Option<u64> {
        self.seed.map(|s| s.wrapping_add(1))
    }
}
