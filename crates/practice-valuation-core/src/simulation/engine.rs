use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::input::MaintenanceCapex;
use crate::precision;
use crate::types::{to_f64, with_metadata_f64, ComputationOutput};
use crate::PracticeValuationResult;

use super::sampling::{
    build_histogram, clamp, sample_normal, summarize, DistributionSpec,
    HistogramBin, SampleStatistics,
};

pub const MIN_RUNS: u32 = 100;
pub const MAX_RUNS: u32 = 5000;
pub const DEFAULT_RUNS: u32 = 1000;

const WACC_BOUNDS: (f64, f64) = (0.03, 0.5);
const MARGIN_BOUNDS: (f64, f64) = (0.05, 0.6);
const CAPEX_PCT_BOUNDS: (f64, f64) = (0.005, 0.2);
const MIN_REVENUE_MULTIPLIER: f64 = 0.3;
/// Adjusted earnings above this magnitude are flagged as precision-sensitive.
const EARNINGS_PRECISION_LIMIT: f64 = 1e8;

// Volatility used when a variable has no explicit distribution.
const DEFAULT_WACC_STD: f64 = 0.015;
const DEFAULT_REVENUE_STD: f64 = 0.10;
const DEFAULT_MARGIN_STD: f64 = 0.02;
/// Capex percentage std as a fraction of its base value.
const DEFAULT_CAPEX_REL_STD: f64 = 0.20;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Optional per-variable distributions. Missing entries use a normal around base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StochasticDistributions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wacc: Option<DistributionSpec>,
    /// Multiplier on base revenue (1.0 = unchanged)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_multiplier: Option<DistributionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebitda_margin: Option<DistributionSpec>,
    /// Capex as a fraction of revenue; ignored for fixed capex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capex_pct: Option<DistributionSpec>,
    /// Presence switches enterprise value to the exit-multiple path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_multiple: Option<DistributionSpec>,
}

/// Input for the stochastic valuation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StochasticInput {
    pub revenue: f64,
    pub ebitda_margin: f64,
    #[serde(default)]
    pub depreciation_amortization: f64,
    #[serde(default)]
    pub maintenance_capex: MaintenanceCapex,
    pub tax_rate: f64,
    pub wacc: f64,
    #[serde(default)]
    pub cash: f64,
    #[serde(default)]
    pub debt: f64,
    /// Iterations, clamped to [100, 5000]
    #[serde(default = "default_runs")]
    pub runs: u32,
    /// Seed for a reproducible run; entropy otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub distributions: StochasticDistributions,
}

fn default_runs() -> u32 {
    DEFAULT_RUNS
}

/// Which formula produced the enterprise values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMethod {
    /// Adjusted earnings capitalised at the sampled WACC
    Capitalised,
    /// After-tax EBITDA times a sampled exit multiple
    ExitMultiple,
}

/// Ordered sample sets and their statistics.
///
/// `equity_values[i] == enterprise_values[i] + cash - debt` for every `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub runs: u32,
    pub method: SimulationMethod,
    pub enterprise_values: Vec<f64>,
    pub equity_values: Vec<f64>,
    pub enterprise_stats: SampleStatistics,
    pub equity_stats: SampleStatistics,
    pub histogram: Vec<HistogramBin>,
    pub mean_wacc: f64,
    pub mean_adjusted_earnings: f64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the Monte-Carlo valuation over revenue, margin, WACC, capex and
/// (optionally) exit multiple.
pub fn run_simulation(
    input: &StochasticInput,
) -> PracticeValuationResult<ComputationOutput<SimulationResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_stochastic_input(input)?;

    let mut rng = match input.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let result = simulate(input, &mut rng, &mut warnings);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        match result.method {
            SimulationMethod::Capitalised => {
                "Monte Carlo valuation: adjusted earnings capitalised at sampled WACC"
            }
            SimulationMethod::ExitMultiple => {
                "Monte Carlo valuation: after-tax EBITDA at sampled exit multiple"
            }
        },
        input,
        warnings,
        elapsed,
        result,
    ))
}

/// Clamp a requested run count into the supported range, noting any change.
pub fn clamp_runs(requested: u32, warnings: &mut Vec<String>) -> u32 {
    let runs = requested.clamp(MIN_RUNS, MAX_RUNS);
    if runs != requested {
        warnings.push(format!(
            "Requested {requested} runs; clamped to {runs} (allowed {MIN_RUNS}-{MAX_RUNS})"
        ));
    }
    runs
}

/// Core simulation over an injected random source.
pub fn simulate<R: Rng + ?Sized>(
    input: &StochasticInput,
    rng: &mut R,
    warnings: &mut Vec<String>,
) -> SimulationResult {
    let runs = clamp_runs(input.runs, warnings);
    let dists = &input.distributions;
    let method = if dists.exit_multiple.is_some() {
        SimulationMethod::ExitMultiple
    } else {
        SimulationMethod::Capitalised
    };
    let net_cash = input.cash - input.debt;

    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(runs as usize);
    let mut waccs: Vec<f64> = Vec::with_capacity(runs as usize);
    let mut earnings: Vec<f64> = Vec::with_capacity(runs as usize);
    let mut large_earnings = false;

    for _ in 0..runs {
        let wacc = clamp(
            draw(rng, dists.wacc.as_ref(), input.wacc, DEFAULT_WACC_STD),
            WACC_BOUNDS.0,
            WACC_BOUNDS.1,
        );
        let revenue_multiplier = draw(rng, dists.revenue_multiplier.as_ref(), 1.0, DEFAULT_REVENUE_STD)
            .max(MIN_REVENUE_MULTIPLIER);
        let revenue = input.revenue * revenue_multiplier;
        let margin = clamp(
            draw(rng, dists.ebitda_margin.as_ref(), input.ebitda_margin, DEFAULT_MARGIN_STD),
            MARGIN_BOUNDS.0,
            MARGIN_BOUNDS.1,
        );

        let ebitda = precision::multiply(revenue, margin);
        let ebit = ebitda - input.depreciation_amortization;
        let nopat = ebit * (1.0 - input.tax_rate);
        let capex = match input.maintenance_capex {
            MaintenanceCapex::PctOfRevenue(pct) => {
                let base = to_f64(pct);
                let pct = clamp(
                    draw(rng, dists.capex_pct.as_ref(), base, base.abs() * DEFAULT_CAPEX_REL_STD),
                    CAPEX_PCT_BOUNDS.0,
                    CAPEX_PCT_BOUNDS.1,
                );
                precision::multiply(revenue, pct)
            }
            MaintenanceCapex::Fixed(amount) => to_f64(amount),
        };
        let adjusted = nopat + input.depreciation_amortization - capex;
        if adjusted.abs() > EARNINGS_PRECISION_LIMIT {
            large_earnings = true;
        }

        let enterprise_value = match dists.exit_multiple.as_ref() {
            Some(spec) => {
                precision::multiply(ebitda * (1.0 - input.tax_rate), spec.sample(rng).max(0.0))
            }
            None => precision::divide(adjusted, wacc),
        };

        pairs.push((enterprise_value, enterprise_value + net_cash));
        waccs.push(wacc);
        earnings.push(adjusted);
    }

    if large_earnings {
        tracing::warn!("adjusted earnings above 1e8 in stochastic run");
        warnings.push(
            "Adjusted earnings exceed 1e8 in magnitude; results may be precision-sensitive".into(),
        );
    }

    // Equity is enterprise plus a constant, so one sort orders both.
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let (enterprise_values, equity_values): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();

    let enterprise_stats = summarize(&enterprise_values).unwrap_or_else(empty_statistics);
    let equity_stats = summarize(&equity_values).unwrap_or_else(empty_statistics);

    let recomputed_mean = precision::sum(&enterprise_values) / enterprise_values.len().max(1) as f64;
    if let Some(warning) = precision::check_precision(enterprise_stats.mean, recomputed_mean).warning {
        tracing::warn!(%warning, "precision loss in simulated mean");
        warnings.push(warning);
    }

    let nonfinite = enterprise_values.iter().filter(|v| !v.is_finite()).count();
    if nonfinite > 0 {
        warnings.push(format!("{nonfinite} simulated value(s) were not finite"));
    }

    SimulationResult {
        runs,
        method,
        histogram: build_histogram(&enterprise_values, 20),
        enterprise_stats,
        equity_stats,
        enterprise_values,
        equity_values,
        mean_wacc: precision::sum(&waccs) / runs as f64,
        mean_adjusted_earnings: precision::sum(&earnings) / runs as f64,
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn draw<R: Rng + ?Sized>(
    rng: &mut R,
    spec: Option<&DistributionSpec>,
    base: f64,
    default_std: f64,
) -> f64 {
    match spec {
        Some(spec) => spec.sample(rng),
        None => sample_normal(rng, base, default_std),
    }
}

fn empty_statistics() -> SampleStatistics {
    use super::sampling::Percentiles;
    SampleStatistics {
        count: 0,
        mean: f64::NAN,
        median: f64::NAN,
        std_dev: f64::NAN,
        min: f64::NAN,
        max: f64::NAN,
        percentiles: Percentiles {
            p5: f64::NAN,
            p10: f64::NAN,
            p25: f64::NAN,
            p50: f64::NAN,
            p75: f64::NAN,
            p90: f64::NAN,
            p95: f64::NAN,
        },
    }
}

fn validate_stochastic_input(input: &StochasticInput) -> PracticeValuationResult<()> {
    use crate::error::PracticeValuationError;

    let finite = [
        ("revenue", input.revenue),
        ("ebitda_margin", input.ebitda_margin),
        ("depreciation_amortization", input.depreciation_amortization),
        ("tax_rate", input.tax_rate),
        ("wacc", input.wacc),
        ("cash", input.cash),
        ("debt", input.debt),
    ];
    for (field, value) in finite {
        if !value.is_finite() {
            return Err(PracticeValuationError::InvalidInput {
                field: field.into(),
                reason: "Value must be finite".into(),
            });
        }
    }
    if input.revenue <= 0.0 {
        return Err(PracticeValuationError::InvalidInput {
            field: "revenue".into(),
            reason: "Revenue must be positive".into(),
        });
    }
    if !(0.0..1.0).contains(&input.tax_rate) {
        return Err(PracticeValuationError::InvalidInput {
            field: "tax_rate".into(),
            reason: "Tax rate must be in [0, 1)".into(),
        });
    }

    let dists = &input.distributions;
    let specs = [
        ("distributions.wacc", dists.wacc.as_ref()),
        ("distributions.revenue_multiplier", dists.revenue_multiplier.as_ref()),
        ("distributions.ebitda_margin", dists.ebitda_margin.as_ref()),
        ("distributions.capex_pct", dists.capex_pct.as_ref()),
        ("distributions.exit_multiple", dists.exit_multiple.as_ref()),
    ];
    for (field, spec) in specs {
        if let Some(spec) = spec {
            spec.validate(field)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    fn sample_stochastic_input() -> StochasticInput {
        StochasticInput {
            revenue: 3_000_000.0,
            ebitda_margin: 0.22,
            depreciation_amortization: 90_000.0,
            maintenance_capex: MaintenanceCapex::PctOfRevenue(dec!(0.025)),
            tax_rate: 0.25,
            wacc: 0.14,
            cash: 250_000.0,
            debt: 600_000.0,
            runs: 1000,
            seed: Some(42),
            distributions: StochasticDistributions::default(),
        }
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let a = run_simulation(&sample_stochastic_input()).unwrap().result;
        let b = run_simulation(&sample_stochastic_input()).unwrap().result;
        assert_eq!(a.enterprise_stats, b.enterprise_stats);
        assert_eq!(a.enterprise_values, b.enterprise_values);
    }

    #[test]
    fn test_equity_pairs_with_enterprise() {
        let out = run_simulation(&sample_stochastic_input()).unwrap().result;
        assert_eq!(out.enterprise_values.len(), out.equity_values.len());
        for (ev, eq) in out.enterprise_values.iter().zip(&out.equity_values) {
            assert_relative_eq!(*eq, *ev + 250_000.0 - 600_000.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_samples_sorted_and_percentiles_ordered() {
        let out = run_simulation(&sample_stochastic_input()).unwrap().result;
        assert!(out.enterprise_values.windows(2).all(|w| w[0] <= w[1]));
        let p = &out.enterprise_stats.percentiles;
        assert!(p.p5 <= p.p25 && p.p25 <= p.p50 && p.p50 <= p.p75 && p.p75 <= p.p95);
        assert_eq!(out.histogram.len(), 20);
    }

    #[test]
    fn test_runs_clamped_with_warning() {
        let mut input = sample_stochastic_input();
        input.runs = 20;
        let out = run_simulation(&input).unwrap();
        assert_eq!(out.result.runs, MIN_RUNS);
        assert!(out.warnings.iter().any(|w| w.contains("clamped")));

        input.runs = 1_000_000;
        assert_eq!(run_simulation(&input).unwrap().result.runs, MAX_RUNS);
    }

    #[test]
    fn test_sampled_wacc_stays_in_bounds() {
        let mut input = sample_stochastic_input();
        input.distributions.wacc = Some(DistributionSpec::Normal { mean: 0.14, std_dev: 0.5 });
        let out = run_simulation(&input).unwrap().result;
        assert!(out.mean_wacc >= 0.03 && out.mean_wacc <= 0.5);
        assert!(out.enterprise_values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_exit_multiple_path() {
        let mut input = sample_stochastic_input();
        input.distributions.exit_multiple =
            Some(DistributionSpec::Triangular { min: 4.0, mode: 5.0, max: 6.0 });
        input.distributions.revenue_multiplier =
            Some(DistributionSpec::Triangular { min: 1.0, mode: 1.0, max: 1.0 });
        input.distributions.ebitda_margin =
            Some(DistributionSpec::Triangular { min: 0.22, mode: 0.22, max: 0.22 });
        let out = run_simulation(&input).unwrap().result;
        assert_eq!(out.method, SimulationMethod::ExitMultiple);
        // after-tax EBITDA 495,000 times a multiple in [4, 6]
        assert!(out.enterprise_stats.min >= 495_000.0 * 4.0 - 1.0);
        assert!(out.enterprise_stats.max <= 495_000.0 * 6.0 + 1.0);
    }

    #[test]
    fn test_large_earnings_warn() {
        let mut input = sample_stochastic_input();
        input.revenue = 2e9;
        let out = run_simulation(&input).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("precision-sensitive")));
    }

    #[test]
    fn test_invalid_distribution_rejected() {
        let mut input = sample_stochastic_input();
        input.distributions.exit_multiple =
            Some(DistributionSpec::Triangular { min: 6.0, mode: 5.0, max: 4.0 });
        assert!(run_simulation(&input).is_err());
    }
}
