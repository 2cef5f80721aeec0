use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::EngineConfig;
use crate::error::PracticeValuationError;
use crate::input::ValuationInput;
use crate::precision;
use crate::safeguard::size_risk_premium;
use crate::simulation::engine::clamp_runs;
use crate::simulation::sampling::{percentile, sample_triangular, sort_samples};
use crate::types::*;
use crate::valuation::dcf::{build_dcf, DcfInput, DcfOutput};
use crate::valuation::epv::{build_epv, EpvInput, EpvOutput, Reinvestment};
use crate::valuation::multiple::{build_multiple_valuation, MultipleInput, MultipleOutput};
use crate::valuation::sensitivity::{build_epv_sensitivity, EpvSensitivityMatrix};
use crate::valuation::synergy::{
    build_ebitda_bridge, build_synergies, EbitdaBridge, SynergyInput, SynergyOutput,
};
use crate::valuation::trend::{analyze_trend, assess_data_quality, DataQuality, TrendAnalysis};
use crate::valuation::wacc::{build_wacc, WaccInput, WaccOutput};
use crate::PracticeValuationResult;

use super::policy::{
    mark_data_quality, mark_growth, mark_synergy, select_policy, MethodWeights, PolicyMarks,
    WeightingPolicy,
};

/// Revenue below which earnings-based methods give way to asset-based value.
pub const ASSET_BASED_REVENUE: Money = dec!(250000);
const CONFIDENCE_LEVEL: Decimal = dec!(0.90);
/// Triangular half-width for the income methods in the confidence pass.
const INCOME_METHOD_SPREAD: f64 = 0.10;
const MULTIPLE_SPREAD: f64 = 0.05;
/// Lowest WACC any sensitivity or scenario case may use.
const MIN_CASE_WACC: Rate = dec!(0.01);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Recommended valuation route for the practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationApproach {
    /// Weighted blend of EPV, DCF and multiple
    Hybrid,
    /// Earnings cannot support EPV/DCF; value on assets
    AssetBased,
}

impl std::fmt::Display for ValuationApproach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValuationApproach::Hybrid => write!(f, "hybrid"),
            ValuationApproach::AssetBased => write!(f, "asset_based"),
        }
    }
}

/// Assumption set one evaluation of the three methods runs under.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MethodContext {
    pub wacc: Rate,
    /// Normalised EBITDA margin
    pub ebitda_margin: Rate,
    /// Historical growth fed to the DCF and multiple
    pub growth: Rate,
    /// Scale on the synergy stream (0 = none, 1 = as assumed)
    pub synergy_factor: Decimal,
}

/// Weighting preset chosen and the weights actually applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySelection {
    pub policy: WeightingPolicy,
    pub marks: PolicyMarks,
    /// True when the caller forced the preset
    pub forced: bool,
    pub nominal_weights: MethodWeights,
    /// After dropping inapplicable methods
    pub effective_weights: MethodWeights,
}

/// Blended value at the low and high setting of one assumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityRow {
    pub variable: String,
    pub low_input: Decimal,
    pub base_input: Decimal,
    pub high_input: Decimal,
    pub low_value: Money,
    pub base_value: Money,
    pub high_value: Money,
}

/// One named scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioValue {
    pub name: String,
    pub context: MethodContext,
    pub enterprise_value: Money,
    pub equity_value: Money,
}

/// Interval from the secondary Monte-Carlo pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub confidence_level: Decimal,
    pub lower: Money,
    pub upper: Money,
    pub mean: Money,
    pub runs: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Output of the hybrid blender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub practice_name: Option<String>,
    pub recommended_approach: ValuationApproach,
    pub trend: TrendAnalysis,
    pub data_quality: DataQuality,
    pub wacc: WaccOutput,
    pub synergy: SynergyOutput,
    pub ebitda_bridge: EbitdaBridge,
    pub epv: EpvOutput,
    pub dcf: DcfOutput,
    pub multiple: MultipleOutput,
    pub policy: PolicySelection,
    pub blended_enterprise_value: Money,
    pub blended_equity_value: Money,
    /// max(revenue x floor multiple, EBITDA x floor multiple)
    pub asset_floor_value: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_ev_ebitda: Option<Multiple>,
    /// 1 at the benchmark midpoint, falling to 0 a full midpoint away
    pub market_calibration_score: Decimal,
    pub sensitivity: Vec<SensitivityRow>,
    pub scenarios: Vec<ScenarioValue>,
    pub epv_sensitivity: EpvSensitivityMatrix,
    pub confidence_interval: ConfidenceInterval,
}

/// EPV, DCF and multiple results under one context.
#[derive(Debug, Clone)]
struct MethodResults {
    epv: EpvOutput,
    dcf: DcfOutput,
    multiple: MultipleOutput,
}

/// Quantities shared by every context evaluation.
struct Prepared<'a> {
    input: &'a ValuationInput,
    config: &'a EngineConfig,
    synergy: SynergyOutput,
    data_quality: Decimal,
    /// EBITDA less EBIT, held constant across margin changes
    ebit_gap: Money,
    asset_based: bool,
    asset_floor: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Value the practice three ways and blend the results under a weighting policy.
pub fn calculate_hybrid_valuation(
    input: &ValuationInput,
    config: &EngineConfig,
) -> PracticeValuationResult<ComputationOutput<HybridResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_hybrid_input(input, config)?;
    let result = build_hybrid(input, config, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Hybrid blend of EPV, DCF and benchmark multiple with Monte Carlo confidence interval",
        &serde_json::json!({
            "practice_name": input.practice_name,
            "revenue": input.revenue,
            "ebitda_margin": input.ebitda_margin,
            "locations": input.locations,
            "weighting_override": config.weighting_override,
            "projection_years": config.projection_years,
            "confidence_runs": config.confidence_runs,
            "seed": config.seed,
        }),
        warnings,
        elapsed,
        result,
    ))
}

/// Core hybrid computation. Assumes `validate_hybrid_input` has passed.
pub fn build_hybrid(
    input: &ValuationInput,
    config: &EngineConfig,
    warnings: &mut Vec<String>,
) -> PracticeValuationResult<HybridResult> {
    // --- Shared inputs: trend, quality, WACC ---
    let trend = analyze_trend(&input.revenue_series());
    let data_quality = assess_data_quality(&input.historical_ebitda);
    if trend.periods < 2 {
        warnings.push(
            "Fewer than two years of revenue history; growth set to the terminal rate".into(),
        );
    }

    let wacc = build_wacc(&WaccInput {
        rates: input.rates.clone(),
        tax_rate: input.tax_rate,
        locations: input.locations,
        data_quality: data_quality.score,
        size_risk_premium: size_risk_premium(
            &config.safeguard,
            input.revenue,
            input.physician_dependent,
        ),
    });
    if wacc.wacc <= Decimal::ZERO {
        tracing::warn!(wacc = %wacc.wacc, "computed WACC is not positive");
        warnings.push(format!(
            "Computed WACC {} is not positive; EPV and DCF are not applicable",
            wacc.wacc
        ));
    }
    tracing::debug!(wacc = %wacc.wacc, quality = %data_quality.score, "discount rate built");

    // --- Synergies and bridge ---
    let normalized_ebitda = input.normalized_ebitda();
    let synergy = build_synergies(
        &SynergyInput {
            base_ebitda: normalized_ebitda,
            synergies: input.synergies.clone(),
            policy: config.synergy_policy.clone(),
            wacc: wacc.wacc,
            years: config.projection_years,
        },
        warnings,
    );
    let ebitda_bridge = build_ebitda_bridge(input, synergy.run_rate_uplift);

    // --- Routing ---
    let asset_based = input.ebitda() <= Decimal::ZERO || input.revenue < ASSET_BASED_REVENUE;
    let recommended_approach = if asset_based {
        warnings.push(
            "Negative EBITDA or revenue below $250K: EPV and DCF are not applicable; asset-based valuation recommended"
                .into(),
        );
        ValuationApproach::AssetBased
    } else {
        ValuationApproach::Hybrid
    };
    let asset_floor = (input.revenue * config.safeguard.floor_revenue_multiple)
        .max(input.ebitda() * config.safeguard.floor_ebitda_multiple)
        .max(Decimal::ZERO);

    let prepared = Prepared {
        input,
        config,
        synergy,
        data_quality: data_quality.score,
        ebit_gap: input.ebitda() - input.ebit(),
        asset_based,
        asset_floor,
    };

    let base_ctx = MethodContext {
        wacc: wacc.wacc,
        ebitda_margin: safe_div(normalized_ebitda, input.revenue).unwrap_or(input.ebitda_margin),
        growth: if trend.periods >= 2 {
            trend.cagr
        } else {
            config.growth_policy.terminal_growth
        },
        synergy_factor: Decimal::ONE,
    };
    let base = value_methods(&prepared, &base_ctx, warnings);

    // --- Policy ---
    let marks = PolicyMarks {
        data_quality: mark_data_quality(data_quality.score),
        growth: mark_growth(trend.cagr),
        synergy: mark_synergy(input.synergies.raw_total(), config.synergy_policy.total_cap),
    };
    let (policy, forced) = match config.weighting_override {
        Some(p) => (p, true),
        None => (select_policy(&marks), false),
    };
    let nominal_weights = policy.weights();
    let (blended_enterprise_value, effective_weights) =
        blend(&prepared, &base, &nominal_weights);
    if effective_weights.total().is_zero() {
        warnings.push(format!(
            "No earnings-based method is applicable; blended value set to the asset floor {}",
            asset_floor.round_dp(0)
        ));
    }
    tracing::debug!(%policy, forced, blended = %blended_enterprise_value, "methods blended");

    // --- Calibration ---
    let tier = config.benchmarks.size_tier(input.revenue);
    let benchmark_mid = config.benchmarks.ev_ebitda.for_tier(tier).midpoint();
    let implied_ev_ebitda = if ebitda_bridge.adjusted_ebitda > Decimal::ZERO {
        safe_div(blended_enterprise_value, ebitda_bridge.adjusted_ebitda)
    } else {
        None
    };
    let market_calibration_score = implied_ev_ebitda
        .and_then(|m| safe_div((m - benchmark_mid).abs(), benchmark_mid))
        .map(|dev| clamp_dec(Decimal::ONE - dev, Decimal::ZERO, Decimal::ONE))
        .unwrap_or(Decimal::ZERO);
    if market_calibration_score < dec!(0.5) && !asset_based {
        warnings.push(format!(
            "Blend drifts from comparable transactions (calibration score {})",
            market_calibration_score.round_dp(2)
        ));
    }

    // --- Sensitivity, scenarios, EPV grid ---
    let sensitivity = sensitivity_rows(&prepared, &base_ctx, &nominal_weights, blended_enterprise_value);
    let scenarios = scenario_values(&prepared, &base_ctx, &nominal_weights, blended_enterprise_value);
    let mut grid_warnings = Vec::new();
    let epv_sensitivity = build_epv_sensitivity(&epv_input(&prepared, &base_ctx), &mut grid_warnings);

    // --- Confidence interval ---
    let mut ci_warnings = Vec::new();
    let confidence_runs = clamp_runs(config.confidence_runs, &mut ci_warnings);
    warnings.extend(ci_warnings);
    let confidence_interval = confidence_interval(
        &base,
        &effective_weights,
        blended_enterprise_value,
        confidence_runs,
        config.confidence_seed(),
    );

    Ok(HybridResult {
        practice_name: input.practice_name.clone(),
        recommended_approach,
        trend,
        data_quality,
        wacc,
        synergy: prepared.synergy,
        ebitda_bridge,
        epv: base.epv,
        dcf: base.dcf,
        multiple: base.multiple,
        policy: PolicySelection {
            policy,
            marks,
            forced,
            nominal_weights,
            effective_weights,
        },
        blended_enterprise_value,
        blended_equity_value: blended_enterprise_value + input.net_cash(),
        asset_floor_value: asset_floor,
        implied_ev_ebitda,
        market_calibration_score,
        sensitivity,
        scenarios,
        epv_sensitivity,
        confidence_interval,
    })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_hybrid_input(input: &ValuationInput, config: &EngineConfig) -> PracticeValuationResult<()> {
    if input.revenue <= Decimal::ZERO {
        return Err(PracticeValuationError::InvalidInput {
            field: "revenue".into(),
            reason: "Revenue must be positive".into(),
        });
    }
    if input.tax_rate < Decimal::ZERO || input.tax_rate >= Decimal::ONE {
        return Err(PracticeValuationError::InvalidInput {
            field: "tax_rate".into(),
            reason: "Tax rate must be in [0, 1)".into(),
        });
    }
    if input.locations == 0 {
        return Err(PracticeValuationError::InvalidInput {
            field: "locations".into(),
            reason: "At least one location is required".into(),
        });
    }
    if !(1..=15).contains(&config.projection_years) {
        return Err(PracticeValuationError::InvalidInput {
            field: "projection_years".into(),
            reason: "Projection horizon must be between 1 and 15 years".into(),
        });
    }
    if config.growth_policy.exit_multiple <= Decimal::ZERO {
        return Err(PracticeValuationError::InvalidInput {
            field: "growth_policy.exit_multiple".into(),
            reason: "Exit multiple must be positive".into(),
        });
    }
    Ok(())
}

fn epv_input(p: &Prepared<'_>, ctx: &MethodContext) -> EpvInput {
    let input = p.input;
    let ebit = input.revenue * ctx.ebitda_margin - p.ebit_gap;
    EpvInput {
        ebit,
        tax_rate: input.tax_rate,
        reinvestment: p
            .config
            .reinvestment
            .unwrap_or(Reinvestment::Fixed(input.maintenance_capex_amount())),
        wacc: ctx.wacc,
        depreciation_amortization: input.depreciation_amortization,
        maintenance_capex: input.maintenance_capex_amount(),
        cash: input.cash,
        debt: input.debt,
    }
}

fn value_methods(p: &Prepared<'_>, ctx: &MethodContext, warnings: &mut Vec<String>) -> MethodResults {
    let input = p.input;
    let config = p.config;

    let epv = build_epv(&epv_input(p, ctx), warnings);

    let dcf = build_dcf(
        &DcfInput {
            base_revenue: input.revenue,
            historical_revenue: input.historical_revenue.clone(),
            historical_growth_override: Some(ctx.growth),
            ebitda_margin: ctx.ebitda_margin,
            da_pct_revenue: safe_div(input.depreciation_amortization, input.revenue)
                .unwrap_or(Decimal::ZERO),
            maintenance_capex: input.maintenance_capex,
            nwc_pct_incremental_revenue: config.nwc_pct_incremental_revenue,
            tax_rate: input.tax_rate,
            wacc: ctx.wacc,
            projection_years: config.projection_years,
            growth_policy: config.growth_policy.clone(),
            ebitda_uplift: p
                .synergy
                .phased
                .iter()
                .map(|y| y.uplift * ctx.synergy_factor)
                .collect(),
            mid_year_convention: config.mid_year_convention,
            cash: input.cash,
            debt: input.debt,
        },
        warnings,
    );

    let multiple = build_multiple_valuation(
        &MultipleInput {
            revenue: input.revenue,
            adjusted_ebitda: input.revenue * ctx.ebitda_margin
                + p.synergy.run_rate_uplift * ctx.synergy_factor,
            data_quality: p.data_quality,
            growth_rate: ctx.growth,
            locations: input.locations,
            benchmarks: config.benchmarks.clone(),
            cash: input.cash,
            debt: input.debt,
        },
        warnings,
    );

    MethodResults { epv, dcf, multiple }
}

/// Weighted value over applicable methods; the asset floor when none apply.
fn blend(p: &Prepared<'_>, r: &MethodResults, weights: &MethodWeights) -> (Money, MethodWeights) {
    let effective = weights.renormalized(
        r.epv.applicable && !p.asset_based,
        r.dcf.applicable && !p.asset_based,
        r.multiple.applicable,
    );
    if effective.total().is_zero() {
        return (p.asset_floor, effective);
    }
    let value = effective.epv * r.epv.enterprise_value
        + effective.dcf * r.dcf.enterprise_value
        + effective.multiple * r.multiple.enterprise_value;
    (value, effective)
}

fn blended_at(p: &Prepared<'_>, ctx: &MethodContext, weights: &MethodWeights) -> Money {
    let mut scratch = Vec::new();
    let results = value_methods(p, ctx, &mut scratch);
    blend(p, &results, weights).0
}

fn sensitivity_rows(
    p: &Prepared<'_>,
    base: &MethodContext,
    weights: &MethodWeights,
    base_value: Money,
) -> Vec<SensitivityRow> {
    let step = dec!(0.01);
    let two_pts = dec!(0.02);
    let cases: [(&str, Decimal, MethodContext, MethodContext, Decimal, Decimal); 4] = [
        (
            "wacc",
            base.wacc,
            MethodContext { wacc: (base.wacc - step).max(MIN_CASE_WACC), ..*base },
            MethodContext { wacc: base.wacc + step, ..*base },
            (base.wacc - step).max(MIN_CASE_WACC),
            base.wacc + step,
        ),
        (
            "growth",
            base.growth,
            MethodContext { growth: base.growth - two_pts, ..*base },
            MethodContext { growth: base.growth + two_pts, ..*base },
            base.growth - two_pts,
            base.growth + two_pts,
        ),
        (
            "ebitda_margin",
            base.ebitda_margin,
            MethodContext { ebitda_margin: base.ebitda_margin - two_pts, ..*base },
            MethodContext { ebitda_margin: base.ebitda_margin + two_pts, ..*base },
            base.ebitda_margin - two_pts,
            base.ebitda_margin + two_pts,
        ),
        (
            "synergy",
            base.synergy_factor,
            MethodContext { synergy_factor: Decimal::ZERO, ..*base },
            MethodContext { synergy_factor: dec!(1.5), ..*base },
            Decimal::ZERO,
            dec!(1.5),
        ),
    ];

    cases
        .into_iter()
        .map(|(name, base_input, low, high, low_input, high_input)| SensitivityRow {
            variable: name.to_string(),
            low_input,
            base_input,
            high_input,
            low_value: blended_at(p, &low, weights),
            base_value,
            high_value: blended_at(p, &high, weights),
        })
        .collect()
}

fn scenario_values(
    p: &Prepared<'_>,
    base: &MethodContext,
    weights: &MethodWeights,
    base_value: Money,
) -> Vec<ScenarioValue> {
    let bear = MethodContext {
        wacc: base.wacc + dec!(0.02),
        ebitda_margin: base.ebitda_margin * dec!(0.85),
        growth: base.growth * dec!(0.5),
        synergy_factor: Decimal::ZERO,
    };
    let bull = MethodContext {
        wacc: (base.wacc - dec!(0.01)).max(MIN_CASE_WACC),
        ebitda_margin: base.ebitda_margin * dec!(1.10),
        growth: base.growth * dec!(1.25),
        synergy_factor: Decimal::ONE,
    };
    let net_cash = p.input.net_cash();

    [
        ("bear", bear, blended_at(p, &bear, weights)),
        ("base", *base, base_value),
        ("bull", bull, blended_at(p, &bull, weights)),
    ]
    .into_iter()
    .map(|(name, context, ev)| ScenarioValue {
        name: name.to_string(),
        context,
        enterprise_value: ev,
        equity_value: ev + net_cash,
    })
    .collect()
}

/// Perturb each method value with a narrow triangular band and blend again.
fn confidence_interval(
    r: &MethodResults,
    weights: &MethodWeights,
    blended: Money,
    runs: u32,
    seed: Option<u64>,
) -> ConfidenceInterval {
    if weights.total().is_zero() {
        return ConfidenceInterval {
            confidence_level: CONFIDENCE_LEVEL,
            lower: blended,
            upper: blended,
            mean: blended,
            runs: 0,
            seed,
        };
    }

    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let terms = [
        (to_f64(weights.epv), to_f64(r.epv.enterprise_value), INCOME_METHOD_SPREAD),
        (to_f64(weights.dcf), to_f64(r.dcf.enterprise_value), INCOME_METHOD_SPREAD),
        (to_f64(weights.multiple), to_f64(r.multiple.enterprise_value), MULTIPLE_SPREAD),
    ];

    let mut samples: Vec<f64> = (0..runs)
        .map(|_| {
            let parts: Vec<f64> = terms
                .iter()
                .map(|(w, v, spread)| {
                    let shock = sample_triangular(&mut rng, 1.0 - spread, 1.0, 1.0 + spread);
                    precision::multiply(*w, precision::multiply(*v, shock))
                })
                .collect();
            precision::sum(&parts)
        })
        .collect();
    sort_samples(&mut samples);

    let mean = precision::sum(&samples) / samples.len().max(1) as f64;
    ConfidenceInterval {
        confidence_level: CONFIDENCE_LEVEL,
        lower: from_f64(precision::round(percentile(&samples, 0.05), 2)),
        upper: from_f64(precision::round(percentile(&samples, 0.95), 2)),
        mean: from_f64(precision::round(mean, 2)),
        runs,
        seed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
