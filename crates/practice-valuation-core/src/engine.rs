//! End-to-end valuation run.
//!
//! Bounds validation, then the hybrid blend (synergies, EPV, DCF, multiple),
//! cross-validation, the practice-size safeguard and finally the optional
//! primary Monte-Carlo pass. Only a bounds violation stops the run; every
//! later stage reports through warnings and typed result fields.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::EngineConfig;
use crate::hybrid::blender::{calculate_hybrid_valuation, HybridResult, ValuationApproach};
use crate::input::ValuationInput;
use crate::safeguard::{compute_adjustment, SafeguardAdjustment, SafeguardInput};
use crate::simulation::engine::{run_simulation, SimulationResult, StochasticInput};
use crate::types::*;
use crate::validation::bounds::check_bounds;
use crate::validation::checks::{run_checks, CrossValidationInput};
use crate::validation::report::{Severity, ValidationReport};
use crate::PracticeValuationResult;

/// Input record plus configuration, as accepted over JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRequest {
    pub input: ValuationInput,
    #[serde(default)]
    pub config: EngineConfig,
}

/// Everything one engine run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResult {
    pub hybrid: HybridResult,
    pub validation: ValidationReport,
    pub safeguard: SafeguardAdjustment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationResult>,
    /// Blended value after the safeguard
    pub final_enterprise_value: Money,
    pub final_equity_value: Money,
    pub recommended_approach: ValuationApproach,
}

pub fn run_request(request: &EngineRequest) -> PracticeValuationResult<ComputationOutput<EngineResult>> {
    run_valuation(&request.input, &request.config)
}

/// Run the full pipeline on one practice.
pub fn run_valuation(
    input: &ValuationInput,
    config: &EngineConfig,
) -> PracticeValuationResult<ComputationOutput<EngineResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    tracing::info!(
        practice = input.practice_name.as_deref().unwrap_or("unnamed"),
        revenue = %input.revenue,
        "valuation started"
    );

    // --- Input bounds (blocking) ---
    let bounds = check_bounds(input, &config.bounds);
    if bounds.is_blocking() {
        tracing::warn!(
            violations = bounds.violations.len(),
            "input rejected by bounds table"
        );
    }
    let bound_checks = bounds.into_result()?;

    // --- Hybrid blend ---
    let hybrid_out = calculate_hybrid_valuation(input, config)?;
    warnings.extend(hybrid_out.warnings);
    let hybrid = hybrid_out.result;

    // --- Cross-validation ---
    let asset_based = hybrid.recommended_approach == ValuationApproach::AssetBased;
    let method_value = |applicable: bool, value: Money| (applicable && !asset_based).then_some(value);
    let cross_input = CrossValidationInput {
        revenue: input.revenue,
        ebitda: input.normalized_ebitda(),
        ebitda_margin: input.ebitda_margin,
        gross_margin: input.gross_margin,
        locations: input.locations,
        physician_dependent: input.physician_dependent,
        synergy_pct: hybrid.synergy.raw_total_pct,
        owner_earnings_epv: method_value(hybrid.epv.applicable, hybrid.epv.owner_earnings_epv),
        nopat_epv: method_value(hybrid.epv.applicable, hybrid.epv.nopat_epv),
        epv_value: method_value(hybrid.epv.applicable, hybrid.epv.enterprise_value),
        dcf_value: method_value(hybrid.dcf.applicable, hybrid.dcf.enterprise_value),
        multiple_value: hybrid
            .multiple
            .applicable
            .then_some(hybrid.multiple.enterprise_value),
        enterprise_value: hybrid.blended_enterprise_value,
        benchmarks: config.benchmarks.clone(),
    };
    let mut checks = run_checks(&cross_input);
    checks.extend(bound_checks);
    let validation = ValidationReport::from_checks(checks);
    warnings.extend(
        validation
            .findings(Severity::High)
            .map(|c| format!("[{}] {}", c.severity, c.message)),
    );
    tracing::debug!(score = validation.score, status = %validation.status, "cross-validation done");

    // --- Safeguard ---
    let safeguard = compute_adjustment(&SafeguardInput {
        revenue: input.revenue,
        ebitda: input.normalized_ebitda(),
        enterprise_value: hybrid.blended_enterprise_value,
        locations: input.locations,
        physician_dependent: input.physician_dependent,
        policy: config.safeguard.clone(),
    });
    if safeguard.floor_applied {
        warnings.push(format!(
            "Safeguard floor {} replaced the discounted value {}",
            safeguard.floor_value.round_dp(0),
            safeguard.discounted_value.round_dp(0)
        ));
    }
    tracing::debug!(
        applies = safeguard.applies,
        adjusted = %safeguard.adjusted_value,
        "safeguard applied"
    );

    // --- Primary Monte Carlo ---
    let simulation = if !config.run_primary_simulation {
        None
    } else if asset_based {
        warnings.push("Primary simulation skipped for an asset-based valuation".into());
        None
    } else {
        let sim = run_simulation(&stochastic_input(input, config, &hybrid))?;
        warnings.extend(sim.warnings);
        Some(sim.result)
    };

    let final_enterprise_value = safeguard.adjusted_value;
    let result = EngineResult {
        final_equity_value: final_enterprise_value + input.net_cash(),
        final_enterprise_value,
        recommended_approach: hybrid.recommended_approach,
        hybrid,
        validation,
        safeguard,
        simulation,
    };
    tracing::info!(
        enterprise_value = %result.final_enterprise_value,
        approach = %result.recommended_approach,
        "valuation finished"
    );

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Bounds check, hybrid EPV/DCF/multiple blend, cross-validation, size safeguard and Monte Carlo",
        &serde_json::json!({
            "practice_name": input.practice_name,
            "runs": config.runs,
            "seed": config.seed,
            "weighting_override": config.weighting_override,
            "run_primary_simulation": config.run_primary_simulation,
        }),
        warnings,
        elapsed,
        result,
    ))
}

/// Stochastic input centred on the hybrid run's WACC and normalised margin.
fn stochastic_input(input: &ValuationInput, config: &EngineConfig, hybrid: &HybridResult) -> StochasticInput {
    let margin = safe_div(input.normalized_ebitda(), input.revenue).unwrap_or(input.ebitda_margin);
    StochasticInput {
        revenue: to_f64(input.revenue),
        ebitda_margin: to_f64(margin),
        depreciation_amortization: to_f64(input.depreciation_amortization),
        maintenance_capex: input.maintenance_capex,
        tax_rate: to_f64(input.tax_rate),
        wacc: to_f64(hybrid.wacc.wacc),
        cash: to_f64(input.cash),
        debt: to_f64(input.debt),
        runs: config.runs,
        seed: config.seed,
        distributions: config.distributions.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PracticeValuationError;
    use crate::input::tests::sample_input;
    use rust_decimal_macros::dec;

    #[test]
    fn test_full_run_is_reproducible() {
        let cfg = EngineConfig::default().with_seed(7);
        let a = run_valuation(&sample_input(), &cfg).unwrap().result;
        let b = run_valuation(&sample_input(), &cfg).unwrap().result;
        assert_eq!(a.final_enterprise_value, b.final_enterprise_value);
        let (sa, sb) = (a.simulation.unwrap(), b.simulation.unwrap());
        assert_eq!(sa.enterprise_values, sb.enterprise_values);
        assert_eq!(a.hybrid.confidence_interval.lower, b.hybrid.confidence_interval.lower);
    }

    #[test]
    fn test_standard_practice_keeps_blend() {
        let cfg = EngineConfig::default().with_seed(1);
        let out = run_valuation(&sample_input(), &cfg).unwrap().result;
        // $3.2M revenue is above the safeguard threshold
        assert!(!out.safeguard.applies);
        assert_eq!(out.final_enterprise_value, out.hybrid.blended_enterprise_value);
        assert_eq!(
            out.final_equity_value,
            out.final_enterprise_value + dec!(250000) - dec!(600000)
        );
        assert_eq!(out.recommended_approach, ValuationApproach::Hybrid);
    }

    #[test]
    fn test_out_of_bounds_input_blocks_run() {
        let mut input = sample_input();
        input.tax_rate = dec!(0.9);
        let err = run_valuation(&input, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, PracticeValuationError::InputRejected { .. }));
    }

    #[test]
    fn test_simulation_can_be_disabled() {
        let cfg = EngineConfig {
            run_primary_simulation: false,
            ..EngineConfig::default().with_seed(3)
        };
        let out = run_valuation(&sample_input(), &cfg).unwrap().result;
        assert!(out.simulation.is_none());
    }

    #[test]
    fn test_request_json_with_defaulted_config() {
        let json = serde_json::json!({ "input": sample_input() }).to_string();
        let request: EngineRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(request.config.runs, 1000);
        assert_eq!(request.input.locations, 2);
    }
}
