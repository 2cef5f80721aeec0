use practice_valuation_core::config::EngineConfig;
use practice_valuation_core::engine::{run_request, run_valuation, EngineRequest};
use practice_valuation_core::hybrid::blender::ValuationApproach;
use practice_valuation_core::hybrid::policy::WeightingPolicy;
use practice_valuation_core::input::ValuationInput;
use practice_valuation_core::validation::bounds::{validate_inputs, InputBounds};
use practice_valuation_core::PracticeValuationError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const PRACTICE_JSON: &str = r#"{
    "practice_name": "Harbor Skin & Laser",
    "revenue": "4800000",
    "ebitda_margin": "0.24",
    "gross_margin": "0.70",
    "depreciation_amortization": "140000",
    "maintenance_capex": { "type": "PctOfRevenue", "value": "0.03" },
    "tax_rate": "0.26",
    "cash": "400000",
    "debt": "900000",
    "locations": 3,
    "physician_dependent": false,
    "historical_ebitda": ["820000", "900000", "1010000", "1090000", "1152000"],
    "historical_revenue": ["3600000", "3900000", "4250000", "4550000", "4800000"],
    "rates": {
        "risk_free_rate": "0.043",
        "market_risk_premium": "0.055",
        "beta": "1.15",
        "size_premium": "0.03",
        "specific_premium": "0.015",
        "cost_of_debt": "0.075",
        "target_debt_weight": "0.25"
    },
    "synergies": {
        "operational_efficiency": "0.04",
        "scale_economies": "0.02",
        "marketing_optimization": "0.02",
        "moat_score": "0.6"
    },
    "normalization_adjustments": [
        { "label": "One-off legal settlement", "amount": "35000" }
    ]
}"#;

fn practice() -> ValuationInput {
    serde_json::from_str(PRACTICE_JSON).unwrap()
}

fn seeded() -> EngineConfig {
    EngineConfig {
        runs: 500,
        confidence_runs: 500,
        ..EngineConfig::default().with_seed(31)
    }
}

#[test]
fn test_end_to_end_run() {
    let out = run_valuation(&practice(), &seeded()).unwrap();
    let r = out.result;

    assert_eq!(r.recommended_approach, ValuationApproach::Hybrid);
    assert!(r.hybrid.epv.applicable && r.hybrid.dcf.applicable && r.hybrid.multiple.applicable);
    assert!(r.final_enterprise_value > Decimal::ZERO);
    assert_eq!(r.final_equity_value, r.final_enterprise_value + dec!(400000) - dec!(900000));
    assert_eq!(r.hybrid.policy.effective_weights.total(), Decimal::ONE);
    assert_eq!(r.hybrid.sensitivity.len(), 4);
    assert_eq!(r.hybrid.scenarios.len(), 3);
    assert_eq!(r.hybrid.epv_sensitivity.matrix.len(), 3);
    assert!(r.validation.score <= 100);

    let sim = r.simulation.expect("primary simulation runs by default");
    assert_eq!(sim.runs, 500);
    assert_eq!(sim.histogram.len(), 20);
}

#[test]
fn test_bridge_ends_at_adjusted_ebitda() {
    let r = run_valuation(&practice(), &seeded()).unwrap().result;
    let bridge = &r.hybrid.ebitda_bridge;
    assert_eq!(bridge.reported_ebitda, dec!(1152000));
    let last = bridge.steps.last().expect("bridge steps");
    assert_eq!(last.cumulative, bridge.adjusted_ebitda);
    assert_eq!(
        bridge.adjusted_ebitda,
        dec!(1152000) + dec!(35000) + r.hybrid.synergy.run_rate_uplift
    );
}

#[test]
fn test_seeded_runs_are_identical() {
    let a = run_valuation(&practice(), &seeded()).unwrap().result;
    let b = run_valuation(&practice(), &seeded()).unwrap().result;
    assert_eq!(a.final_enterprise_value, b.final_enterprise_value);
    assert_eq!(a.hybrid.confidence_interval.upper, b.hybrid.confidence_interval.upper);
    assert_eq!(
        a.simulation.unwrap().enterprise_stats,
        b.simulation.unwrap().enterprise_stats
    );
}

#[test]
fn test_forced_policy() {
    let cfg = EngineConfig {
        weighting_override: Some(WeightingPolicy::Conservative),
        ..seeded()
    };
    let r = run_valuation(&practice(), &cfg).unwrap().result;
    assert!(r.hybrid.policy.forced);
    assert_eq!(r.hybrid.policy.nominal_weights.epv, dec!(0.50));
}

#[test]
fn test_bounds_violation_blocks() {
    let mut input = practice();
    input.ebitda_margin = dec!(0.95);
    match run_valuation(&input, &seeded()) {
        Err(PracticeValuationError::InputRejected { violations }) => {
            assert!(violations.iter().any(|v| v.contains("ebitda_margin")));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn test_typical_range_is_informational() {
    let mut input = practice();
    input.tax_rate = dec!(0.45);
    let report = validate_inputs(&input, &InputBounds::default()).unwrap().result;
    assert!(!report.is_blocking());
    assert!(run_valuation(&input, &seeded()).is_ok());
}

#[test]
fn test_loss_making_practice_routes_to_asset_based() {
    let mut input = practice();
    input.ebitda_margin = dec!(-0.04);
    input.normalization_adjustments.clear();
    let out = run_valuation(&input, &seeded()).unwrap();
    let r = out.result;
    assert_eq!(r.recommended_approach, ValuationApproach::AssetBased);
    assert!(r.simulation.is_none());
    // asset floor: 4.8M x 0.3
    assert_eq!(r.hybrid.blended_enterprise_value, dec!(1440000));
    assert!(out.warnings.iter().any(|w| w.contains("asset-based")));
}

#[test]
fn test_request_from_json() {
    let json = format!(r#"{{ "input": {PRACTICE_JSON}, "config": {{ "seed": 31, "runs": 500, "confidence_runs": 500 }} }}"#);
    let request: EngineRequest = serde_json::from_str(&json).unwrap();
    let from_request = run_request(&request).unwrap().result;
    let direct = run_valuation(&practice(), &seeded()).unwrap().result;
    assert_eq!(from_request.final_enterprise_value, direct.final_enterprise_value);
}

#[test]
fn test_zero_wacc_falls_back_to_multiple() {
    let mut input = practice();
    input.locations = 4;
    input.rates.risk_free_rate = Decimal::ZERO;
    input.rates.market_risk_premium = Decimal::ZERO;
    input.rates.size_premium = Decimal::ZERO;
    input.rates.specific_premium = Decimal::ZERO;
    input.rates.cost_of_debt = Decimal::ZERO;
    let report = validate_inputs(&input, &InputBounds::default()).unwrap().result;
    assert!(!report.is_blocking());

    let out = run_valuation(&input, &seeded()).unwrap();
    let r = out.result;
    assert_eq!(r.hybrid.wacc.wacc, Decimal::ZERO);
    assert!(!r.hybrid.epv.applicable);
    assert!(!r.hybrid.dcf.applicable);
    assert!(r.hybrid.multiple.applicable);
    assert_eq!(r.hybrid.policy.effective_weights.multiple, Decimal::ONE);
    assert_eq!(r.hybrid.blended_enterprise_value, r.hybrid.multiple.enterprise_value);
    assert!(r.simulation.is_some());
    assert_eq!(r.hybrid.scenarios.len(), 3);
    assert!(out.warnings.iter().any(|w| w.contains("WACC")));
}
