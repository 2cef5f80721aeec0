use practice_valuation_core::input::MaintenanceCapex;
use practice_valuation_core::valuation::dcf::{self, DcfInput, GrowthPolicy, TerminalMethod};
use practice_valuation_core::valuation::epv::{self, EpvInput, Reinvestment};
use practice_valuation_core::valuation::synergy::{self, SynergyInput, SynergyPolicy};
use practice_valuation_core::input::SynergyAssumptions;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// EPV tests
// ===========================================================================

fn epv_input(wacc: Decimal) -> EpvInput {
    EpvInput {
        ebit: dec!(1000000),
        tax_rate: dec!(0.25),
        reinvestment: Reinvestment::Fixed(dec!(100000)),
        wacc,
        depreciation_amortization: Decimal::ZERO,
        maintenance_capex: Decimal::ZERO,
        cash: Decimal::ZERO,
        debt: Decimal::ZERO,
    }
}

#[test]
fn test_epv_reference_case() {
    // (1,000,000 x 0.75 - 100,000) / 0.12 = 5,416,666.67
    let out = epv::calculate_epv(&epv_input(dec!(0.12))).unwrap().result;
    assert!(out.applicable);
    assert!(
        (out.enterprise_value - dec!(5416666.67)).abs() < dec!(0.01),
        "EPV should be ~5,416,666.67, got {}",
        out.enterprise_value
    );
}

#[test]
fn test_epv_strictly_decreasing_in_wacc() {
    let waccs = [dec!(0.08), dec!(0.10), dec!(0.12), dec!(0.15), dec!(0.20)];
    let values: Vec<Decimal> = waccs
        .iter()
        .map(|w| epv::calculate_epv(&epv_input(*w)).unwrap().result.enterprise_value)
        .collect();
    for pair in values.windows(2) {
        assert!(pair[0] > pair[1], "EPV must fall as WACC rises: {values:?}");
    }
}

#[test]
fn test_epv_negative_wacc_is_not_applicable() {
    let out = epv::calculate_epv(&epv_input(dec!(-0.02))).unwrap();
    assert!(!out.result.applicable);
    assert_eq!(out.result.enterprise_value, Decimal::ZERO);
    assert!(!out.warnings.is_empty());
}

// ===========================================================================
// DCF tests
// ===========================================================================

fn dcf_input(wacc: Decimal) -> DcfInput {
    DcfInput {
        base_revenue: dec!(2500000),
        historical_revenue: vec![dec!(1900000), dec!(2100000), dec!(2300000), dec!(2500000)],
        historical_growth_override: None,
        ebitda_margin: dec!(0.20),
        da_pct_revenue: dec!(0.03),
        maintenance_capex: MaintenanceCapex::PctOfRevenue(dec!(0.03)),
        nwc_pct_incremental_revenue: dec!(0.05),
        tax_rate: dec!(0.25),
        wacc,
        projection_years: 5,
        growth_policy: GrowthPolicy::default(),
        ebitda_uplift: Vec::new(),
        mid_year_convention: false,
        cash: dec!(100000),
        debt: dec!(300000),
    }
}

#[test]
fn test_terminal_value_is_minimum_of_both_methods() {
    for wacc in [dec!(0.06), dec!(0.09), dec!(0.12), dec!(0.16), dec!(0.22)] {
        let out = dcf::calculate_dcf(&dcf_input(wacc)).unwrap().result;
        let t = &out.terminal;
        match t.perpetuity_value {
            Some(p) => {
                assert_eq!(t.terminal_value_used, p.min(t.exit_multiple_value));
                let expected = if p <= t.exit_multiple_value {
                    TerminalMethod::PerpetuityGrowth
                } else {
                    TerminalMethod::ExitMultiple
                };
                assert_eq!(t.method_used, expected);
            }
            None => assert_eq!(t.terminal_value_used, t.exit_multiple_value),
        }
    }
}

#[test]
fn test_growth_path_decays_to_terminal() {
    let out = dcf::calculate_dcf(&dcf_input(dec!(0.12))).unwrap().result;
    assert_eq!(out.growth_path.len(), 5);
    for pair in out.growth_path.windows(2) {
        assert!(pair[0] >= pair[1], "growth should decay: {:?}", out.growth_path);
    }
    assert!(out.growth_path[4] >= dec!(0.025));
    // the capped, haircut starting growth is below the raw trend CAGR
    assert!(out.starting_growth < out.trend.cagr);
}

#[test]
fn test_dcf_equity_bridge() {
    let out = dcf::calculate_dcf(&dcf_input(dec!(0.12))).unwrap().result;
    assert_eq!(out.equity_value, out.enterprise_value + dec!(100000) - dec!(300000));
    assert_eq!(
        out.enterprise_value,
        out.pv_of_fcf + out.terminal.pv_terminal
    );
}

#[test]
fn test_dcf_rejects_zero_wacc() {
    assert!(dcf::calculate_dcf(&dcf_input(Decimal::ZERO)).is_err());
}

// ===========================================================================
// Synergy tests
// ===========================================================================

#[test]
fn test_synergy_cap_and_moat_premium() {
    let input = SynergyInput {
        base_ebitda: dec!(500000),
        synergies: SynergyAssumptions {
            operational_efficiency: dec!(0.08),
            scale_economies: dec!(0.05),
            marketing_optimization: dec!(0.04),
            technology: Decimal::ZERO,
            cross_selling: Decimal::ZERO,
            moat_score: Decimal::ONE,
        },
        policy: SynergyPolicy::default(),
        wacc: dec!(0.14),
        years: 5,
    };
    let out = synergy::calculate_synergies(&input).unwrap().result;
    // 17% raw, capped to 15%, plus the full 3% moat premium
    assert!(out.cap_applied);
    assert_eq!(out.total_pct, dec!(0.18));
    assert_eq!(out.run_rate_uplift, dec!(90000));
    assert_eq!(out.phased[0].uplift, dec!(27000));
    assert_eq!(out.phased[2].uplift, dec!(90000));
}
