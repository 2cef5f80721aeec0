use practice_valuation_core::safeguard::{self, PracticeSize, SafeguardInput, SafeguardPolicy};
use practice_valuation_core::validation::checks;
use practice_valuation_core::validation::report::{Severity, ValidationReport, ValidationStatus};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Safeguard tests
// ===========================================================================

#[test]
fn test_small_practice_revenue_cap() {
    // $800K single-location, physician-dependent practice valued at 2.5x revenue
    let input = SafeguardInput {
        revenue: dec!(800000),
        ebitda: dec!(300000),
        enterprise_value: dec!(2000000),
        locations: 1,
        physician_dependent: true,
        policy: SafeguardPolicy::default(),
    };
    let out = safeguard::apply_safeguard(&input).unwrap().result;
    assert_eq!(out.practice_size, PracticeSize::Small);
    assert!(out.capped_value <= dec!(1200000));
    // 15% base, 2.5% key person, 5% single location
    let labels: Vec<&str> = out.discounts.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels.len(), 3);
    let expected = dec!(1200000) * dec!(0.85) * dec!(0.975) * dec!(0.95);
    assert!((out.adjusted_value - expected).abs() < dec!(0.01));
}

#[test]
fn test_asset_floor_never_breached() {
    // floor = max(400,000 x 0.3, 60,000 x 2.5) = 150,000
    for ev in [dec!(0), dec!(50000), dec!(160000), dec!(400000), dec!(900000), dec!(5000000)] {
        for (locations, physician) in [(1, true), (1, false), (3, true)] {
            let input = SafeguardInput {
                revenue: dec!(400000),
                ebitda: dec!(60000),
                enterprise_value: ev,
                locations,
                physician_dependent: physician,
                policy: SafeguardPolicy::default(),
            };
            let out = safeguard::compute_adjustment(&input);
            assert_eq!(out.floor_value, dec!(150000));
            assert!(
                out.adjusted_value >= dec!(150000),
                "EV {ev} adjusted to {} below floor",
                out.adjusted_value
            );
        }
    }
}

#[test]
fn test_size_premium_stacks_physician_add_on() {
    let policy = SafeguardPolicy::default();
    assert_eq!(safeguard::size_risk_premium(&policy, dec!(400000), true), dec!(0.04));
    assert_eq!(safeguard::size_risk_premium(&policy, dec!(750000), false), dec!(0.015));
    assert_eq!(safeguard::size_risk_premium(&policy, dec!(3000000), false), Decimal::ZERO);
}

// ===========================================================================
// Cross-validation tests
// ===========================================================================

#[test]
fn test_epv_method_variance_critical() {
    let check = checks::check_epv_consistency(dec!(5000000), dec!(6500000));
    assert_eq!(check.severity, Severity::Critical);
    assert!(!check.is_valid);
    let v = check.variance.expect("variance payload");
    assert_eq!(v.variance, dec!(0.3));
}

#[test]
fn test_method_comparison_tight_spread() {
    let check = checks::check_method_comparison(
        Some(dec!(4000000)),
        Some(dec!(4300000)),
        Some(dec!(4100000)),
    );
    assert_eq!(check.severity, Severity::Low);
    assert!(check.is_valid);
}

#[test]
fn test_method_comparison_wide_spread() {
    let check = checks::check_method_comparison(
        Some(dec!(2000000)),
        Some(dec!(3500000)),
        None,
    );
    assert_eq!(check.severity, Severity::Critical);
}

#[test]
fn test_report_scoring() {
    let report = ValidationReport::from_checks(vec![
        checks::check_epv_consistency(dec!(5000000), dec!(6500000)),
        checks::check_method_comparison(Some(dec!(4000000)), Some(dec!(4300000)), None),
    ]);
    assert_eq!(report.critical_count, 1);
    assert_eq!(report.score, 70);
    assert_eq!(report.status, ValidationStatus::Fail);

    let clean = ValidationReport::from_checks(vec![checks::check_method_comparison(
        Some(dec!(4000000)),
        Some(dec!(4300000)),
        Some(dec!(4100000)),
    )]);
    assert_eq!(clean.score, 100);
    assert_eq!(clean.status, ValidationStatus::Pass);
}

#[test]
fn test_small_practice_below_asset_threshold() {
    let check = checks::check_small_practice(dec!(200000), dec!(20000), dec!(150000));
    assert_eq!(check.severity, Severity::Critical);
    let check = checks::check_small_practice(dec!(450000), dec!(70000), dec!(300000));
    assert_eq!(check.severity, Severity::High);
}
