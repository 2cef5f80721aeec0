use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::PracticeValuationError;
use crate::input::{MaintenanceCapex, ValuationInput};
use crate::types::{with_metadata, Band, ComputationOutput};
use crate::PracticeValuationResult;

use super::report::{CheckKind, Severity, ValidationCheck};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Hard range plus the range seen in typical practices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FieldBounds {
    pub min: Decimal,
    pub max: Decimal,
    pub typical: Band,
}

impl FieldBounds {
    pub const fn new(min: Decimal, max: Decimal, typical_low: Decimal, typical_high: Decimal) -> Self {
        FieldBounds {
            min,
            max,
            typical: Band::new(typical_low, typical_high),
        }
    }
}

/// Static range table for every bounded input field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputBounds {
    pub revenue: FieldBounds,
    pub ebitda_margin: FieldBounds,
    pub ebit_margin: FieldBounds,
    pub gross_margin: FieldBounds,
    pub tax_rate: FieldBounds,
    pub capex_pct_revenue: FieldBounds,
    pub locations: FieldBounds,
    pub risk_free_rate: FieldBounds,
    pub market_risk_premium: FieldBounds,
    pub beta: FieldBounds,
    pub size_premium: FieldBounds,
    pub specific_premium: FieldBounds,
    pub cost_of_debt: FieldBounds,
    pub target_debt_weight: FieldBounds,
    pub synergy_total: FieldBounds,
    pub moat_score: FieldBounds,
}

impl Default for InputBounds {
    fn default() -> Self {
        InputBounds {
            revenue: FieldBounds::new(dec!(1), dec!(10000000000), dec!(250000), dec!(50000000)),
            ebitda_margin: FieldBounds::new(dec!(-0.5), dec!(0.7), dec!(0.08), dec!(0.40)),
            ebit_margin: FieldBounds::new(dec!(-0.6), dec!(0.7), dec!(0.05), dec!(0.35)),
            gross_margin: FieldBounds::new(dec!(0), dec!(1), dec!(0.40), dec!(0.85)),
            tax_rate: FieldBounds::new(dec!(0), dec!(0.6), dec!(0.15), dec!(0.35)),
            capex_pct_revenue: FieldBounds::new(dec!(0), dec!(0.3), dec!(0.01), dec!(0.08)),
            locations: FieldBounds::new(dec!(1), dec!(500), dec!(1), dec!(50)),
            risk_free_rate: FieldBounds::new(dec!(0), dec!(0.15), dec!(0.02), dec!(0.06)),
            market_risk_premium: FieldBounds::new(dec!(0), dec!(0.15), dec!(0.04), dec!(0.08)),
            beta: FieldBounds::new(dec!(0.1), dec!(4.0), dec!(0.7), dec!(2.0)),
            size_premium: FieldBounds::new(dec!(0), dec!(0.10), dec!(0), dec!(0.06)),
            specific_premium: FieldBounds::new(dec!(0), dec!(0.15), dec!(0), dec!(0.06)),
            cost_of_debt: FieldBounds::new(dec!(0), dec!(0.25), dec!(0.04), dec!(0.12)),
            target_debt_weight: FieldBounds::new(dec!(0), dec!(0.9), dec!(0), dec!(0.5)),
            synergy_total: FieldBounds::new(dec!(0), dec!(0.5), dec!(0), dec!(0.15)),
            moat_score: FieldBounds::new(dec!(0), dec!(1), dec!(0), dec!(1)),
        }
    }
}

/// A blocking out-of-range or implausible field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundViolation {
    pub field: String,
    pub value: Decimal,
    pub message: String,
}

impl std::fmt::Display for BoundViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}: {}", self.field, self.value, self.message)
    }
}

/// Result of checking a record against the bounds table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundsReport {
    /// Errors; any entry blocks valuation
    pub violations: Vec<BoundViolation>,
    /// Informational findings for values outside the typical sub-range
    pub checks: Vec<ValidationCheck>,
}

impl BoundsReport {
    pub fn is_blocking(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Turn blocking violations into an error for the caller.
    pub fn into_result(self) -> PracticeValuationResult<Vec<ValidationCheck>> {
        if self.violations.is_empty() {
            Ok(self.checks)
        } else {
            Err(PracticeValuationError::InputRejected {
                violations: self.violations.iter().map(ToString::to_string).collect(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Check a record against the bounds table. Violations are reported, not raised.
pub fn validate_inputs(
    input: &ValuationInput,
    bounds: &InputBounds,
) -> PracticeValuationResult<ComputationOutput<BoundsReport>> {
    let start = Instant::now();
    let report = check_bounds(input, bounds);

    let warnings = report.violations.iter().map(ToString::to_string).collect();
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Static range table with typical ranges and cross-field plausibility",
        input,
        warnings,
        elapsed,
        report,
    ))
}

/// Core bounds check.
pub fn check_bounds(input: &ValuationInput, bounds: &InputBounds) -> BoundsReport {
    let mut checker = Checker::default();
    let rates = &input.rates;

    checker.field("revenue", input.revenue, &bounds.revenue);
    checker.field("ebitda_margin", input.ebitda_margin, &bounds.ebitda_margin);
    if let Some(m) = input.ebit_margin {
        checker.field("ebit_margin", m, &bounds.ebit_margin);
    }
    if let Some(m) = input.gross_margin {
        checker.field("gross_margin", m, &bounds.gross_margin);
    }
    checker.field("tax_rate", input.tax_rate, &bounds.tax_rate);
    if let MaintenanceCapex::PctOfRevenue(pct) = input.maintenance_capex {
        checker.field("maintenance_capex", pct, &bounds.capex_pct_revenue);
    }
    checker.field("locations", Decimal::from(input.locations), &bounds.locations);
    checker.field("rates.risk_free_rate", rates.risk_free_rate, &bounds.risk_free_rate);
    checker.field(
        "rates.market_risk_premium",
        rates.market_risk_premium,
        &bounds.market_risk_premium,
    );
    checker.field("rates.beta", rates.beta, &bounds.beta);
    checker.field("rates.size_premium", rates.size_premium, &bounds.size_premium);
    checker.field("rates.specific_premium", rates.specific_premium, &bounds.specific_premium);
    checker.field("rates.cost_of_debt", rates.cost_of_debt, &bounds.cost_of_debt);
    checker.field(
        "rates.target_debt_weight",
        rates.target_debt_weight,
        &bounds.target_debt_weight,
    );
    checker.field("synergies.total", input.synergies.raw_total(), &bounds.synergy_total);
    checker.field("synergies.moat_score", input.synergies.moat_score, &bounds.moat_score);
    for (name, pct) in input.synergies.categories() {
        if pct < Decimal::ZERO {
            checker.violation(&format!("synergies.{name}"), pct, "cannot be negative");
        }
    }

    // --- Non-negative amounts ---
    for (field, value) in [
        ("cash", input.cash),
        ("debt", input.debt),
        ("depreciation_amortization", input.depreciation_amortization),
    ] {
        if value < Decimal::ZERO {
            checker.violation(field, value, "cannot be negative");
        }
    }

    cross_field_checks(input, &mut checker);

    BoundsReport {
        violations: checker.violations,
        checks: checker.checks,
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Checker {
    violations: Vec<BoundViolation>,
    checks: Vec<ValidationCheck>,
}

impl Checker {
    fn field(&mut self, field: &str, value: Decimal, bounds: &FieldBounds) {
        if value < bounds.min || value > bounds.max {
            self.violation(
                field,
                value,
                &format!("outside allowed range [{}, {}]", bounds.min, bounds.max),
            );
        } else if !bounds.typical.contains(value) {
            self.checks.push(ValidationCheck::new(
                CheckKind::InputBounds,
                Severity::Low,
                format!(
                    "{field} = {value} is outside the typical range [{}, {}]",
                    bounds.typical.low, bounds.typical.high
                ),
                format!("Confirm {field} against source documents"),
            ));
        }
    }

    fn violation(&mut self, field: &str, value: Decimal, message: &str) {
        self.violations.push(BoundViolation {
            field: field.to_string(),
            value,
            message: message.to_string(),
        });
    }
}

fn cross_field_checks(input: &ValuationInput, checker: &mut Checker) {
    if let Some(ebit_margin) = input.ebit_margin {
        if ebit_margin > input.ebitda_margin {
            checker.violation("ebit_margin", ebit_margin, "EBIT margin cannot exceed EBITDA margin");
        }
    }
    if let Some(gross) = input.gross_margin {
        if gross < input.ebitda_margin {
            checker.violation("gross_margin", gross, "gross margin cannot be below EBITDA margin");
        }
    }
    if input.depreciation_amortization > input.revenue {
        checker.violation(
            "depreciation_amortization",
            input.depreciation_amortization,
            "D&A cannot exceed revenue",
        );
    }
    if let MaintenanceCapex::Fixed(amount) = input.maintenance_capex {
        if amount < Decimal::ZERO || amount >= input.revenue {
            checker.violation(
                "maintenance_capex",
                amount,
                "fixed capex must be non-negative and below revenue",
            );
        }
    }
    if let Some(bad) = input.historical_ebitda.iter().find(|v| v.abs() > input.revenue * dec!(10)) {
        checker.violation(
            "historical_ebitda",
            *bad,
            "historical EBITDA is implausible against current revenue",
        );
    }
    if !input.historical_revenue.is_empty()
        && !input.historical_ebitda.is_empty()
        && input.historical_revenue.len() != input.historical_ebitda.len()
    {
        checker.checks.push(ValidationCheck::new(
            CheckKind::InputBounds,
            Severity::Low,
            "Historical revenue and EBITDA series differ in length",
            "Align the historical series to the same fiscal years",
        ));
    }
    if input.historical_ebitda.len() < 3 {
        checker.checks.push(ValidationCheck::new(
            CheckKind::InputBounds,
            Severity::Low,
            format!(
                "Only {} year(s) of EBITDA history supplied",
                input.historical_ebitda.len()
            ),
            "Provide at least three years of financial statements",
        ));
    }
    if input.debt > input.revenue * dec!(3) {
        checker.checks.push(ValidationCheck::new(
            CheckKind::InputBounds,
            Severity::Low,
            format!("Debt of {} exceeds three times revenue", input.debt),
            "Confirm debt balances and whether any are non-operating",
        ));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::tests::sample_input;

    #[test]
    fn test_sample_record_is_clean() {
        let report = check_bounds(&sample_input(), &InputBounds::default());
        assert!(!report.is_blocking(), "{:?}", report.violations);
    }

    #[test]
    fn test_out_of_range_blocks() {
        let mut input = sample_input();
        input.tax_rate = dec!(0.9);
        input.rates.beta = dec!(9);
        let report = check_bounds(&input, &InputBounds::default());
        assert_eq!(report.violations.len(), 2);
        match report.into_result() {
            Err(PracticeValuationError::InputRejected { violations }) => {
                assert!(violations[0].contains("tax_rate"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_typical_range_is_informational() {
        let mut input = sample_input();
        input.ebitda_margin = dec!(0.45);
        input.gross_margin = Some(dec!(0.70));
        let report = check_bounds(&input, &InputBounds::default());
        assert!(!report.is_blocking());
        let finding = report
            .checks
            .iter()
            .find(|c| c.message.contains("ebitda_margin"))
            .unwrap();
        assert_eq!(finding.severity, Severity::Low);
        assert!(finding.is_valid);
    }

    #[test]
    fn test_cross_field_margins() {
        let mut input = sample_input();
        input.ebit_margin = Some(dec!(0.30));
        let report = check_bounds(&input, &InputBounds::default());
        assert!(report.violations.iter().any(|v| v.field == "ebit_margin"));
    }

    #[test]
    fn test_zero_locations_rejected() {
        let mut input = sample_input();
        input.locations = 0;
        let report = check_bounds(&input, &InputBounds::default());
        assert!(report.violations.iter().any(|v| v.field == "locations"));
    }

    #[test]
    fn test_envelope_lists_violations_as_warnings() {
        let mut input = sample_input();
        input.revenue = dec!(-5);
        let out = validate_inputs(&input, &InputBounds::default()).unwrap();
        assert!(out.result.is_blocking());
        assert!(out.warnings.iter().any(|w| w.starts_with("revenue")));
    }
}
