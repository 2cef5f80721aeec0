use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::types::{safe_div, with_metadata, Band, ComputationOutput, Money, Multiple, Rate};
use crate::valuation::benchmarks::BenchmarkSet;
use crate::PracticeValuationResult;

use super::report::{CheckKind, Severity, ValidationCheck, ValidationReport};

/// Multiples of the band edges beyond which misalignment is high severity.
const BAND_UPPER_TOLERANCE: Decimal = dec!(1.3);
const BAND_LOWER_TOLERANCE: Decimal = dec!(0.7);
/// EBITDA margin below which the record is treated as critical.
const CRITICAL_MARGIN: Rate = dec!(0.08);
/// Synergy share of EBITDA regarded as aggressive for multi-site practices.
const AGGRESSIVE_SYNERGY: Rate = dec!(0.15);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Figures the cross-validation checks compare.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationInput {
    pub revenue: Money,
    /// Adjusted EBITDA used by the valuators
    pub ebitda: Money,
    pub ebitda_margin: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gross_margin: Option<Rate>,
    pub locations: u32,
    #[serde(default)]
    pub physician_dependent: bool,
    /// Total synergy as a fraction of EBITDA
    #[serde(default)]
    pub synergy_pct: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_earnings_epv: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nopat_epv: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epv_value: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dcf_value: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple_value: Option<Money>,
    /// Enterprise value whose implied multiples are checked
    pub enterprise_value: Money,
    #[serde(default)]
    pub benchmarks: BenchmarkSet,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run every consistency check and aggregate them into a scored report.
pub fn cross_validate(
    input: &CrossValidationInput,
) -> PracticeValuationResult<ComputationOutput<ValidationReport>> {
    let start = Instant::now();
    let report = ValidationReport::from_checks(run_checks(input));

    let warnings = report
        .findings(Severity::High)
        .map(|c| format!("[{}] {}", c.severity, c.message))
        .collect();

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Pairwise method and benchmark cross-validation",
        input,
        warnings,
        elapsed,
        report,
    ))
}

/// All checks in reporting order.
pub fn run_checks(input: &CrossValidationInput) -> Vec<ValidationCheck> {
    let b = &input.benchmarks;
    let mut checks = Vec::new();

    if let (Some(owner), Some(nopat)) = (input.owner_earnings_epv, input.nopat_epv) {
        checks.push(check_epv_consistency(owner, nopat));
    }
    checks.extend(check_multiple_alignment(
        input.enterprise_value,
        input.revenue,
        input.ebitda,
        b,
    ));
    checks.extend(check_margins(
        input.ebitda_margin,
        input.gross_margin,
        input.physician_dependent,
        b,
    ));
    checks.extend(check_scaling(
        input.revenue,
        input.ebitda,
        input.locations,
        input.synergy_pct,
        b,
    ));
    checks.push(check_method_comparison(
        input.epv_value,
        input.dcf_value,
        input.multiple_value,
    ));
    checks.push(check_small_practice(
        input.revenue,
        input.ebitda,
        input.enterprise_value,
    ));
    checks
}

/// Relative variance between owner-earnings EPV and NOPAT EPV.
///
/// Variance is `|owner - nopat| / owner`: above 25% critical, 15% high, 10% medium.
pub fn check_epv_consistency(owner_earnings_epv: Money, nopat_epv: Money) -> ValidationCheck {
    let Some(variance) = safe_div((owner_earnings_epv - nopat_epv).abs(), owner_earnings_epv.abs())
    else {
        return ValidationCheck::new(
            CheckKind::EpvConsistency,
            Severity::High,
            "Owner-earnings EPV is zero; EPV variants cannot be compared",
            "Review EBIT, D&A and maintenance capex inputs",
        );
    };

    let severity = if variance > dec!(0.25) {
        Severity::Critical
    } else if variance > dec!(0.15) {
        Severity::High
    } else if variance > dec!(0.10) {
        Severity::Medium
    } else {
        Severity::Low
    };
    let action = match severity {
        Severity::Low => "No action required",
        _ => "Reconcile D&A against maintenance capex; a large gap means reinvestment is mis-stated",
    };

    ValidationCheck::new(
        CheckKind::EpvConsistency,
        severity,
        format!(
            "Owner-earnings EPV and NOPAT EPV differ by {:.1}%",
            variance * dec!(100)
        ),
        action,
    )
    .with_variance(owner_earnings_epv, nopat_epv, variance)
}

/// Implied EV/EBITDA and EV/Revenue against size-tiered benchmark bands.
pub fn check_multiple_alignment(
    enterprise_value: Money,
    revenue: Money,
    ebitda: Money,
    benchmarks: &BenchmarkSet,
) -> Vec<ValidationCheck> {
    let tier = benchmarks.size_tier(revenue);
    let mut checks = Vec::with_capacity(2);

    if ebitda > Decimal::ZERO {
        if let Some(implied) = safe_div(enterprise_value, ebitda) {
            checks.push(band_alignment(
                "EV/EBITDA",
                implied,
                benchmarks.ev_ebitda.for_tier(tier),
                &tier.to_string(),
            ));
        }
    }
    if let Some(implied) = safe_div(enterprise_value, revenue) {
        checks.push(band_alignment(
            "EV/Revenue",
            implied,
            benchmarks.ev_revenue.for_tier(tier),
            &tier.to_string(),
        ));
    }
    checks
}

/// EBITDA and gross margin against physician-adjusted bands.
pub fn check_margins(
    ebitda_margin: Rate,
    gross_margin: Option<Rate>,
    physician_dependent: bool,
    benchmarks: &BenchmarkSet,
) -> Vec<ValidationCheck> {
    let band = benchmarks.ebitda_margin_band(physician_dependent);
    let mut checks = Vec::with_capacity(2);

    let severity = if ebitda_margin < CRITICAL_MARGIN {
        Severity::Critical
    } else if band.contains(ebitda_margin) {
        Severity::Low
    } else {
        Severity::Medium
    };
    let action = match severity {
        Severity::Critical => "Margin is too thin for an earnings-based valuation; normalise or use asset-based value",
        Severity::Medium => "Verify normalisation adjustments and owner compensation",
        _ => "No action required",
    };
    checks.push(
        ValidationCheck::new(
            CheckKind::MarginPlausibility,
            severity,
            format!(
                "EBITDA margin {:.1}% against expected {:.0}%-{:.0}%",
                ebitda_margin * dec!(100),
                band.low * dec!(100),
                band.high * dec!(100)
            ),
            action,
        )
        .with_variance(ebitda_margin, band.midpoint(), ebitda_margin - band.midpoint()),
    );

    if let Some(gross) = gross_margin {
        let gb = benchmarks.gross_margin_band(physician_dependent);
        let severity = if gb.contains(gross) {
            Severity::Low
        } else {
            Severity::Medium
        };
        checks.push(
            ValidationCheck::new(
                CheckKind::MarginPlausibility,
                severity,
                format!(
                    "Gross margin {:.1}% against expected {:.0}%-{:.0}%",
                    gross * dec!(100),
                    gb.low * dec!(100),
                    gb.high * dec!(100)
                ),
                if severity == Severity::Low {
                    "No action required"
                } else {
                    "Review cost of services and product margins"
                },
            )
            .with_variance(gross, gb.midpoint(), gross - gb.midpoint()),
        );
    }
    checks
}

/// Per-location revenue and EBITDA, plus synergy aggressiveness for multi-site practices.
pub fn check_scaling(
    revenue: Money,
    ebitda: Money,
    locations: u32,
    synergy_pct: Rate,
    benchmarks: &BenchmarkSet,
) -> Vec<ValidationCheck> {
    let sites = Decimal::from(locations.max(1));
    let mut checks = Vec::with_capacity(3);

    for (label, per_site, band) in [
        ("Revenue", revenue / sites, benchmarks.revenue_per_location),
        ("EBITDA", ebitda / sites, benchmarks.ebitda_per_location),
    ] {
        let severity = if band.contains(per_site) {
            Severity::Low
        } else {
            Severity::Medium
        };
        checks.push(
            ValidationCheck::new(
                CheckKind::ScalingConsistency,
                severity,
                format!(
                    "{label} per location {} against expected {}-{}",
                    per_site.round_dp(0),
                    band.low,
                    band.high
                ),
                if severity == Severity::Low {
                    "No action required"
                } else {
                    "Check location count and whether all sites are fully operational"
                },
            )
            .with_variance(per_site, band.midpoint(), per_site - band.midpoint()),
        );
    }

    if locations > 1 && synergy_pct > AGGRESSIVE_SYNERGY {
        checks.push(
            ValidationCheck::new(
                CheckKind::ScalingConsistency,
                Severity::Medium,
                format!(
                    "Synergies of {:.1}% of EBITDA are aggressive for a multi-location practice",
                    synergy_pct * dec!(100)
                ),
                "Support each synergy category with an integration plan",
            )
            .with_variance(synergy_pct, AGGRESSIVE_SYNERGY, synergy_pct - AGGRESSIVE_SYNERGY),
        );
    }
    checks
}

/// Spread `(max - min) / min` across the applicable method values.
pub fn check_method_comparison(
    epv: Option<Money>,
    dcf: Option<Money>,
    multiple: Option<Money>,
) -> ValidationCheck {
    let values: Vec<Money> = [epv, dcf, multiple]
        .into_iter()
        .flatten()
        .filter(|v| *v > Decimal::ZERO)
        .collect();

    let (Some(min), Some(max)) = (values.iter().min().copied(), values.iter().max().copied())
    else {
        return ValidationCheck::new(
            CheckKind::MethodComparison,
            Severity::High,
            "No valuation method produced a positive value",
            "Use an asset-based valuation",
        );
    };
    if values.len() < 2 {
        return ValidationCheck::new(
            CheckKind::MethodComparison,
            Severity::Medium,
            "Only one valuation method is applicable; no cross-check possible",
            "Treat the single-method value with caution",
        );
    }

    let spread = safe_div(max - min, min).unwrap_or(Decimal::ZERO);
    let severity = if spread > dec!(0.5) {
        Severity::Critical
    } else if spread > dec!(0.3) {
        Severity::High
    } else if spread > dec!(0.2) {
        Severity::Medium
    } else {
        Severity::Low
    };
    let action = match severity {
        Severity::Low => "No action required",
        Severity::Medium => "Review growth and multiple assumptions",
        _ => "Methods disagree materially; revisit WACC, growth and normalisation inputs",
    };

    ValidationCheck::new(
        CheckKind::MethodComparison,
        severity,
        format!("Valuation methods spread {:.1}%", spread * dec!(100)),
        action,
    )
    .with_variance(max, min, spread)
}

/// Revenue-size risk and elevated multiples on sub-$1M practices.
pub fn check_small_practice(revenue: Money, ebitda: Money, enterprise_value: Money) -> ValidationCheck {
    if revenue < dec!(250000) {
        return ValidationCheck::new(
            CheckKind::SmallPracticeRisk,
            Severity::Critical,
            format!("Revenue of {} is below $250K", revenue.round_dp(0)),
            "Use an asset-based valuation instead of earnings-based methods",
        );
    }
    if revenue < dec!(500000) {
        return ValidationCheck::new(
            CheckKind::SmallPracticeRisk,
            Severity::High,
            format!("Revenue of {} is below $500K", revenue.round_dp(0)),
            "Apply small-practice discounts and confirm the buyer pool",
        );
    }
    if revenue < dec!(1000000) {
        let ev_revenue = safe_div(enterprise_value, revenue).unwrap_or(Decimal::ZERO);
        let ev_ebitda = if ebitda > Decimal::ZERO {
            safe_div(enterprise_value, ebitda).unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        if ev_revenue > dec!(1.2) || ev_ebitda > dec!(4.0) {
            return ValidationCheck::new(
                CheckKind::SmallPracticeRisk,
                Severity::Medium,
                format!(
                    "Elevated multiples ({}x revenue, {}x EBITDA) for a sub-$1M practice",
                    ev_revenue.round_dp(2),
                    ev_ebitda.round_dp(2)
                ),
                "Apply the practice-size safeguard caps",
            )
            .with_variance(ev_revenue, dec!(1.2), ev_revenue - dec!(1.2));
        }
    }
    ValidationCheck::new(
        CheckKind::SmallPracticeRisk,
        Severity::Low,
        "Practice size does not warrant additional risk treatment",
        "No action required",
    )
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn band_alignment(label: &str, implied: Multiple, band: Band, tier: &str) -> ValidationCheck {
    let severity = if implied > band.high * BAND_UPPER_TOLERANCE
        || implied < band.low * BAND_LOWER_TOLERANCE
    {
        Severity::High
    } else if band.contains(implied) {
        Severity::Low
    } else {
        Severity::Medium
    };
    let action = match severity {
        Severity::Low => "No action required",
        _ => "Compare against recent comparable transactions for this size tier",
    };
    ValidationCheck::new(
        CheckKind::MultipleAlignment,
        severity,
        format!(
            "Implied {label} {}x against {tier}-practice range {}x-{}x",
            implied.round_dp(2),
            band.low,
            band.high
        ),
        action,
    )
    .with_variance(implied, band.midpoint(), implied - band.midpoint())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
