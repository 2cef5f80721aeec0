use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::PracticeValuationError;
use crate::input::MaintenanceCapex;
use crate::types::{clamp_dec, safe_div, with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::PracticeValuationResult;

use super::trend::{analyze_trend, TrendAnalysis};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How historical growth is tamed into a projection path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthPolicy {
    /// Ceiling applied to the historical CAGR before the haircut
    pub max_historical_growth: Rate,
    /// Multiplier applied to the capped historical growth
    pub growth_haircut: Rate,
    /// Long-run growth the path decays toward
    pub terminal_growth: Rate,
    /// Geometric decay per projection year
    pub decay_rate: Rate,
    /// Floor on any projected year's growth
    pub min_growth: Rate,
    /// Conservative exit multiple on final-year EBITDA
    pub exit_multiple: Multiple,
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        GrowthPolicy {
            max_historical_growth: dec!(0.25),
            growth_haircut: dec!(0.75),
            terminal_growth: dec!(0.025),
            decay_rate: dec!(0.35),
            min_growth: Decimal::ZERO,
            exit_multiple: dec!(5.0),
        }
    }
}

/// Terminal value methodology that produced the value used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalMethod {
    PerpetuityGrowth,
    ExitMultiple,
}

/// Input parameters for the practice DCF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfInput {
    /// Base (year 0) revenue
    pub base_revenue: Money,
    /// Historical revenue, oldest first, for trend analysis
    #[serde(default)]
    pub historical_revenue: Vec<Money>,
    /// Overrides the trend-derived historical growth when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_growth_override: Option<Rate>,
    pub ebitda_margin: Rate,
    /// D&A as a fraction of revenue
    #[serde(default)]
    pub da_pct_revenue: Rate,
    #[serde(default)]
    pub maintenance_capex: MaintenanceCapex,
    /// Net working capital investment as a fraction of incremental revenue
    #[serde(default)]
    pub nwc_pct_incremental_revenue: Rate,
    pub tax_rate: Rate,
    pub wacc: Rate,
    #[serde(default = "default_horizon")]
    pub projection_years: u32,
    #[serde(default)]
    pub growth_policy: GrowthPolicy,
    /// Per-year EBITDA uplift (e.g. phased synergies); last value carries forward
    #[serde(default)]
    pub ebitda_uplift: Vec<Money>,
    #[serde(default)]
    pub mid_year_convention: bool,
    #[serde(default)]
    pub cash: Money,
    #[serde(default)]
    pub debt: Money,
}

fn default_horizon() -> u32 {
    5
}

/// Projection for a single year of the DCF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfYearProjection {
    pub year: u32,
    pub growth_rate: Rate,
    pub revenue: Money,
    pub ebitda: Money,
    pub ebit: Money,
    pub nopat: Money,
    pub plus_da: Money,
    pub less_capex: Money,
    pub less_nwc_change: Money,
    pub free_cash_flow: Money,
    pub discount_factor: Rate,
    pub pv_fcf: Money,
}

/// Both terminal values and the one carried into enterprise value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalValueBreakdown {
    /// Gordon growth value; absent when WACC does not exceed terminal growth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perpetuity_value: Option<Money>,
    pub exit_multiple_value: Money,
    /// min(perpetuity, exit multiple)
    pub terminal_value_used: Money,
    pub method_used: TerminalMethod,
    pub pv_terminal: Money,
}

/// Output of the DCF valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfOutput {
    /// False when revenue or margins leave no positive cash flow to discount
    pub applicable: bool,
    pub trend: TrendAnalysis,
    /// Historical growth after cap and haircut
    pub starting_growth: Rate,
    pub growth_path: Vec<Rate>,
    pub projections: Vec<DcfYearProjection>,
    pub terminal: TerminalValueBreakdown,
    pub pv_of_fcf: Money,
    pub enterprise_value: Money,
    pub equity_value: Money,
    /// Enterprise value over base-year EBITDA
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_ev_ebitda: Option<Multiple>,
    pub terminal_value_pct: Rate,
    pub wacc_used: Rate,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run a decaying-growth FCF DCF with conservative dual terminal value.
pub fn calculate_dcf(input: &DcfInput) -> PracticeValuationResult<ComputationOutput<DcfOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_dcf_input(input)?;
    let output = build_dcf(input, &mut warnings);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Decaying-growth FCF DCF with min(perpetuity, exit multiple) terminal value",
        input,
        warnings,
        elapsed,
        output,
    ))
}

/// Core DCF computation. Assumes `validate_dcf_input` has passed.
pub fn build_dcf(input: &DcfInput, warnings: &mut Vec<String>) -> DcfOutput {
    let wacc = input.wacc;
    let policy = &input.growth_policy;

    // --- Historical growth: cap, then haircut ---
    let trend = analyze_trend(&input.historical_revenue);
    let historical = input.historical_growth_override.unwrap_or_else(|| {
        if trend.periods < 2 {
            warnings.push(
                "Fewer than two years of revenue history; projecting from terminal growth".into(),
            );
            policy.terminal_growth
        } else {
            trend.cagr
        }
    });
    let capped = historical.min(policy.max_historical_growth);
    if capped < historical {
        warnings.push(format!(
            "Historical growth {} capped at {}",
            historical.round_dp(4),
            policy.max_historical_growth
        ));
    }
    let starting_growth = capped * policy.growth_haircut;

    let growth_path = growth_path(
        starting_growth,
        policy.terminal_growth,
        policy.decay_rate,
        policy.min_growth,
        input.projection_years,
    );

    if wacc <= Decimal::ZERO {
        warnings.push(format!("DCF not applicable: WACC ({wacc}) must be positive"));
        return DcfOutput {
            applicable: false,
            trend,
            starting_growth,
            growth_path,
            projections: Vec::new(),
            terminal: TerminalValueBreakdown {
                perpetuity_value: None,
                exit_multiple_value: Decimal::ZERO,
                terminal_value_used: Decimal::ZERO,
                method_used: TerminalMethod::ExitMultiple,
                pv_terminal: Decimal::ZERO,
            },
            pv_of_fcf: Decimal::ZERO,
            enterprise_value: Decimal::ZERO,
            equity_value: Decimal::ZERO,
            implied_ev_ebitda: None,
            terminal_value_pct: Decimal::ZERO,
            wacc_used: wacc,
        };
    }

    let projections = build_projections(input, &growth_path, wacc);
    let pv_of_fcf: Money = projections.iter().map(|p| p.pv_fcf).sum();

    let terminal = match projections.last() {
        Some(last) => compute_terminal_value(input, last, wacc, warnings),
        None => TerminalValueBreakdown {
            perpetuity_value: None,
            exit_multiple_value: Decimal::ZERO,
            terminal_value_used: Decimal::ZERO,
            method_used: TerminalMethod::ExitMultiple,
            pv_terminal: Decimal::ZERO,
        },
    };

    let enterprise_value = pv_of_fcf + terminal.pv_terminal;
    let applicable = enterprise_value > Decimal::ZERO;
    if !applicable {
        warnings.push(
            "DCF not applicable: projected cash flows are not positive; use an asset-based valuation"
                .into(),
        );
    }

    let terminal_value_pct = safe_div(terminal.pv_terminal, enterprise_value)
        .filter(|_| applicable)
        .unwrap_or(Decimal::ZERO);
    if terminal_value_pct > dec!(0.80) {
        warnings.push(format!(
            "Terminal value represents {:.1}% of enterprise value",
            terminal_value_pct * dec!(100)
        ));
    }

    let base_ebitda = input.base_revenue * input.ebitda_margin;
    let implied_ev_ebitda = safe_div(enterprise_value, base_ebitda).filter(|_| applicable);

    DcfOutput {
        applicable,
        trend,
        starting_growth,
        growth_path,
        projections,
        terminal,
        pv_of_fcf,
        enterprise_value,
        equity_value: enterprise_value + input.cash - input.debt,
        implied_ev_ebitda,
        terminal_value_pct,
        wacc_used: wacc,
    }
}

/// `growth(year) = max(min, terminal + (start - terminal) * (1 - decay)^(year - 1))`
pub fn growth_path(
    starting_growth: Rate,
    terminal_growth: Rate,
    decay_rate: Rate,
    min_growth: Rate,
    years: u32,
) -> Vec<Rate> {
    let retention = clamp_dec(Decimal::ONE - decay_rate, Decimal::ZERO, Decimal::ONE);
    (1..=years)
        .map(|year| {
            let faded = retention.powi(i64::from(year) - 1);
            (terminal_growth + (starting_growth - terminal_growth) * faded).max(min_growth)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_dcf_input(input: &DcfInput) -> PracticeValuationResult<()> {
    if input.wacc <= Decimal::ZERO {
        return Err(PracticeValuationError::InvalidInput {
            field: "wacc".into(),
            reason: "WACC must be positive".into(),
        });
    }
    if input.base_revenue <= Decimal::ZERO {
        return Err(PracticeValuationError::InvalidInput {
            field: "base_revenue".into(),
            reason: "Base revenue must be positive".into(),
        });
    }
    if input.ebitda_margin >= Decimal::ONE {
        return Err(PracticeValuationError::InvalidInput {
            field: "ebitda_margin".into(),
            reason: "EBITDA margin must be below 1".into(),
        });
    }
    if input.tax_rate < Decimal::ZERO || input.tax_rate >= Decimal::ONE {
        return Err(PracticeValuationError::InvalidInput {
            field: "tax_rate".into(),
            reason: "Tax rate must be in [0, 1)".into(),
        });
    }
    if !(1..=15).contains(&input.projection_years) {
        return Err(PracticeValuationError::InvalidInput {
            field: "projection_years".into(),
            reason: "Projection horizon must be between 1 and 15 years".into(),
        });
    }
    if input.growth_policy.exit_multiple <= Decimal::ZERO {
        return Err(PracticeValuationError::InvalidInput {
            field: "growth_policy.exit_multiple".into(),
            reason: "Exit multiple must be positive".into(),
        });
    }
    Ok(())
}

fn build_projections(input: &DcfInput, growth_path: &[Rate], wacc: Rate) -> Vec<DcfYearProjection> {
    let mut projections = Vec::with_capacity(growth_path.len());
    let mut prev_revenue = input.base_revenue;

    for (idx, growth) in growth_path.iter().enumerate() {
        let year = idx as u32 + 1;
        let revenue = prev_revenue * (Decimal::ONE + growth);
        let uplift = input
            .ebitda_uplift
            .get(idx)
            .or_else(|| input.ebitda_uplift.last())
            .copied()
            .unwrap_or(Decimal::ZERO);
        let ebitda = revenue * input.ebitda_margin + uplift;
        let da = revenue * input.da_pct_revenue;
        let ebit = ebitda - da;
        let nopat = ebit * (Decimal::ONE - input.tax_rate);
        let capex = input.maintenance_capex.amount(revenue);
        let nwc_change = (revenue - prev_revenue) * input.nwc_pct_incremental_revenue;

        // FCF = NOPAT + D&A - CapEx - delta NWC
        let free_cash_flow = nopat + da - capex - nwc_change;

        let period = if input.mid_year_convention {
            Decimal::from(year) - dec!(0.5)
        } else {
            Decimal::from(year)
        };
        let discount_factor =
            safe_div(Decimal::ONE, (Decimal::ONE + wacc).powd(period)).unwrap_or(Decimal::ZERO);
        let pv_fcf = free_cash_flow * discount_factor;

        projections.push(DcfYearProjection {
            year,
            growth_rate: *growth,
            revenue,
            ebitda,
            ebit,
            nopat,
            plus_da: da,
            less_capex: capex,
            less_nwc_change: nwc_change,
            free_cash_flow,
            discount_factor,
            pv_fcf,
        });

        prev_revenue = revenue;
    }

    projections
}

fn compute_terminal_value(
    input: &DcfInput,
    last_year: &DcfYearProjection,
    wacc: Rate,
    warnings: &mut Vec<String>,
) -> TerminalValueBreakdown {
    let g = input.growth_policy.terminal_growth;
    let exit_multiple_value = last_year.ebitda * input.growth_policy.exit_multiple;

    let perpetuity_value = if wacc > g {
        let value = last_year
            .free_cash_flow
            .checked_mul(Decimal::ONE + g)
            .and_then(|next| safe_div(next, wacc - g));
        if value.is_none() {
            warnings.push(format!(
                "Perpetuity value overflows with WACC ({wacc}) this close to terminal growth ({g}); exit multiple used"
            ));
        }
        value
    } else {
        warnings.push(format!(
            "WACC ({wacc}) does not exceed terminal growth ({g}); perpetuity value skipped"
        ));
        None
    };

    // Conservative: the lower of the two methodologies.
    let (terminal_value_used, method_used) = match perpetuity_value {
        Some(pv) if pv <= exit_multiple_value => (pv, TerminalMethod::PerpetuityGrowth),
        _ => (exit_multiple_value, TerminalMethod::ExitMultiple),
    };

    let periods = Decimal::from(last_year.year);
    let pv_terminal =
        safe_div(terminal_value_used, (Decimal::ONE + wacc).powd(periods)).unwrap_or(Decimal::ZERO);

    TerminalValueBreakdown {
        perpetuity_value,
        exit_multiple_value,
        terminal_value_used,
        method_used,
        pv_terminal,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dcf_input() -> DcfInput {
        DcfInput {
            base_revenue: dec!(3000000),
            historical_revenue: vec![
                dec!(2000000),
                dec!(2300000),
                dec!(2650000),
                dec!(3000000),
            ],
            historical_growth_override: None,
            ebitda_margin: dec!(0.22),
            da_pct_revenue: dec!(0.03),
            maintenance_capex: MaintenanceCapex::PctOfRevenue(dec!(0.03)),
            nwc_pct_incremental_revenue: dec!(0.05),
            tax_rate: dec!(0.25),
            wacc: dec!(0.14),
            projection_years: 5,
            growth_policy: GrowthPolicy::default(),
            ebitda_uplift: Vec::new(),
            mid_year_convention: false,
            cash: dec!(200000),
            debt: dec!(500000),
        }
    }

    #[test]
    fn test_basic_dcf() {
        let out = calculate_dcf(&sample_dcf_input()).unwrap().result;
        assert!(out.applicable);
        assert_eq!(out.projections.len(), 5);
        assert_eq!(out.growth_path.len(), 5);
        assert!(out.enterprise_value > Decimal::ZERO);
        assert_eq!(out.equity_value, out.enterprise_value + dec!(200000) - dec!(500000));
        assert_eq!(out.wacc_used, dec!(0.14));
    }

    #[test]
    fn test_terminal_value_is_minimum_of_methods() {
        let out = calculate_dcf(&sample_dcf_input()).unwrap().result;
        let t = &out.terminal;
        let perpetuity = t.perpetuity_value.unwrap();
        assert_eq!(t.terminal_value_used, perpetuity.min(t.exit_multiple_value));
    }

    #[test]
    fn test_terminal_minimum_across_waccs() {
        for wacc in [dec!(0.06), dec!(0.09), dec!(0.12), dec!(0.18), dec!(0.25)] {
            let mut input = sample_dcf_input();
            input.wacc = wacc;
            let t = calculate_dcf(&input).unwrap().result.terminal;
            let expected = match t.perpetuity_value {
                Some(p) => p.min(t.exit_multiple_value),
                None => t.exit_multiple_value,
            };
            assert_eq!(t.terminal_value_used, expected, "wacc={wacc}");
        }
    }

    #[test]
    fn test_growth_path_decays_toward_terminal() {
        let path = growth_path(dec!(0.12), dec!(0.025), dec!(0.35), Decimal::ZERO, 6);
        assert_eq!(path[0], dec!(0.12));
        for pair in path.windows(2) {
            assert!(pair[1] < pair[0]);
            assert!(pair[1] > dec!(0.025));
        }
    }

    #[test]
    fn test_growth_path_respects_floor() {
        let path = growth_path(dec!(-0.10), dec!(0.02), dec!(0.35), Decimal::ZERO, 4);
        assert!(path.iter().all(|g| *g >= Decimal::ZERO));
    }

    #[test]
    fn test_historical_growth_capped_and_haircut() {
        let mut input = sample_dcf_input();
        input.historical_growth_override = Some(dec!(0.40));
        let out = calculate_dcf(&input).unwrap();
        // min(0.40, 0.25) * 0.75
        assert_eq!(out.result.starting_growth, dec!(0.1875));
        assert!(out.warnings.iter().any(|w| w.contains("capped")));
    }

    #[test]
    fn test_perpetuity_skipped_when_wacc_below_growth() {
        let mut input = sample_dcf_input();
        input.wacc = dec!(0.02);
        let out = calculate_dcf(&input).unwrap();
        let t = &out.result.terminal;
        assert!(t.perpetuity_value.is_none());
        assert_eq!(t.method_used, TerminalMethod::ExitMultiple);
        assert!(out.warnings.iter().any(|w| w.contains("perpetuity")));
    }

    #[test]
    fn test_uplift_carries_forward() {
        let mut input = sample_dcf_input();
        input.ebitda_uplift = vec![dec!(10000), dec!(20000)];
        let with_uplift = calculate_dcf(&input).unwrap().result;
        let base = calculate_dcf(&sample_dcf_input()).unwrap().result;
        let diff_y5 = with_uplift.projections[4].ebitda - base.projections[4].ebitda;
        assert_eq!(diff_y5, dec!(20000));
        assert!(with_uplift.enterprise_value > base.enterprise_value);
    }

    #[test]
    fn test_mid_year_convention_raises_value() {
        let mut input = sample_dcf_input();
        let end_year = calculate_dcf(&input).unwrap().result.enterprise_value;
        input.mid_year_convention = true;
        let mid_year = calculate_dcf(&input).unwrap().result.enterprise_value;
        assert!(mid_year > end_year);
    }

    #[test]
    fn test_negative_margin_not_applicable() {
        let mut input = sample_dcf_input();
        input.ebitda_margin = dec!(-0.10);
        let out = calculate_dcf(&input).unwrap();
        assert!(!out.result.applicable);
        assert!(out.result.implied_ev_ebitda.is_none());
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let mut input = sample_dcf_input();
        input.wacc = Decimal::ZERO;
        assert!(calculate_dcf(&input).is_err());

        let mut input = sample_dcf_input();
        input.projection_years = 0;
        assert!(calculate_dcf(&input).is_err());
    }

    #[test]
    fn test_wacc_a_hair_above_growth_falls_back_to_exit_multiple() {
        let mut input = sample_dcf_input();
        input.wacc = dec!(0.0250000000000000000000001);
        let out = calculate_dcf(&input).unwrap();
        let t = &out.result.terminal;
        assert!(t.perpetuity_value.is_none());
        assert_eq!(t.method_used, TerminalMethod::ExitMultiple);
        assert_eq!(t.terminal_value_used, t.exit_multiple_value);
        assert!(out.result.enterprise_value > Decimal::ZERO);
        assert!(out.warnings.iter().any(|w| w.contains("overflows")));
    }

    #[test]
    fn test_non_positive_wacc_not_applicable_in_core() {
        let mut input = sample_dcf_input();
        input.wacc = dec!(-0.01);
        let mut warnings = Vec::new();
        let out = build_dcf(&input, &mut warnings);
        assert!(!out.applicable);
        assert!(out.projections.is_empty());
        assert_eq!(out.enterprise_value, Decimal::ZERO);
        assert_eq!(out.growth_path.len(), 5);
        assert!(warnings.iter().any(|w| w.contains("WACC")));
    }
}
