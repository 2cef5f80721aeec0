use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::PracticeValuationError;
use crate::types::{safe_div, with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::PracticeValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Reinvestment needed to sustain current earnings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Reinvestment {
    /// Fraction of EBIT
    FractionOfEbit(Rate),
    /// Fixed maintenance-capex figure
    Fixed(Money),
}

impl Reinvestment {
    pub fn amount(&self, ebit: Money) -> Money {
        match self {
            Reinvestment::FractionOfEbit(f) => ebit * f,
            Reinvestment::Fixed(amount) => *amount,
        }
    }

    /// Same reinvestment scaled by `factor` (used by sensitivity grids).
    pub fn scaled(&self, factor: Decimal) -> Reinvestment {
        match self {
            Reinvestment::FractionOfEbit(f) => Reinvestment::FractionOfEbit(f * factor),
            Reinvestment::Fixed(amount) => Reinvestment::Fixed(amount * factor),
        }
    }
}

/// Input for an Earnings Power Value valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpvInput {
    pub ebit: Money,
    pub tax_rate: Rate,
    pub reinvestment: Reinvestment,
    pub wacc: Rate,
    /// D&A, used for the owner-earnings variant
    #[serde(default)]
    pub depreciation_amortization: Money,
    /// Maintenance capex, used for the owner-earnings variant
    #[serde(default)]
    pub maintenance_capex: Money,
    #[serde(default)]
    pub cash: Money,
    #[serde(default)]
    pub debt: Money,
}

/// Output of the EPV valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpvOutput {
    /// False when WACC is non-positive or earnings are negative
    pub applicable: bool,
    pub nopat: Money,
    pub reinvestment: Money,
    /// NOPAT less reinvestment
    pub sustainable_earnings: Money,
    /// NOPAT + D&A - maintenance capex
    pub owner_earnings: Money,
    /// (NOPAT - reinvestment) / WACC
    pub enterprise_value: Money,
    pub equity_value: Money,
    /// Owner earnings / WACC
    pub owner_earnings_epv: Money,
    /// NOPAT / WACC
    pub nopat_epv: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_ev_ebit: Option<Multiple>,
    pub wacc_used: Rate,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run an Earnings Power Value valuation (no-growth capitalisation).
///
/// EV = (EBIT * (1 - t) - reinvestment) / WACC. A non-positive WACC or negative
/// sustainable earnings make the method not applicable rather than an error.
pub fn calculate_epv(input: &EpvInput) -> PracticeValuationResult<ComputationOutput<EpvOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.tax_rate < Decimal::ZERO || input.tax_rate >= Decimal::ONE {
        return Err(PracticeValuationError::InvalidInput {
            field: "tax_rate".into(),
            reason: "Tax rate must be in [0, 1)".into(),
        });
    }

    let output = build_epv(input, &mut warnings);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Earnings Power Value (no-growth capitalisation)",
        input,
        warnings,
        elapsed,
        output,
    ))
}

/// Core EPV computation. Degeneracies are reported through `warnings`.
pub fn build_epv(input: &EpvInput, warnings: &mut Vec<String>) -> EpvOutput {
    let nopat = input.ebit * (Decimal::ONE - input.tax_rate);
    let reinvestment = input.reinvestment.amount(input.ebit);
    let sustainable_earnings = nopat - reinvestment;
    let owner_earnings = nopat + input.depreciation_amortization - input.maintenance_capex;

    let mut applicable = true;
    if input.wacc <= Decimal::ZERO {
        warnings.push(format!(
            "EPV not applicable: WACC ({}) must be positive",
            input.wacc
        ));
        applicable = false;
    }
    if sustainable_earnings <= Decimal::ZERO {
        warnings.push(
            "EPV not applicable: sustainable earnings are not positive; use an asset-based valuation"
                .into(),
        );
        applicable = false;
    }

    let capitalise = |earnings: Money| -> Money {
        if applicable {
            safe_div(earnings, input.wacc).unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        }
    };

    let enterprise_value = capitalise(sustainable_earnings);
    let owner_earnings_epv = capitalise(owner_earnings);
    let nopat_epv = capitalise(nopat);
    let equity_value = if applicable {
        enterprise_value + input.cash - input.debt
    } else {
        Decimal::ZERO
    };
    let implied_ev_ebit = if applicable {
        safe_div(enterprise_value, input.ebit)
    } else {
        None
    };

    EpvOutput {
        applicable,
        nopat,
        reinvestment,
        sustainable_earnings,
        owner_earnings,
        enterprise_value,
        equity_value,
        owner_earnings_epv,
        nopat_epv,
        implied_ev_ebit,
        wacc_used: input.wacc,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
