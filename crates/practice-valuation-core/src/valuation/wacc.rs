use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::PracticeValuationError;
use crate::input::RateAssumptions;
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::PracticeValuationResult;

/// Data-quality score at or above which no quality adjustment applies.
const QUALITY_NEUTRAL_SCORE: Decimal = dec!(0.8);
/// Premium per unit of quality shortfall below the neutral score.
const QUALITY_PREMIUM_SLOPE: Decimal = dec!(0.05);

/// Input parameters for the practice WACC build-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaccInput {
    pub rates: RateAssumptions,
    pub tax_rate: Rate,
    /// Number of operating locations; drives the concentration premium
    pub locations: u32,
    /// Historical data quality score in [0, 1]
    pub data_quality: Decimal,
    /// Extra premium from the practice-size safeguard
    #[serde(default)]
    pub size_risk_premium: Rate,
}

/// Output of the WACC calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaccOutput {
    /// Weighted average cost of capital
    pub wacc: Rate,
    /// Cost of equity (CAPM + premiums)
    pub cost_of_equity: Rate,
    /// After-tax cost of debt
    pub after_tax_cost_of_debt: Rate,
    pub capm_return: Rate,
    pub concentration_premium: Rate,
    pub quality_adjustment: Rate,
    pub size_risk_premium: Rate,
    pub debt_weight: Rate,
    pub equity_weight: Rate,
}

/// Calculate the practice WACC.
///
/// Ke = Rf + Beta * MRP + size + specific + concentration + quality + size-risk
/// WACC = Ke * (1 - Wd) + Kd * (1 - t) * Wd
pub fn calculate_wacc(input: &WaccInput) -> PracticeValuationResult<ComputationOutput<WaccOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_wacc_input(input)?;

    let output = build_wacc(input);

    if input.rates.beta > dec!(3.0) {
        warnings.push(format!(
            "High beta ({}): betas above 3.0 are unusual for a service practice",
            input.rates.beta
        ));
    }
    if output.wacc > dec!(0.30) {
        warnings.push(format!(
            "WACC of {} exceeds 30%; valuation will be heavily discounted",
            output.wacc.round_dp(4)
        ));
    }
    if output.quality_adjustment > Decimal::ZERO {
        warnings.push(format!(
            "Quality adjustment of {} added for incomplete or inconsistent history",
            output.quality_adjustment.round_dp(4)
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "WACC via CAPM build-up with concentration and quality premia",
        input,
        warnings,
        elapsed,
        output,
    ))
}

/// Core WACC computation without validation or the envelope.
pub fn build_wacc(input: &WaccInput) -> WaccOutput {
    let rates = &input.rates;
    let capm_return = rates.risk_free_rate + rates.beta * rates.market_risk_premium;
    let concentration_premium = concentration_premium(input.locations);
    let quality_adjustment = quality_adjustment(input.data_quality);

    let cost_of_equity = capm_return
        + rates.size_premium
        + rates.specific_premium
        + concentration_premium
        + quality_adjustment
        + input.size_risk_premium;
    let after_tax_cost_of_debt = rates.cost_of_debt * (Decimal::ONE - input.tax_rate);
    let debt_weight = rates.target_debt_weight;
    let equity_weight = Decimal::ONE - debt_weight;
    let wacc = cost_of_equity * equity_weight + after_tax_cost_of_debt * debt_weight;

    WaccOutput {
        wacc,
        cost_of_equity,
        after_tax_cost_of_debt,
        capm_return,
        concentration_premium,
        quality_adjustment,
        size_risk_premium: input.size_risk_premium,
        debt_weight,
        equity_weight,
    }
}

/// Location-count concentration premium: one site 2%, two or three 1%, more 0%.
pub fn concentration_premium(locations: u32) -> Rate {
    match locations {
        0 | 1 => dec!(0.02),
        2 | 3 => dec!(0.01),
        _ => Decimal::ZERO,
    }
}

/// Premium for a weak historical record: `max(0, 0.8 - quality) * 0.05`.
pub fn quality_adjustment(data_quality: Decimal) -> Rate {
    (QUALITY_NEUTRAL_SCORE - data_quality).max(Decimal::ZERO) * QUALITY_PREMIUM_SLOPE
}

fn validate_wacc_input(input: &WaccInput) -> PracticeValuationResult<()> {
    let rates = &input.rates;
    if rates.risk_free_rate < Decimal::ZERO {
        return Err(PracticeValuationError::InvalidInput {
            field: "risk_free_rate".into(),
            reason: "Risk-free rate cannot be negative".into(),
        });
    }
    if rates.market_risk_premium < Decimal::ZERO {
        return Err(PracticeValuationError::InvalidInput {
            field: "market_risk_premium".into(),
            reason: "Market risk premium cannot be negative".into(),
        });
    }
    if rates.beta <= Decimal::ZERO {
        return Err(PracticeValuationError::InvalidInput {
            field: "beta".into(),
            reason: "Beta must be positive".into(),
        });
    }
    if rates.cost_of_debt < Decimal::ZERO {
        return Err(PracticeValuationError::InvalidInput {
            field: "cost_of_debt".into(),
            reason: "Cost of debt cannot be negative".into(),
        });
    }
    if input.tax_rate < Decimal::ZERO || input.tax_rate >= Decimal::ONE {
        return Err(PracticeValuationError::InvalidInput {
            field: "tax_rate".into(),
            reason: "Tax rate must be in [0, 1)".into(),
        });
    }
    if rates.target_debt_weight < Decimal::ZERO || rates.target_debt_weight >= Decimal::ONE {
        return Err(PracticeValuationError::InvalidInput {
            field: "target_debt_weight".into(),
            reason: "Debt weight must be in [0, 1)".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
