use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::PracticeValuationError;
use crate::input::{SynergyAssumptions, ValuationInput};
use crate::types::{clamp_dec, safe_div, with_metadata, ComputationOutput, Money, Rate};
use crate::PracticeValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Cap, moat premium and phase-in ramp for operational synergies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynergyPolicy {
    /// Maximum total synergy as a fraction of EBITDA
    pub total_cap: Rate,
    /// Premium at a moat score of 1.0
    pub moat_premium_cap: Rate,
    /// Fraction of the run rate realised in each year; the last entry repeats
    pub phase_in: Vec<Rate>,
}

impl Default for SynergyPolicy {
    fn default() -> Self {
        SynergyPolicy {
            total_cap: dec!(0.15),
            moat_premium_cap: dec!(0.03),
            phase_in: vec![dec!(0.30), dec!(0.65), dec!(1.0)],
        }
    }
}

impl SynergyPolicy {
    /// Realisation fraction for a 1-based year.
    pub fn realization(&self, year: u32) -> Rate {
        let idx = year.saturating_sub(1) as usize;
        self.phase_in
            .get(idx)
            .or_else(|| self.phase_in.last())
            .copied()
            .unwrap_or(Decimal::ONE)
    }
}

/// Input for the synergy calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynergyInput {
    /// Normalised EBITDA the synergy fractions apply to
    pub base_ebitda: Money,
    pub synergies: SynergyAssumptions,
    #[serde(default)]
    pub policy: SynergyPolicy,
    /// Discount rate for the phased stream
    pub wacc: Rate,
    /// Years of explicit phasing before the perpetuity tail
    #[serde(default = "default_years")]
    pub years: u32,
}

fn default_years() -> u32 {
    5
}

/// One synergy category expressed in currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynergyCategory {
    pub name: String,
    pub pct_of_ebitda: Rate,
    pub amount: Money,
}

/// Uplift realised in one year of the phase-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasedUplift {
    pub year: u32,
    pub realization: Rate,
    pub uplift: Money,
    pub present_value: Money,
}

/// Output of the synergy calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynergyOutput {
    pub categories: Vec<SynergyCategory>,
    pub raw_total_pct: Rate,
    pub capped_total_pct: Rate,
    pub cap_applied: bool,
    pub moat_premium_pct: Rate,
    /// Capped categories plus moat premium
    pub total_pct: Rate,
    /// Full run-rate EBITDA uplift
    pub run_rate_uplift: Money,
    pub phased: Vec<PhasedUplift>,
    pub pv_phased: Money,
    /// Run rate capitalised at WACC after the explicit years, discounted
    pub pv_terminal: Money,
    pub present_value: Money,
}

/// One step of the EBITDA bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStep {
    pub label: String,
    pub amount: Money,
    pub cumulative: Money,
}

/// Reported EBITDA to adjusted EBITDA, in waterfall order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EbitdaBridge {
    pub reported_ebitda: Money,
    pub steps: Vec<BridgeStep>,
    pub adjusted_ebitda: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Convert qualitative synergy assumptions into a phased EBITDA uplift.
pub fn calculate_synergies(
    input: &SynergyInput,
) -> PracticeValuationResult<ComputationOutput<SynergyOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    for (name, pct) in input.synergies.categories() {
        if pct < Decimal::ZERO {
            return Err(PracticeValuationError::InvalidInput {
                field: name.into(),
                reason: "Synergy fractions cannot be negative".into(),
            });
        }
    }
    if input.years == 0 {
        return Err(PracticeValuationError::InvalidInput {
            field: "years".into(),
            reason: "At least one phase-in year is required".into(),
        });
    }

    let output = build_synergies(input, &mut warnings);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Capped synergy run rate with moat premium, phased in and discounted",
        input,
        warnings,
        elapsed,
        output,
    ))
}

/// Core synergy computation without validation or the envelope.
pub fn build_synergies(input: &SynergyInput, warnings: &mut Vec<String>) -> SynergyOutput {
    let policy = &input.policy;
    let categories: Vec<SynergyCategory> = input
        .synergies
        .categories()
        .iter()
        .map(|(name, pct)| SynergyCategory {
            name: (*name).to_string(),
            pct_of_ebitda: *pct,
            amount: input.base_ebitda * pct,
        })
        .collect();

    let raw_total_pct = input.synergies.raw_total();
    let capped_total_pct = raw_total_pct.min(policy.total_cap);
    let cap_applied = capped_total_pct < raw_total_pct;
    if cap_applied {
        warnings.push(format!(
            "Synergy assumptions total {:.1}% of EBITDA; capped at {:.1}%",
            raw_total_pct * dec!(100),
            policy.total_cap * dec!(100)
        ));
    }

    let moat = clamp_dec(input.synergies.moat_score, Decimal::ZERO, Decimal::ONE);
    let moat_premium_pct = moat * policy.moat_premium_cap;
    let total_pct = capped_total_pct + moat_premium_pct;

    // Synergies on a loss-making base are not meaningful.
    let run_rate_uplift = if input.base_ebitda > Decimal::ZERO {
        input.base_ebitda * total_pct
    } else {
        if total_pct > Decimal::ZERO {
            warnings.push("Base EBITDA is not positive; synergy uplift set to zero".into());
        }
        Decimal::ZERO
    };

    let discount_ok = input.wacc > Decimal::ZERO;
    if !discount_ok {
        warnings.push("WACC is not positive; synergy stream left undiscounted".into());
    }
    let discount = |year: u32| -> Decimal {
        if discount_ok {
            Decimal::ONE / (Decimal::ONE + input.wacc).powi(i64::from(year))
        } else {
            Decimal::ONE
        }
    };

    let phased: Vec<PhasedUplift> = (1..=input.years)
        .map(|year| {
            let realization = policy.realization(year);
            let uplift = run_rate_uplift * realization;
            PhasedUplift {
                year,
                realization,
                uplift,
                present_value: uplift * discount(year),
            }
        })
        .collect();
    let pv_phased: Money = phased.iter().map(|p| p.present_value).sum();

    let pv_terminal = if discount_ok {
        safe_div(run_rate_uplift, input.wacc).unwrap_or(Decimal::ZERO) * discount(input.years)
    } else {
        Decimal::ZERO
    };

    SynergyOutput {
        categories,
        raw_total_pct,
        capped_total_pct,
        cap_applied,
        moat_premium_pct,
        total_pct,
        run_rate_uplift,
        phased,
        pv_phased,
        pv_terminal,
        present_value: pv_phased + pv_terminal,
    }
}

/// Reported EBITDA, then each normalisation item, then the synergy run rate.
pub fn build_ebitda_bridge(input: &ValuationInput, synergy_run_rate: Money) -> EbitdaBridge {
    let reported_ebitda = input.ebitda();
    let mut cumulative = reported_ebitda;
    let mut steps = Vec::with_capacity(input.normalization_adjustments.len() + 1);

    for adj in &input.normalization_adjustments {
        cumulative += adj.amount;
        steps.push(BridgeStep {
            label: adj.label.clone(),
            amount: adj.amount,
            cumulative,
        });
    }
    if !synergy_run_rate.is_zero() {
        cumulative += synergy_run_rate;
        steps.push(BridgeStep {
            label: "Synergy run rate".into(),
            amount: synergy_run_rate,
            cumulative,
        });
    }

    EbitdaBridge {
        reported_ebitda,
        steps,
        adjusted_ebitda: cumulative,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::tests::sample_input;

    fn sample_synergy_input() -> SynergyInput {
        SynergyInput {
            base_ebitda: dec!(1000000),
            synergies: SynergyAssumptions {
                operational_efficiency: dec!(0.04),
                scale_economies: dec!(0.02),
                marketing_optimization: dec!(0.02),
                technology: dec!(0.01),
                cross_selling: dec!(0.01),
                moat_score: dec!(0.5),
            },
            policy: SynergyPolicy::default(),
            wacc: dec!(0.12),
            years: 5,
        }
    }

    #[test]
    fn test_run_rate_with_moat() {
        let out = calculate_synergies(&sample_synergy_input()).unwrap().result;
        assert_eq!(out.raw_total_pct, dec!(0.10));
        assert!(!out.cap_applied);
        assert_eq!(out.moat_premium_pct, dec!(0.015));
        assert_eq!(out.run_rate_uplift, dec!(115000));
    }

    #[test]
    fn test_cap_applied() {
        let mut input = sample_synergy_input();
        input.synergies.operational_efficiency = dec!(0.12);
        input.synergies.moat_score = Decimal::ZERO;
        let out = calculate_synergies(&input).unwrap();
        assert!(out.result.cap_applied);
        assert_eq!(out.result.total_pct, dec!(0.15));
        assert!(out.warnings.iter().any(|w| w.contains("capped")));
    }

    #[test]
    fn test_moat_premium_bounded() {
        let mut input = sample_synergy_input();
        input.synergies.moat_score = dec!(4);
        let out = calculate_synergies(&input).unwrap().result;
        assert_eq!(out.moat_premium_pct, dec!(0.03));
    }

    #[test]
    fn test_phase_in_ramp() {
        let out = calculate_synergies(&sample_synergy_input()).unwrap().result;
        let realizations: Vec<Rate> = out.phased.iter().map(|p| p.realization).collect();
        assert_eq!(
            realizations,
            vec![dec!(0.30), dec!(0.65), dec!(1.0), dec!(1.0), dec!(1.0)]
        );
        assert_eq!(out.phased[0].uplift, dec!(34500));
        assert!(out.pv_terminal > out.pv_phased);
        assert_eq!(out.present_value, out.pv_phased + out.pv_terminal);
    }

    #[test]
    fn test_negative_category_rejected() {
        let mut input = sample_synergy_input();
        input.synergies.technology = dec!(-0.01);
        assert!(calculate_synergies(&input).is_err());
    }

    #[test]
    fn test_ebitda_bridge_steps() {
        let input = sample_input();
        let bridge = build_ebitda_bridge(&input, dec!(50000));
        assert_eq!(bridge.reported_ebitda, dec!(704000));
        assert_eq!(bridge.steps.len(), 2);
        assert_eq!(bridge.steps[0].cumulative, dec!(744000));
        assert_eq!(bridge.adjusted_ebitda, dec!(794000));
    }
}
