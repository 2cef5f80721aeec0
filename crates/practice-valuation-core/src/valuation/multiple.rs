use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::PracticeValuationError;
use crate::types::{clamp_dec, safe_div, with_metadata, Band, ComputationOutput, Money, Multiple, Rate};
use crate::PracticeValuationResult;

use super::benchmarks::{BenchmarkSet, SizeTier};

/// Quality score treated as neutral by the multiple adjustment.
const NEUTRAL_QUALITY: Decimal = dec!(0.5);
/// Multiple adjustment per unit of quality away from neutral.
const QUALITY_SLOPE: Decimal = dec!(0.2);
const MIN_GROWTH_ADJUSTMENT: Rate = dec!(-0.05);
const MAX_GROWTH_ADJUSTMENT: Rate = dec!(0.10);
/// Lowest allowed multiple as a fraction of the band's low edge.
const BAND_FLOOR_FACTOR: Decimal = dec!(0.8);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for a benchmark-multiple valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipleInput {
    pub revenue: Money,
    /// Normalised (adjusted) EBITDA the multiple is applied to
    pub adjusted_ebitda: Money,
    /// Historical data quality in [0, 1]
    pub data_quality: Decimal,
    /// Trend growth (CAGR) of the practice
    pub growth_rate: Rate,
    pub locations: u32,
    #[serde(default)]
    pub benchmarks: BenchmarkSet,
    #[serde(default)]
    pub cash: Money,
    #[serde(default)]
    pub debt: Money,
}

/// Output of the benchmark-multiple valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipleOutput {
    /// False when adjusted EBITDA is not positive
    pub applicable: bool,
    pub size_tier: SizeTier,
    pub benchmark_band: Band,
    /// Band midpoint before adjustments
    pub base_multiple: Multiple,
    pub quality_adjustment: Rate,
    pub growth_adjustment: Rate,
    pub location_factor: Decimal,
    /// Multiple actually applied after adjustments and clamping
    pub applied_multiple: Multiple,
    pub enterprise_value: Money,
    pub equity_value: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_ev_revenue: Option<Multiple>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Value the practice at an adjusted industry EV/EBITDA multiple.
pub fn calculate_multiple_valuation(
    input: &MultipleInput,
) -> PracticeValuationResult<ComputationOutput<MultipleOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.revenue <= Decimal::ZERO {
        return Err(PracticeValuationError::InvalidInput {
            field: "revenue".into(),
            reason: "Revenue must be positive".into(),
        });
    }

    let output = build_multiple_valuation(input, &mut warnings);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Benchmark EV/EBITDA multiple with quality, growth and location adjustments",
        input,
        warnings,
        elapsed,
        output,
    ))
}

/// Core multiple valuation without validation or the envelope.
pub fn build_multiple_valuation(input: &MultipleInput, warnings: &mut Vec<String>) -> MultipleOutput {
    let size_tier = input.benchmarks.size_tier(input.revenue);
    let band = input.benchmarks.ev_ebitda.for_tier(size_tier);
    let base_multiple = band.midpoint();

    let quality_adjustment = (clamp_dec(input.data_quality, Decimal::ZERO, Decimal::ONE)
        - NEUTRAL_QUALITY)
        * QUALITY_SLOPE;
    let growth_adjustment = clamp_dec(input.growth_rate, MIN_GROWTH_ADJUSTMENT, MAX_GROWTH_ADJUSTMENT);
    let location_factor = location_factor(input.locations);

    let unclamped =
        base_multiple * (Decimal::ONE + quality_adjustment + growth_adjustment) * location_factor;
    let applied_multiple = clamp_dec(unclamped, band.low * BAND_FLOOR_FACTOR, band.high);
    if applied_multiple != unclamped {
        warnings.push(format!(
            "Adjusted multiple {}x clamped to {}x for the {size_tier} tier",
            unclamped.round_dp(2),
            applied_multiple.round_dp(2)
        ));
    }

    let applicable = input.adjusted_ebitda > Decimal::ZERO;
    if !applicable {
        warnings.push(
            "Multiple valuation not applicable: adjusted EBITDA is not positive; use an asset-based valuation"
                .into(),
        );
    }

    let enterprise_value = if applicable {
        input.adjusted_ebitda * applied_multiple
    } else {
        Decimal::ZERO
    };
    let implied_ev_revenue = safe_div(enterprise_value, input.revenue).filter(|_| applicable);

    MultipleOutput {
        applicable,
        size_tier,
        benchmark_band: band,
        base_multiple,
        quality_adjustment,
        growth_adjustment,
        location_factor,
        applied_multiple,
        enterprise_value,
        equity_value: if applicable {
            enterprise_value + input.cash - input.debt
        } else {
            Decimal::ZERO
        },
        implied_ev_revenue,
    }
}

/// Markdown for concentrated footprints: one site 0.85, two or three 0.95, more 1.0.
pub fn location_factor(locations: u32) -> Decimal {
    match locations {
        0 | 1 => dec!(0.85),
        2 | 3 => dec!(0.95),
        _ => Decimal::ONE,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_multiple_input() -> MultipleInput {
        MultipleInput {
            revenue: dec!(3000000),
            adjusted_ebitda: dec!(700000),
            data_quality: dec!(0.5),
            growth_rate: Decimal::ZERO,
            locations: 4,
            benchmarks: BenchmarkSet::default(),
            cash: Decimal::ZERO,
            debt: Decimal::ZERO,
        }
    }

    #[test]
    fn test_neutral_inputs_use_band_midpoint() {
        let out = calculate_multiple_valuation(&sample_multiple_input()).unwrap().result;
        assert_eq!(out.size_tier, SizeTier::Medium);
        assert_eq!(out.applied_multiple, dec!(5.75));
        assert_eq!(out.enterprise_value, dec!(4025000));
        assert!(out.applicable);
    }

    #[test]
    fn test_single_location_markdown() {
        let mut input = sample_multiple_input();
        input.locations = 1;
        let out = calculate_multiple_valuation(&input).unwrap().result;
        // 5.75 * 0.85
        assert_eq!(out.applied_multiple, dec!(4.8875));
    }

    #[test]
    fn test_growth_adjustment_bounded() {
        let mut input = sample_multiple_input();
        input.growth_rate = dec!(0.40);
        let out = calculate_multiple_valuation(&input).unwrap().result;
        assert_eq!(out.growth_adjustment, dec!(0.10));
        input.growth_rate = dec!(-0.30);
        let out = calculate_multiple_valuation(&input).unwrap().result;
        assert_eq!(out.growth_adjustment, dec!(-0.05));
    }

    #[test]
    fn test_multiple_clamped_to_band() {
        let mut input = sample_multiple_input();
        input.data_quality = Decimal::ONE;
        input.growth_rate = dec!(0.25);
        let out = calculate_multiple_valuation(&input).unwrap();
        // 5.75 * 1.2 = 6.9 stays inside medium band [4.5, 7.0]
        assert_eq!(out.result.applied_multiple, dec!(6.900));

        let mut input = sample_multiple_input();
        input.benchmarks.ev_ebitda.medium = Band::new(dec!(5.0), dec!(6.0));
        let out = calculate_multiple_valuation(&input).unwrap();
        // 5.5 * 1.2 = 6.6 clamped to the band high
        assert_eq!(out.result.applied_multiple, dec!(6.0));
        assert!(out.warnings.iter().any(|w| w.contains("clamped")));
    }

    #[test]
    fn test_negative_ebitda_not_applicable() {
        let mut input = sample_multiple_input();
        input.adjusted_ebitda = dec!(-50000);
        let out = calculate_multiple_valuation(&input).unwrap().result;
        assert!(!out.applicable);
        assert_eq!(out.enterprise_value, Decimal::ZERO);
        assert!(out.implied_ev_revenue.is_none());
    }
}
