//! Practice-size risk safeguard.
//!
//! Deterministic markdowns, multiple caps and an asset-replacement floor for
//! practices below $1M of revenue, plus the WACC size premium those practices
//! carry.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::PracticeValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::PracticeValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Size class for safeguard purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticeSize {
    /// Revenue below the very-small threshold
    VerySmall,
    /// Revenue below the small threshold
    Small,
    /// No safeguard applies
    Standard,
}

/// Thresholds, caps and discount rates for the safeguard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeguardPolicy {
    pub small_revenue_threshold: Money,
    pub very_small_revenue_threshold: Money,
    pub base_discount_small: Rate,
    pub base_discount_very_small: Rate,
    pub ev_revenue_cap_small: Multiple,
    pub ev_revenue_cap_very_small: Multiple,
    pub ev_ebitda_cap_small: Multiple,
    pub ev_ebitda_cap_very_small: Multiple,
    pub key_person_discount: Rate,
    pub single_location_discount: Rate,
    pub limited_buyer_pool_discount: Rate,
    pub floor_revenue_multiple: Multiple,
    pub floor_ebitda_multiple: Multiple,
    pub wacc_premium_small: Rate,
    pub wacc_premium_very_small: Rate,
    pub wacc_premium_physician: Rate,
}

impl Default for SafeguardPolicy {
    fn default() -> Self {
        SafeguardPolicy {
            small_revenue_threshold: dec!(1000000),
            very_small_revenue_threshold: dec!(500000),
            base_discount_small: dec!(0.15),
            base_discount_very_small: dec!(0.25),
            ev_revenue_cap_small: dec!(1.5),
            ev_revenue_cap_very_small: dec!(1.2),
            ev_ebitda_cap_small: dec!(5.0),
            ev_ebitda_cap_very_small: dec!(4.0),
            key_person_discount: dec!(0.025),
            single_location_discount: dec!(0.05),
            limited_buyer_pool_discount: dec!(0.10),
            floor_revenue_multiple: dec!(0.3),
            floor_ebitda_multiple: dec!(2.5),
            wacc_premium_small: dec!(0.015),
            wacc_premium_very_small: dec!(0.03),
            wacc_premium_physician: dec!(0.01),
        }
    }
}

impl SafeguardPolicy {
    pub fn classify(&self, revenue: Money) -> PracticeSize {
        if revenue < self.very_small_revenue_threshold {
            PracticeSize::VerySmall
        } else if revenue < self.small_revenue_threshold {
            PracticeSize::Small
        } else {
            PracticeSize::Standard
        }
    }
}

/// Input for the safeguard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeguardInput {
    pub revenue: Money,
    pub ebitda: Money,
    /// Raw (pre-safeguard) enterprise value
    pub enterprise_value: Money,
    pub locations: u32,
    #[serde(default)]
    pub physician_dependent: bool,
    #[serde(default)]
    pub policy: SafeguardPolicy,
}

/// One link in the discount chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountStep {
    pub label: String,
    pub rate: Rate,
    pub value_after: Money,
}

/// Discount chain applied to a raw enterprise value and the floor-respecting result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeguardAdjustment {
    pub applies: bool,
    pub practice_size: PracticeSize,
    pub original_value: Money,
    /// Value after EV/Revenue and EV/EBITDA caps
    pub capped_value: Money,
    pub caps_applied: Vec<String>,
    pub discounts: Vec<DiscountStep>,
    /// Product of (1 - rate) over the discount chain
    pub combined_discount_factor: Decimal,
    pub discounted_value: Money,
    /// max(revenue x 0.3, EBITDA x 2.5)
    pub floor_value: Money,
    pub floor_applied: bool,
    pub adjusted_value: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Apply the practice-size safeguard to a raw enterprise value.
pub fn apply_safeguard(
    input: &SafeguardInput,
) -> PracticeValuationResult<ComputationOutput<SafeguardAdjustment>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.revenue <= Decimal::ZERO {
        return Err(PracticeValuationError::InvalidInput {
            field: "revenue".into(),
            reason: "Revenue must be positive".into(),
        });
    }
    if input.locations == 0 {
        return Err(PracticeValuationError::InvalidInput {
            field: "locations".into(),
            reason: "At least one location is required".into(),
        });
    }

    let adjustment = compute_adjustment(input);

    if adjustment.floor_applied {
        warnings.push(format!(
            "Discounted value {} fell below the asset-replacement floor {}; floor used",
            adjustment.discounted_value.round_dp(0),
            adjustment.floor_value.round_dp(0)
        ));
    }
    if input.ebitda <= Decimal::ZERO && adjustment.applies {
        warnings.push(
            "Non-positive EBITDA: consider an asset-based valuation for this practice".into(),
        );
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Practice-size risk safeguard (caps, discount chain, asset floor)",
        input,
        warnings,
        elapsed,
        adjustment,
    ))
}

/// Core safeguard computation without the envelope.
pub fn compute_adjustment(input: &SafeguardInput) -> SafeguardAdjustment {
    let policy = &input.policy;
    let size = policy.classify(input.revenue);

    if size == PracticeSize::Standard {
        return SafeguardAdjustment {
            applies: false,
            practice_size: size,
            original_value: input.enterprise_value,
            capped_value: input.enterprise_value,
            caps_applied: Vec::new(),
            discounts: Vec::new(),
            combined_discount_factor: Decimal::ONE,
            discounted_value: input.enterprise_value,
            floor_value: Decimal::ZERO,
            floor_applied: false,
            adjusted_value: input.enterprise_value,
        };
    }

    let very_small = size == PracticeSize::VerySmall;
    let (revenue_cap, ebitda_cap, base_discount) = if very_small {
        (
            policy.ev_revenue_cap_very_small,
            policy.ev_ebitda_cap_very_small,
            policy.base_discount_very_small,
        )
    } else {
        (
            policy.ev_revenue_cap_small,
            policy.ev_ebitda_cap_small,
            policy.base_discount_small,
        )
    };

    // --- Multiple caps ---
    let mut capped = input.enterprise_value;
    let mut caps_applied = Vec::new();
    let revenue_ceiling = input.revenue * revenue_cap;
    if capped > revenue_ceiling {
        caps_applied.push(format!("EV/Revenue capped at {revenue_cap}x"));
        capped = revenue_ceiling;
    }
    if input.ebitda > Decimal::ZERO {
        let ebitda_ceiling = input.ebitda * ebitda_cap;
        if capped > ebitda_ceiling {
            caps_applied.push(format!("EV/EBITDA capped at {ebitda_cap}x"));
            capped = ebitda_ceiling;
        }
    }

    // --- Discount chain ---
    let mut chain: Vec<(&str, Rate)> = vec![("Small-practice base discount", base_discount)];
    if input.physician_dependent {
        chain.push(("Key-person (physician) dependency", policy.key_person_discount));
    }
    if input.locations == 1 {
        chain.push(("Single-location concentration", policy.single_location_discount));
    }
    if very_small {
        chain.push(("Limited buyer pool", policy.limited_buyer_pool_discount));
    }

    let mut value = capped;
    let mut factor = Decimal::ONE;
    let mut discounts = Vec::with_capacity(chain.len());
    for (label, rate) in chain {
        factor *= Decimal::ONE - rate;
        value *= Decimal::ONE - rate;
        discounts.push(DiscountStep {
            label: label.to_string(),
            rate,
            value_after: value,
        });
    }

    // --- Asset-replacement floor ---
    let floor_value = (input.revenue * policy.floor_revenue_multiple)
        .max(input.ebitda * policy.floor_ebitda_multiple);
    let floor_applied = value < floor_value;
    let adjusted_value = value.max(floor_value);

    SafeguardAdjustment {
        applies: true,
        practice_size: size,
        original_value: input.enterprise_value,
        capped_value: capped,
        caps_applied,
        discounts,
        combined_discount_factor: factor,
        discounted_value: value,
        floor_value,
        floor_applied,
        adjusted_value,
    }
}

/// WACC add-on for small and physician-dependent practices.
pub fn size_risk_premium(policy: &SafeguardPolicy, revenue: Money, physician_dependent: bool) -> Rate {
    let size_premium = match policy.classify(revenue) {
        PracticeSize::VerySmall => policy.wacc_premium_very_small,
        PracticeSize::Small => policy.wacc_premium_small,
        PracticeSize::Standard => Decimal::ZERO,
    };
    if physician_dependent {
        size_premium + policy.wacc_premium_physician
    } else {
        size_premium
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn small_input(revenue: Money, ebitda: Money, ev: Money) -> SafeguardInput {
        SafeguardInput {
            revenue,
            ebitda,
            enterprise_value: ev,
            locations: 1,
            physician_dependent: true,
            policy: SafeguardPolicy::default(),
        }
    }

    #[test]
    fn test_standard_practice_untouched() {
        let input = SafeguardInput {
            locations: 3,
            physician_dependent: false,
            ..small_input(dec!(4000000), dec!(800000), dec!(4400000))
        };
        let adj = compute_adjustment(&input);
        assert!(!adj.applies);
        assert_eq!(adj.adjusted_value, dec!(4400000));
        assert!(adj.discounts.is_empty());
    }

    #[test]
    fn test_revenue_multiple_cap_for_small_practice() {
        // 2.5x revenue exceeds the 1.5x small-practice cap
        let input = small_input(dec!(800000), dec!(400000), dec!(2000000));
        let adj = compute_adjustment(&input);
        assert_eq!(adj.practice_size, PracticeSize::Small);
        assert!(adj.capped_value <= dec!(1200000));
        assert!(adj.caps_applied.iter().any(|c| c.contains("EV/Revenue")));
        assert!(adj.adjusted_value <= dec!(1200000));
    }

    #[test]
    fn test_discount_chain_small_physician_single_location() {
        let input = small_input(dec!(900000), dec!(200000), dec!(800000));
        let adj = compute_adjustment(&input);
        // 0.85 * 0.975 * 0.95
        let expected_factor = dec!(0.85) * dec!(0.975) * dec!(0.95);
        assert_eq!(adj.combined_discount_factor, expected_factor);
        assert_eq!(adj.discounts.len(), 3);
        assert_eq!(adj.discounted_value, dec!(800000) * expected_factor);
        assert!(!adj.floor_applied);
    }

    #[test]
    fn test_very_small_floor_wins() {
        // revenue 400K, EBITDA 60K: floor = max(120K, 150K) = 150K
        let input = small_input(dec!(400000), dec!(60000), dec!(200000));
        let adj = compute_adjustment(&input);
        assert_eq!(adj.practice_size, PracticeSize::VerySmall);
        assert_eq!(adj.floor_value, dec!(150000));
        assert_eq!(adj.discounts.len(), 4);
        assert!(adj.floor_applied);
        assert_eq!(adj.adjusted_value, dec!(150000));
    }

    #[test]
    fn test_floor_never_breached() {
        for ev in [dec!(0), dec!(50000), dec!(150000), dec!(300000), dec!(900000)] {
            let adj = compute_adjustment(&small_input(dec!(400000), dec!(60000), ev));
            assert!(adj.adjusted_value >= dec!(150000), "ev={ev}");
        }
    }

    #[test]
    fn test_size_risk_premium() {
        let p = SafeguardPolicy::default();
        assert_eq!(size_risk_premium(&p, dec!(400000), false), dec!(0.03));
        assert_eq!(size_risk_premium(&p, dec!(700000), true), dec!(0.025));
        assert_eq!(size_risk_premium(&p, dec!(5000000), false), Decimal::ZERO);
    }

    #[test]
    fn test_apply_safeguard_rejects_zero_revenue() {
        let input = small_input(Decimal::ZERO, dec!(10000), dec!(100000));
        assert!(apply_safeguard(&input).is_err());
    }

    #[test]
    fn test_apply_safeguard_warns_when_floor_used() {
        let input = small_input(dec!(400000), dec!(60000), dec!(200000));
        let out = apply_safeguard(&input).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("floor")));
    }
}
