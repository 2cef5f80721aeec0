use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{safe_div, Rate};

/// Named method-weighting preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingPolicy {
    /// EPV-heavy; the fallback whenever any profile is weak
    Conservative,
    Balanced,
    /// DCF-heavy; requires strong quality, growth and synergy profiles
    GrowthBiased,
}

impl WeightingPolicy {
    pub fn weights(&self) -> MethodWeights {
        match self {
            WeightingPolicy::Conservative => MethodWeights::new(dec!(0.50), dec!(0.25), dec!(0.25)),
            WeightingPolicy::Balanced => MethodWeights::new(dec!(0.35), dec!(0.35), dec!(0.30)),
            WeightingPolicy::GrowthBiased => MethodWeights::new(dec!(0.20), dec!(0.50), dec!(0.30)),
        }
    }
}

impl std::fmt::Display for WeightingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeightingPolicy::Conservative => write!(f, "conservative"),
            WeightingPolicy::Balanced => write!(f, "balanced"),
            WeightingPolicy::GrowthBiased => write!(f, "growth_biased"),
        }
    }
}

impl std::str::FromStr for WeightingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "conservative" => Ok(WeightingPolicy::Conservative),
            "balanced" => Ok(WeightingPolicy::Balanced),
            "growth_biased" | "growth" => Ok(WeightingPolicy::GrowthBiased),
            other => Err(format!(
                "unknown weighting policy '{other}' (expected conservative, balanced or growth_biased)"
            )),
        }
    }
}

/// Weights on EPV, DCF and multiple values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodWeights {
    pub epv: Decimal,
    pub dcf: Decimal,
    pub multiple: Decimal,
}

impl MethodWeights {
    pub const fn new(epv: Decimal, dcf: Decimal, multiple: Decimal) -> Self {
        MethodWeights { epv, dcf, multiple }
    }

    pub fn total(&self) -> Decimal {
        self.epv + self.dcf + self.multiple
    }

    /// Zero the weights of inapplicable methods and rescale the rest to sum to 1.
    /// All-zero when nothing is applicable.
    pub fn renormalized(&self, epv: bool, dcf: bool, multiple: bool) -> MethodWeights {
        let keep = |w: Decimal, on: bool| if on { w } else { Decimal::ZERO };
        let kept = MethodWeights::new(keep(self.epv, epv), keep(self.dcf, dcf), keep(self.multiple, multiple));
        let total = kept.total();
        let scale = |w: Decimal| safe_div(w, total).unwrap_or(Decimal::ZERO);
        MethodWeights::new(scale(kept.epv), scale(kept.dcf), scale(kept.multiple))
    }
}

/// Three-level rating of one selection criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    Strong,
    Adequate,
    Weak,
}

/// Marks behind the policy choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyMarks {
    pub data_quality: Mark,
    pub growth: Mark,
    pub synergy: Mark,
}

pub fn mark_data_quality(score: Decimal) -> Mark {
    if score >= dec!(0.8) {
        Mark::Strong
    } else if score >= dec!(0.6) {
        Mark::Adequate
    } else {
        Mark::Weak
    }
}

pub fn mark_growth(trend_growth: Rate) -> Mark {
    if trend_growth >= dec!(0.10) {
        Mark::Strong
    } else if trend_growth >= dec!(0.02) {
        Mark::Adequate
    } else {
        Mark::Weak
    }
}

/// Strong inside 5%-15% of EBITDA, adequate below 5%, weak when the raw total
/// breaches the cap.
pub fn mark_synergy(raw_total: Rate, cap: Rate) -> Mark {
    if raw_total > cap {
        Mark::Weak
    } else if raw_total >= dec!(0.05) {
        Mark::Strong
    } else {
        Mark::Adequate
    }
}

/// Growth-biased only when every mark is strong; conservative when any is weak.
pub fn select_policy(marks: &PolicyMarks) -> WeightingPolicy {
    let all = [marks.data_quality, marks.growth, marks.synergy];
    if all.iter().all(|m| *m == Mark::Strong) {
        WeightingPolicy::GrowthBiased
    } else if all.iter().any(|m| *m == Mark::Weak) {
        WeightingPolicy::Conservative
    } else {
        WeightingPolicy::Balanced
    }
}
