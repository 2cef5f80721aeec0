use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{Band, Money};

/// Practice size tier used to pick benchmark bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeTier {
    Small,
    Medium,
    Large,
}

impl std::fmt::Display for SizeTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizeTier::Small => write!(f, "small"),
            SizeTier::Medium => write!(f, "medium"),
            SizeTier::Large => write!(f, "large"),
        }
    }
}

/// A band per size tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TieredBand {
    pub small: Band,
    pub medium: Band,
    pub large: Band,
}

impl TieredBand {
    pub fn for_tier(&self, tier: SizeTier) -> Band {
        match tier {
            SizeTier::Small => self.small,
            SizeTier::Medium => self.medium,
            SizeTier::Large => self.large,
        }
    }
}

/// Industry benchmark tables. Substitute a different set per industry or region.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkSet {
    pub name: String,
    /// Revenue below which a practice is `Small`
    pub small_revenue_ceiling: Money,
    /// Revenue below which a practice is `Medium`
    pub medium_revenue_ceiling: Money,
    /// Comparable-transaction EV/EBITDA bands
    pub ev_ebitda: TieredBand,
    /// Comparable-transaction EV/Revenue bands
    pub ev_revenue: TieredBand,
    /// Expected EBITDA margin when the practice depends on a key physician
    pub ebitda_margin_physician: Band,
    /// Expected EBITDA margin for provider-diversified practices
    pub ebitda_margin_standard: Band,
    /// Expected gross margin when provider pay sits in cost of services
    pub gross_margin_physician: Band,
    pub gross_margin_standard: Band,
    pub revenue_per_location: Band,
    pub ebitda_per_location: Band,
}

impl BenchmarkSet {
    pub fn size_tier(&self, revenue: Money) -> SizeTier {
        if revenue < self.small_revenue_ceiling {
            SizeTier::Small
        } else if revenue < self.medium_revenue_ceiling {
            SizeTier::Medium
        } else {
            SizeTier::Large
        }
    }

    pub fn ebitda_margin_band(&self, physician_dependent: bool) -> Band {
        if physician_dependent {
            self.ebitda_margin_physician
        } else {
            self.ebitda_margin_standard
        }
    }

    pub fn gross_margin_band(&self, physician_dependent: bool) -> Band {
        if physician_dependent {
            self.gross_margin_physician
        } else {
            self.gross_margin_standard
        }
    }

    /// US medical-aesthetics benchmark set.
    pub fn medical_aesthetics() -> Self {
        BenchmarkSet {
            name: "US medical aesthetics".into(),
            small_revenue_ceiling: dec!(2000000),
            medium_revenue_ceiling: dec!(10000000),
            ev_ebitda: TieredBand {
                small: Band::new(dec!(3.0), dec!(5.0)),
                medium: Band::new(dec!(4.5), dec!(7.0)),
                large: Band::new(dec!(6.0), dec!(10.0)),
            },
            ev_revenue: TieredBand {
                small: Band::new(dec!(0.5), dec!(1.2)),
                medium: Band::new(dec!(0.8), dec!(1.8)),
                large: Band::new(dec!(1.2), dec!(3.0)),
            },
            ebitda_margin_physician: Band::new(dec!(0.12), dec!(0.25)),
            ebitda_margin_standard: Band::new(dec!(0.15), dec!(0.30)),
            gross_margin_physician: Band::new(dec!(0.45), dec!(0.70)),
            gross_margin_standard: Band::new(dec!(0.55), dec!(0.80)),
            revenue_per_location: Band::new(dec!(800000), dec!(4000000)),
            ebitda_per_location: Band::new(dec!(120000), dec!(1200000)),
        }
    }
}

impl Default for BenchmarkSet {
    fn default() -> Self {
        Self::medical_aesthetics()
    }
}
