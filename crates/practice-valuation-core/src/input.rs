use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{Money, Rate};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Maintenance capital expenditure, either scaled to revenue or fixed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum MaintenanceCapex {
    /// Fraction of revenue (0.03 = 3%)
    PctOfRevenue(Rate),
    /// Absolute annual amount
    Fixed(Money),
}

impl MaintenanceCapex {
    /// Annual capex amount for the given revenue.
    pub fn amount(&self, revenue: Money) -> Money {
        match self {
            MaintenanceCapex::PctOfRevenue(pct) => revenue * pct,
            MaintenanceCapex::Fixed(amount) => *amount,
        }
    }
}

impl Default for MaintenanceCapex {
    fn default() -> Self {
        MaintenanceCapex::PctOfRevenue(dec!(0.03))
    }
}

/// Discount-rate building blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateAssumptions {
    /// Risk-free rate (e.g. 10-year treasury yield)
    pub risk_free_rate: Rate,
    /// Market (equity) risk premium
    pub market_risk_premium: Rate,
    /// Levered beta
    pub beta: Decimal,
    /// Small-company size premium
    #[serde(default)]
    pub size_premium: Rate,
    /// Company-specific risk premium
    #[serde(default)]
    pub specific_premium: Rate,
    /// Pre-tax cost of debt
    pub cost_of_debt: Rate,
    /// Target weight of debt in the capital structure
    #[serde(default)]
    pub target_debt_weight: Rate,
}

impl Default for RateAssumptions {
    fn default() -> Self {
        RateAssumptions {
            risk_free_rate: dec!(0.043),
            market_risk_premium: dec!(0.055),
            beta: dec!(1.2),
            size_premium: dec!(0.03),
            specific_premium: dec!(0.02),
            cost_of_debt: dec!(0.08),
            target_debt_weight: dec!(0.20),
        }
    }
}

/// Operational improvement assumptions, each a fraction of EBITDA.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynergyAssumptions {
    #[serde(default)]
    pub operational_efficiency: Rate,
    #[serde(default)]
    pub scale_economies: Rate,
    #[serde(default)]
    pub marketing_optimization: Rate,
    #[serde(default)]
    pub technology: Rate,
    #[serde(default)]
    pub cross_selling: Rate,
    /// Franchise quality / competitive moat score in [0, 1]
    #[serde(default)]
    pub moat_score: Decimal,
}

impl SynergyAssumptions {
    /// Named categories in reporting order.
    pub fn categories(&self) -> [(&'static str, Rate); 5] {
        [
            ("operational_efficiency", self.operational_efficiency),
            ("scale_economies", self.scale_economies),
            ("marketing_optimization", self.marketing_optimization),
            ("technology", self.technology),
            ("cross_selling", self.cross_selling),
        ]
    }

    pub fn raw_total(&self) -> Rate {
        self.categories().iter().map(|(_, v)| *v).sum()
    }
}

/// A one-off or owner-related item added back to (or deducted from) reported EBITDA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationAdjustment {
    pub label: String,
    /// Positive for add-backs, negative for deductions
    pub amount: Money,
}

/// Validated financial record for one practice. Immutable for one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practice_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valuation_date: Option<NaiveDate>,
    /// Trailing-twelve-month revenue
    pub revenue: Money,
    /// Reported EBITDA margin
    pub ebitda_margin: Rate,
    /// EBIT margin; derived from EBITDA less D&A when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebit_margin: Option<Rate>,
    /// Gross margin (revenue less cost of services), used for plausibility only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gross_margin: Option<Rate>,
    /// Annual depreciation & amortisation
    #[serde(default)]
    pub depreciation_amortization: Money,
    #[serde(default)]
    pub maintenance_capex: MaintenanceCapex,
    pub tax_rate: Rate,
    #[serde(default)]
    pub cash: Money,
    /// Interest-bearing debt
    #[serde(default)]
    pub debt: Money,
    pub locations: u32,
    #[serde(default)]
    pub physician_dependent: bool,
    /// Historical EBITDA, oldest first
    #[serde(default)]
    pub historical_ebitda: Vec<Money>,
    /// Historical revenue, oldest first
    #[serde(default)]
    pub historical_revenue: Vec<Money>,
    #[serde(default)]
    pub rates: RateAssumptions,
    #[serde(default)]
    pub synergies: SynergyAssumptions,
    #[serde(default)]
    pub normalization_adjustments: Vec<NormalizationAdjustment>,
}

impl ValuationInput {
    /// Reported EBITDA in currency.
    pub fn ebitda(&self) -> Money {
        self.revenue * self.ebitda_margin
    }

    /// EBIT in currency, from the explicit margin or EBITDA less D&A.
    pub fn ebit(&self) -> Money {
        match self.ebit_margin {
            Some(margin) => self.revenue * margin,
            None => self.ebitda() - self.depreciation_amortization,
        }
    }

    /// Reported EBITDA plus normalization adjustments.
    pub fn normalized_ebitda(&self) -> Money {
        self.ebitda()
            + self
                .normalization_adjustments
                .iter()
                .map(|a| a.amount)
                .sum::<Money>()
    }

    pub fn maintenance_capex_amount(&self) -> Money {
        self.maintenance_capex.amount(self.revenue)
    }

    /// Cash less debt; added to enterprise value to reach equity value.
    pub fn net_cash(&self) -> Money {
        self.cash - self.debt
    }

    /// Revenue series for trend analysis, falling back to the current year alone.
    pub fn revenue_series(&self) -> Vec<Money> {
        if self.historical_revenue.is_empty() {
            vec![self.revenue]
        } else {
            self.historical_revenue.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
