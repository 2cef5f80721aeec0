use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{clamp_dec, safe_div, Money, Rate};

/// Years of history treated as a complete record.
const FULL_HISTORY_YEARS: u32 = 5;

/// Growth profile of a historical series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAnalysis {
    /// Number of observations
    pub periods: usize,
    /// Compound annual growth rate, first to last observation
    pub cagr: Rate,
    /// Year-over-year growth rates
    pub yoy_growth: Vec<Rate>,
    /// Population standard deviation of `yoy_growth`
    pub growth_volatility: Rate,
    /// 1 minus volatility scaled by 5, clamped to [0, 1]
    pub consistency_score: Decimal,
}

/// Completeness and consistency of the historical record, each in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQuality {
    pub completeness: Decimal,
    pub consistency: Decimal,
    pub score: Decimal,
    pub years_of_history: u32,
}

/// Analyse a series ordered oldest first.
///
/// Fewer than two positive observations give a flat trend with zero growth.
pub fn analyze_trend(series: &[Money]) -> TrendAnalysis {
    let yoy_growth: Vec<Rate> = series
        .windows(2)
        .filter_map(|w| safe_div(w[1] - w[0], w[0]).filter(|_| w[0] > Decimal::ZERO))
        .collect();

    let cagr = match (series.first(), series.last()) {
        (Some(&first), Some(&last)) if series.len() >= 2 && first > Decimal::ZERO && last > Decimal::ZERO => {
            let years = (series.len() - 1) as f64;
            let ratio = (last / first).to_f64().unwrap_or(1.0);
            Decimal::try_from(ratio.powf(1.0 / years) - 1.0).unwrap_or(Decimal::ZERO)
        }
        _ => Decimal::ZERO,
    };

    let growth_volatility = population_std_dev(&yoy_growth);
    let consistency_score = if yoy_growth.len() < 2 {
        dec!(0.5)
    } else {
        clamp_dec(Decimal::ONE - growth_volatility * dec!(5), Decimal::ZERO, Decimal::ONE)
    };

    TrendAnalysis {
        periods: series.len(),
        cagr,
        yoy_growth,
        growth_volatility,
        consistency_score,
    }
}

/// Score the historical EBITDA record.
///
/// Completeness is years of history over five; consistency is one minus the
/// coefficient of variation. The score is their average.
pub fn assess_data_quality(historical_ebitda: &[Money]) -> DataQuality {
    let years = historical_ebitda.len() as u32;
    let completeness = clamp_dec(
        Decimal::from(years) / Decimal::from(FULL_HISTORY_YEARS),
        Decimal::ZERO,
        Decimal::ONE,
    );

    let consistency = if historical_ebitda.len() < 2 {
        Decimal::ZERO
    } else {
        let n = Decimal::from(historical_ebitda.len() as u64);
        let mean = historical_ebitda.iter().copied().sum::<Decimal>() / n;
        match safe_div(population_std_dev(historical_ebitda), mean.abs()) {
            Some(cv) if mean > Decimal::ZERO => {
                clamp_dec(Decimal::ONE - cv, Decimal::ZERO, Decimal::ONE)
            }
            _ => Decimal::ZERO,
        }
    };

    DataQuality {
        completeness,
        consistency,
        score: (completeness + consistency) / dec!(2),
        years_of_history: years,
    }
}

fn population_std_dev(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    let n = Decimal::from(values.len() as u64);
    let mean = values.iter().copied().sum::<Decimal>() / n;
    let variance = values
        .iter()
        .map(|v| (*v - mean) * (*v - mean))
        .sum::<Decimal>()
        / n;
    variance.sqrt().unwrap_or(Decimal::ZERO)
}
