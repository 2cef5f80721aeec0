use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::types::*;
use crate::PracticeValuationResult;

use super::epv::{build_epv, calculate_epv, EpvInput};

/// WACC step either side of the base case.
const WACC_STEP: Rate = dec!(0.01);
/// Reinvestment scale factors swept across the columns.
const REINVESTMENT_FACTORS: [Decimal; 3] = [dec!(0.5), dec!(1.0), dec!(1.5)];

/// 3x3 EPV grid of WACC (rows) against reinvestment (columns)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpvSensitivityMatrix {
    pub wacc_values: Vec<Rate>,
    pub reinvestment_factors: Vec<Decimal>,
    /// Reinvestment in currency for each column
    pub reinvestment_amounts: Vec<Money>,
    /// matrix[i][j] = EPV enterprise value at wacc_values[i], reinvestment_factors[j]
    pub matrix: Vec<Vec<Money>>,
    pub base_case_value: Money,
    /// Position of the base case in the matrix (row, col)
    pub base_case_position: (usize, usize),
}

/// Evaluate the EPV WACC x reinvestment grid around `input`.
pub fn calculate_epv_sensitivity(
    input: &EpvInput,
) -> PracticeValuationResult<ComputationOutput<EpvSensitivityMatrix>> {
    let start = Instant::now();
    // Validates the base case.
    let base = calculate_epv(input)?;
    let mut warnings = base.warnings;

    let matrix = build_epv_sensitivity(input, &mut warnings);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "EPV sensitivity: WACC +/- 1pt against reinvestment x0.5/x1/x1.5",
        input,
        warnings,
        elapsed,
        matrix,
    ))
}

/// Grid computation without the envelope. Inapplicable cells hold zero.
pub fn build_epv_sensitivity(input: &EpvInput, warnings: &mut Vec<String>) -> EpvSensitivityMatrix {
    let wacc_values = vec![input.wacc - WACC_STEP, input.wacc, input.wacc + WACC_STEP];
    let mut skipped = 0usize;

    let matrix: Vec<Vec<Money>> = wacc_values
        .iter()
        .map(|wacc| {
            REINVESTMENT_FACTORS
                .iter()
                .map(|factor| {
                    let cell = EpvInput {
                        wacc: *wacc,
                        reinvestment: input.reinvestment.scaled(*factor),
                        ..input.clone()
                    };
                    let mut cell_warnings = Vec::new();
                    let out = build_epv(&cell, &mut cell_warnings);
                    if !out.applicable {
                        skipped += 1;
                    }
                    out.enterprise_value
                })
                .collect()
        })
        .collect();

    if skipped > 0 {
        warnings.push(format!(
            "{skipped} sensitivity cell(s) not applicable and reported as zero"
        ));
    }

    let reinvestment_amounts = REINVESTMENT_FACTORS
        .iter()
        .map(|f| input.reinvestment.scaled(*f).amount(input.ebit))
        .collect();

    EpvSensitivityMatrix {
        base_case_value: matrix[1][1],
        wacc_values,
        reinvestment_factors: REINVESTMENT_FACTORS.to_vec(),
        reinvestment_amounts,
        matrix,
        base_case_position: (1, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::epv::Reinvestment;

    fn base_input() -> EpvInput {
        EpvInput {
            ebit: dec!(1000000),
            tax_rate: dec!(0.25),
            reinvestment: Reinvestment::Fixed(dec!(100000)),
            wacc: dec!(0.12),
            depreciation_amortization: Decimal::ZERO,
            maintenance_capex: Decimal::ZERO,
            cash: Decimal::ZERO,
            debt: Decimal::ZERO,
        }
    }

    #[test]
    fn test_matrix_shape_and_base_case() {
        let out = calculate_epv_sensitivity(&base_input()).unwrap().result;
        assert_eq!(out.matrix.len(), 3);
        assert!(out.matrix.iter().all(|row| row.len() == 3));
        assert_eq!(out.wacc_values, vec![dec!(0.11), dec!(0.12), dec!(0.13)]);
        assert_eq!(
            out.reinvestment_amounts,
            vec![dec!(50000), dec!(100000), dec!(150000)]
        );
        assert!((out.base_case_value - dec!(5416666.67)).abs() < dec!(0.01));
    }

    #[test]
    fn test_matrix_monotone() {
        let m = calculate_epv_sensitivity(&base_input()).unwrap().result.matrix;
        for j in 0..3 {
            assert!(m[0][j] > m[1][j] && m[1][j] > m[2][j]);
        }
        for row in &m {
            assert!(row[0] > row[1] && row[1] > row[2]);
        }
    }

    #[test]
    fn test_low_wacc_cell_not_applicable() {
        let mut input = base_input();
        input.wacc = dec!(0.01);
        let out = calculate_epv_sensitivity(&input).unwrap();
        assert_eq!(out.result.matrix[0][0], Decimal::ZERO);
        assert!(out.warnings.iter().any(|w| w.contains("not applicable")));
    }
}
