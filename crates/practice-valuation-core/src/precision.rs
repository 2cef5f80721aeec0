//! Precision-safe f64 arithmetic for the stochastic path.
//!
//! Deterministic valuations run on `Decimal`. The Monte-Carlo loops run on
//! `f64` for throughput, and the helpers here bound the relative error on
//! currency values that reach 10^8 and beyond. Operands above
//! [`LARGE_VALUE_THRESHOLD`] are split into a binary mantissa and exponent
//! (multiply/divide) or evaluated in the log domain (compound/present value).
//!
//! Nothing in this module panics or returns an error: degenerate inputs yield
//! `f64::NAN`, and [`check_precision`] reports loss as a non-fatal warning.

use serde::{Deserialize, Serialize};

/// Magnitude above which the mantissa/exponent and log-domain paths are used.
pub const LARGE_VALUE_THRESHOLD: f64 = 1e8;

/// Relative magnitude below which an addend is treated as negligible.
const NEGLIGIBLE_RATIO: f64 = 1e-15;

/// Relative loss above which a precision warning is raised on large values.
const PRECISION_LOSS_TOLERANCE: f64 = 1e-12;

/// Result of comparing a value against a recomputation of itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecisionCheck {
    pub original: f64,
    pub recomputed: f64,
    pub relative_loss: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

fn is_large(x: f64) -> bool {
    x.abs() > LARGE_VALUE_THRESHOLD
}

/// Split a finite non-zero value into `(mantissa, exponent)` with
/// `value == mantissa * 2^exponent` and `|mantissa|` in `[1, 2)`.
fn split(value: f64) -> (f64, i32) {
    let exponent = value.abs().log2().floor() as i32;
    let mantissa = value / 2f64.powi(exponent);
    // log2 can land one off at exact powers of two
    if mantissa.abs() >= 2.0 {
        (mantissa / 2.0, exponent + 1)
    } else if mantissa.abs() < 1.0 {
        (mantissa * 2.0, exponent - 1)
    } else {
        (mantissa, exponent)
    }
}

fn scale(mantissa: f64, exponent: i32) -> f64 {
    // Split the scaling so intermediate powers never overflow on their own.
    let half = exponent / 2;
    mantissa * 2f64.powi(half) * 2f64.powi(exponent - half)
}

/// Multiply two values. Non-finite operands yield NaN.
pub fn multiply(a: f64, b: f64) -> f64 {
    if !a.is_finite() || !b.is_finite() {
        return f64::NAN;
    }
    if a == 0.0 || b == 0.0 {
        return 0.0;
    }
    if is_large(a) || is_large(b) {
        let (ma, ea) = split(a);
        let (mb, eb) = split(b);
        return scale(ma * mb, ea + eb);
    }
    a * b
}

/// Divide `a` by `b`. Division by zero and non-finite operands yield NaN.
pub fn divide(a: f64, b: f64) -> f64 {
    if !a.is_finite() || !b.is_finite() || b == 0.0 {
        return f64::NAN;
    }
    if a == 0.0 {
        return 0.0;
    }
    if is_large(a) || is_large(b) {
        let (ma, ea) = split(a);
        let (mb, eb) = split(b);
        return scale(ma / mb, ea - eb);
    }
    a / b
}

/// Add two values, returning the dominant operand unchanged when the other is
/// negligible relative to it.
pub fn add(a: f64, b: f64) -> f64 {
    if !a.is_finite() || !b.is_finite() {
        return a + b;
    }
    if a == 0.0 {
        return b;
    }
    if b == 0.0 {
        return a;
    }
    let (big, small) = if a.abs() >= b.abs() { (a, b) } else { (b, a) };
    if small.abs() / big.abs() < NEGLIGIBLE_RATIO {
        return big;
    }
    a + b
}

/// Sum a slice, accumulating in ascending order of magnitude.
pub fn sum(values: &[f64]) -> f64 {
    let mut ordered: Vec<f64> = values.to_vec();
    ordered.sort_by(|x, y| {
        x.abs()
            .partial_cmp(&y.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ordered.into_iter().fold(0.0, add)
}

/// Round with magnitude-tiered granularity.
///
/// Above 1e9 to the nearest 1,000; above 1e8 to the nearest 100; above 1e6 to
/// the nearest 10; otherwise to `decimals` decimal places.
pub fn round(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let magnitude = value.abs();
    let step = if magnitude > 1e9 {
        1_000.0
    } else if magnitude > 1e8 {
        100.0
    } else if magnitude > 1e6 {
        10.0
    } else {
        let factor = 10f64.powi(decimals as i32);
        return (value * factor).round() / factor;
    };
    (value / step).round() * step
}

/// Future value of `principal` compounded at `rate` for `periods`.
pub fn compound(principal: f64, rate: f64, periods: f64) -> f64 {
    if !principal.is_finite() || !rate.is_finite() || !periods.is_finite() || rate <= -1.0 {
        return f64::NAN;
    }
    if is_large(principal) {
        let growth = (periods * rate.ln_1p()).exp();
        return multiply(principal, growth);
    }
    principal * (1.0 + rate).powf(periods)
}

/// Present value of `future_value` discounted at `rate` for `periods`.
pub fn present_value(future_value: f64, rate: f64, periods: f64) -> f64 {
    if !future_value.is_finite() || !rate.is_finite() || !periods.is_finite() || rate <= -1.0 {
        return f64::NAN;
    }
    if is_large(future_value) {
        let discount = (-periods * rate.ln_1p()).exp();
        return multiply(future_value, discount);
    }
    future_value / (1.0 + rate).powf(periods)
}

/// Compare a value with a recomputation of it and report the relative loss.
///
/// Flags a warning when the loss exceeds 1e-12 on a value above 1e8. Never
/// fails; callers attach the warning to their result.
pub fn check_precision(original: f64, recomputed: f64) -> PrecisionCheck {
    let relative_loss = if original == 0.0 {
        recomputed.abs()
    } else {
        ((original - recomputed) / original).abs()
    };
    let warning = if is_large(original)
        && (relative_loss > PRECISION_LOSS_TOLERANCE || !relative_loss.is_finite())
    {
        tracing::warn!(original, recomputed, relative_loss, "precision loss above tolerance");
        Some(format!(
            "Precision loss of {relative_loss:.3e} on value {original:.0} exceeds tolerance {PRECISION_LOSS_TOLERANCE:e}"
        ))
    } else {
        None
    };
    PrecisionCheck {
        original,
        recomputed,
        relative_loss,
        warning,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
