use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::f64::consts::PI;

use crate::error::PracticeValuationError;
use crate::PracticeValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Distribution attached to one stochastic variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DistributionSpec {
    Normal {
        mean: f64,
        #[serde(alias = "stdDev")]
        std_dev: f64,
    },
    Triangular { min: f64, mode: f64, max: f64 },
}

impl DistributionSpec {
    /// Draw one value from the distribution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            DistributionSpec::Normal { mean, std_dev } => sample_normal(rng, mean, std_dev),
            DistributionSpec::Triangular { min, mode, max } => {
                sample_triangular(rng, min, mode, max)
            }
        }
    }

    /// Reject non-finite or mis-ordered parameters.
    pub fn validate(&self, field: &str) -> PracticeValuationResult<()> {
        let reason = match *self {
            DistributionSpec::Normal { mean, std_dev } => {
                if !mean.is_finite() || !std_dev.is_finite() {
                    Some("Normal parameters must be finite")
                } else if std_dev < 0.0 {
                    Some("Standard deviation cannot be negative")
                } else {
                    None
                }
            }
            DistributionSpec::Triangular { min, mode, max } => {
                if !(min.is_finite() && mode.is_finite() && max.is_finite()) {
                    Some("Triangular parameters must be finite")
                } else if !(min <= mode && mode <= max) {
                    Some("Triangular parameters must satisfy min <= mode <= max")
                } else {
                    None
                }
            }
        };
        match reason {
            Some(reason) => Err(PracticeValuationError::InvalidInput {
                field: field.into(),
                reason: reason.into(),
            }),
            None => Ok(()),
        }
    }
}

/// Percentile summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

/// Summary statistics of a sorted sample set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleStatistics {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Percentiles,
}

/// A single histogram bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

// ---------------------------------------------------------------------------
// Samplers
// ---------------------------------------------------------------------------

/// Normal draw via the Box-Muller transform.
pub fn sample_normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    // u1 in (0, 1] so ln(u1) is finite
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    mean + std_dev * z
}

/// Triangular draw by inverting the CDF.
pub fn sample_triangular<R: Rng + ?Sized>(rng: &mut R, min: f64, mode: f64, max: f64) -> f64 {
    let range = max - min;
    if range <= 0.0 {
        return min;
    }
    let u: f64 = rng.gen::<f64>();
    if u < (mode - min) / range {
        min + (u * range * (mode - min)).sqrt()
    } else {
        max - ((1.0 - u) * range * (max - mode)).sqrt()
    }
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Clamp into `[lo, hi]`. A NaN input maps to `lo`.
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// Linear-interpolated percentile of a **sorted** slice, `p` in [0, 1].
///
/// The fractional index `p * (n - 1)` is clamped to `[0, n - 1]`. An empty
/// slice yields NaN.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let last = (n - 1) as f64;
    let rank = clamp(p * last, 0.0, last);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Sort ascending; NaNs compare equal so the sort never panics.
pub fn sort_samples(values: &mut [f64]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
}

/// Descriptive statistics of a **sorted** slice. `None` when empty.
pub fn summarize(sorted: &[f64]) -> Option<SampleStatistics> {
    let (&min, &max) = (sorted.first()?, sorted.last()?);
    let std_dev = if sorted.len() > 1 {
        sorted.iter().population_std_dev()
    } else {
        0.0
    };
    Some(SampleStatistics {
        count: sorted.len(),
        mean: sorted.iter().mean(),
        median: percentile(sorted, 0.5),
        std_dev,
        min,
        max,
        percentiles: Percentiles {
            p5: percentile(sorted, 0.05),
            p10: percentile(sorted, 0.10),
            p25: percentile(sorted, 0.25),
            p50: percentile(sorted, 0.50),
            p75: percentile(sorted, 0.75),
            p90: percentile(sorted, 0.90),
            p95: percentile(sorted, 0.95),
        },
    })
}

/// Equal-width histogram of a **sorted** slice.
pub fn build_histogram(sorted: &[f64], num_bins: usize) -> Vec<HistogramBin> {
    let (Some(&min_val), Some(&max_val)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };
    if num_bins == 0 {
        return Vec::new();
    }

    // All values identical
    if (max_val - min_val).abs() < f64::EPSILON {
        return vec![HistogramBin {
            lower: min_val,
            upper: max_val,
            count: sorted.len() as u32,
            frequency: 1.0,
        }];
    }

    let bin_width = (max_val - min_val) / num_bins as f64;
    let n = sorted.len() as f64;

    let mut bins: Vec<HistogramBin> = (0..num_bins)
        .map(|i| HistogramBin {
            lower: min_val + i as f64 * bin_width,
            upper: if i == num_bins - 1 {
                max_val
            } else {
                min_val + (i + 1) as f64 * bin_width
            },
            count: 0,
            frequency: 0.0,
        })
        .collect();

    for &val in sorted {
        let idx = (((val - min_val) / bin_width).floor() as usize).min(num_bins - 1);
        bins[idx].count += 1;
    }
    for bin in &mut bins {
        bin.frequency = bin.count as f64 / n;
    }

    bins
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_normal_moments() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut draws: Vec<f64> = (0..20000).map(|_| sample_normal(&mut rng, 0.12, 0.02)).collect();
        sort_samples(&mut draws);
        let stats = summarize(&draws).unwrap();
        assert_relative_eq!(stats.mean, 0.12, epsilon = 0.001);
        assert_relative_eq!(stats.std_dev, 0.02, epsilon = 0.001);
    }

    #[test]
    fn test_triangular_support_and_mean() {
        let mut rng = StdRng::seed_from_u64(7);
        let draws: Vec<f64> = (0..20000)
            .map(|_| sample_triangular(&mut rng, 4.0, 5.0, 7.0))
            .collect();
        assert!(draws.iter().all(|v| (4.0..=7.0).contains(v)));
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        // (min + mode + max) / 3
        assert_relative_eq!(mean, 16.0 / 3.0, epsilon = 0.02);
    }

    #[test]
    fn test_degenerate_triangular() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample_triangular(&mut rng, 3.0, 3.0, 3.0), 3.0);
    }

    #[test]
    fn test_percentile_bounds() {
        let sorted = [1.0, 2.0, 4.0, 8.0, 16.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 1.0), 16.0);
        assert_eq!(percentile(&sorted, 0.5), 4.0);
        assert_relative_eq!(percentile(&sorted, 0.625), 6.0);
        assert_eq!(percentile(&sorted, -3.0), 1.0);
        assert_eq!(percentile(&sorted, 9.0), 16.0);
        assert!(percentile(&[], 0.5).is_nan());
    }

    #[test]
    fn test_clamp_never_escapes() {
        for v in [-1e12, -0.5, 0.0, 0.07, 0.9, 1e12, f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let c = clamp(v, 0.03, 0.5);
            assert!((0.03..=0.5).contains(&c), "{v} -> {c}");
        }
    }

    #[test]
    fn test_histogram_counts() {
        let sorted: Vec<f64> = (0..100).map(f64::from).collect();
        let bins = build_histogram(&sorted, 20);
        assert_eq!(bins.len(), 20);
        assert_eq!(bins.iter().map(|b| b.count).sum::<u32>(), 100);
        assert_relative_eq!(bins.iter().map(|b| b.frequency).sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_distribution_spec_serde() {
        let spec: DistributionSpec =
            serde_json::from_str(r#"{"type":"Normal","mean":0.12,"stdDev":0.015}"#).unwrap();
        assert_eq!(spec, DistributionSpec::Normal { mean: 0.12, std_dev: 0.015 });
        let bad = DistributionSpec::Triangular { min: 5.0, mode: 4.0, max: 6.0 };
        assert!(bad.validate("exit_multiple").is_err());
    }
}
