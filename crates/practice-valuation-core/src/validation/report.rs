use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const CRITICAL_DEDUCTION: u32 = 30;
const HIGH_DEDUCTION: u32 = 20;
const MEDIUM_DEDUCTION: u32 = 10;
const FAIL_BELOW: u32 = 50;
const WARN_BELOW: u32 = 80;

/// Severity of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Which consistency check produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    EpvConsistency,
    MultipleAlignment,
    MarginPlausibility,
    ScalingConsistency,
    MethodComparison,
    SmallPracticeRisk,
    InputBounds,
}

/// Calculated figure against its expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckVariance {
    pub calculated: Decimal,
    pub expected: Decimal,
    pub variance: Decimal,
}

/// One named, severity-tagged finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub check: CheckKind,
    pub severity: Severity,
    /// False for high and critical findings
    pub is_valid: bool,
    pub message: String,
    pub suggested_action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variance: Option<CheckVariance>,
}

impl ValidationCheck {
    pub fn new(
        check: CheckKind,
        severity: Severity,
        message: impl Into<String>,
        suggested_action: impl Into<String>,
    ) -> Self {
        ValidationCheck {
            check,
            severity,
            is_valid: severity < Severity::High,
            message: message.into(),
            suggested_action: suggested_action.into(),
            variance: None,
        }
    }

    pub fn with_variance(mut self, calculated: Decimal, expected: Decimal, variance: Decimal) -> Self {
        self.variance = Some(CheckVariance {
            calculated,
            expected,
            variance,
        });
        self
    }
}

/// Overall outcome of a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Pass,
    Warning,
    Fail,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationStatus::Pass => write!(f, "PASS"),
            ValidationStatus::Warning => write!(f, "WARNING"),
            ValidationStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// Scored aggregate of all checks. Built once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub checks: Vec<ValidationCheck>,
    /// 100 less 30/20/10 per critical/high/medium finding, floored at 0
    pub score: u32,
    pub status: ValidationStatus,
    pub critical_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
}

impl ValidationReport {
    pub fn from_checks(checks: Vec<ValidationCheck>) -> Self {
        let count = |s: Severity| checks.iter().filter(|c| c.severity == s).count();
        let critical_count = count(Severity::Critical);
        let high_count = count(Severity::High);
        let medium_count = count(Severity::Medium);

        let deductions = critical_count as u32 * CRITICAL_DEDUCTION
            + high_count as u32 * HIGH_DEDUCTION
            + medium_count as u32 * MEDIUM_DEDUCTION;
        let score = 100u32.saturating_sub(deductions);

        let status = if critical_count > 0 || score < FAIL_BELOW {
            ValidationStatus::Fail
        } else if high_count > 0 || score < WARN_BELOW {
            ValidationStatus::Warning
        } else {
            ValidationStatus::Pass
        };

        ValidationReport {
            checks,
            score,
            status,
            critical_count,
            high_count,
            medium_count,
        }
    }

    /// Findings at or above `min`.
    pub fn findings(&self, min: Severity) -> impl Iterator<Item = &ValidationCheck> {
        self.checks.iter().filter(move |c| c.severity >= min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(severity: Severity) -> ValidationCheck {
        ValidationCheck::new(CheckKind::MethodComparison, severity, "m", "a")
    }

    #[test]
    fn test_clean_report_passes() {
        let report = ValidationReport::from_checks(vec![check(Severity::Low), check(Severity::Low)]);
        assert_eq!(report.score, 100);
        assert_eq!(report.status, ValidationStatus::Pass);
    }

    #[test]
    fn test_single_high_is_warning() {
        let report = ValidationReport::from_checks(vec![check(Severity::High)]);
        assert_eq!(report.score, 80);
        assert_eq!(report.status, ValidationStatus::Warning);
    }

    #[test]
    fn test_mediums_accumulate() {
        let report = ValidationReport::from_checks(vec![check(Severity::Medium); 3]);
        assert_eq!(report.score, 70);
        assert_eq!(report.status, ValidationStatus::Warning);
    }

    #[test]
    fn test_critical_fails_and_score_floors() {
        let report = ValidationReport::from_checks(vec![check(Severity::Critical); 4]);
        assert_eq!(report.score, 0);
        assert_eq!(report.status, ValidationStatus::Fail);
        assert_eq!(report.findings(Severity::High).count(), 4);
    }

    #[test]
    fn test_validity_follows_severity() {
        assert!(check(Severity::Medium).is_valid);
        assert!(!check(Severity::High).is_valid);
    }

    #[test]
    fn test_serialized_tags() {
        let json = serde_json::to_value(check(Severity::Critical)).unwrap();
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["check"], "method_comparison");
        let status = serde_json::to_value(ValidationStatus::Warning).unwrap();
        assert_eq!(status, "WARNING");
    }
}
