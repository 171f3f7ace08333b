//! Functional gate: pass/fail verdict over a [`TestReport`].

use eebuild_core::{PipelineError, Result};
use serde::{Deserialize, Serialize};

use crate::functional::{CheckResult, TestReport};

/// Gate evaluation verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Whether the gate passed.
    pub passed: bool,

    /// Failed hard checks, with the failing items where the check has them.
    pub failed_checks: Vec<String>,

    /// Failed soft checks. Logged, never fatal.
    pub warnings: Vec<String>,

    /// Summary message.
    pub message: String,
}

impl GateVerdict {
    /// `Ok` when passed, otherwise [`PipelineError::TestFailure`].
    pub fn into_result(self) -> Result<()> {
        if self.passed {
            Ok(())
        } else {
            Err(PipelineError::TestFailure {
                failed_checks: self.failed_checks,
            })
        }
    }
}

/// Functional gate rules.
pub struct FunctionalGate;

impl FunctionalGate {
    /// The gate fails if and only if at least one hard check failed.
    pub fn evaluate(report: &TestReport) -> GateVerdict {
        let mut failed_checks = Vec::new();
        let mut warnings = Vec::new();

        for result in report.results.iter().filter(|r| !r.passed) {
            if result.check.is_hard() {
                failed_checks.push(describe(result));
            } else {
                warnings.push(format!("{}: {}", result.check, result.detail));
            }
        }

        let passed = failed_checks.is_empty();
        let message = if passed {
            format!(
                "{}/{} checks passed ({} warning(s))",
                report.passed_count(),
                report.results.len(),
                warnings.len()
            )
        } else {
            format!("Gate failed with {} hard check failure(s)", failed_checks.len())
        };

        GateVerdict {
            passed,
            failed_checks,
            warnings,
            message,
        }
    }
}

fn describe(result: &CheckResult) -> String {
    if result.failed_items.is_empty() {
        result.check.name().to_string()
    } else {
        format!("{}: {}", result.check, result.failed_items.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functional::FunctionalCheck;

    fn report(failing: &[FunctionalCheck]) -> TestReport {
        TestReport {
            results: FunctionalCheck::ALL
                .iter()
                .map(|check| CheckResult {
                    check: *check,
                    passed: !failing.contains(check),
                    output: String::new(),
                    detail: "detail".to_string(),
                    failed_items: Vec::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_all_passing() {
        let verdict = FunctionalGate::evaluate(&report(&[]));
        assert!(verdict.passed);
        assert!(verdict.warnings.is_empty());
        assert!(verdict.into_result().is_ok());
    }

    #[test]
    fn test_fails_iff_a_hard_check_fails() {
        // Every subset of the six checks.
        for mask in 0u32..64 {
            let failing: Vec<_> = FunctionalCheck::ALL
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, c)| *c)
                .collect();
            let any_hard = failing.iter().any(|c| c.is_hard());
            let verdict = FunctionalGate::evaluate(&report(&failing));
            assert_eq!(verdict.passed, !any_hard, "failing set {failing:?}");
        }
    }

    #[test]
    fn test_soft_failures_only_warn() {
        let verdict = FunctionalGate::evaluate(&report(&[
            FunctionalCheck::PythonVersion,
            FunctionalCheck::ExpectedCollections,
        ]));
        assert!(verdict.passed);
        assert_eq!(verdict.warnings.len(), 2);
    }

    #[test]
    fn test_failed_imports_listed_in_error() {
        let mut report = report(&[FunctionalCheck::PythonImports]);
        report.results[4].failed_items = vec!["yaml".into(), "jmespath".into()];

        let err = FunctionalGate::evaluate(&report).into_result().unwrap_err();
        match err {
            PipelineError::TestFailure { failed_checks } => {
                assert_eq!(failed_checks, vec!["python_imports: yaml, jmespath"]);
            }
            other => panic!("expected TestFailure, got {other:?}"),
        }
    }
}
