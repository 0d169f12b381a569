use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use super::constraints::{ConstraintType, Severity};
use crate::error::Result;

/// Example offending values and how many rows carried them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationSample {
    pub values: Vec<Value>,
    pub count: usize,
}

/// All rows of one table that broke one constraint on one slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationViolation {
    pub constraint_type: ConstraintType,
    pub slot_name: String,
    pub table: String,
    pub severity: Severity,
    pub description: String,
    pub violation_count: usize,
    pub total_records: usize,
    pub violation_percentage: f64,
    pub samples: Vec<ViolationSample>,
}

impl ValidationViolation {
    pub fn percentage(count: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub violations: Vec<ValidationViolation>,
    pub total_violations: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
    pub compliance_percentage: f64,
    pub tables_validated: Vec<String>,
    pub constraints_checked: usize,
    /// Rows across every validated table
    pub total_records: usize,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::summarize(Vec::new(), Vec::new(), 0, 0)
    }
}

impl ValidationReport {
    /// Derive the aggregate counts from the violations alone.
    ///
    /// Compliance is the share of rows not accounted for by error-severity
    /// violations, floored at zero.
    pub fn summarize(
        violations: Vec<ValidationViolation>,
        tables_validated: Vec<String>,
        total_records: usize,
        constraints_checked: usize,
    ) -> Self {
        let count = |severity: Severity| -> usize {
            violations
                .iter()
                .filter(|v| v.severity == severity)
                .map(|v| v.violation_count)
                .sum()
        };
        let error_count = count(Severity::Error);
        let warning_count = count(Severity::Warning);
        let info_count = count(Severity::Info);
        let compliance_percentage = if total_records == 0 {
            100.0
        } else {
            (total_records.saturating_sub(error_count)) as f64 / total_records as f64 * 100.0
        };
        Self {
            total_violations: violations.iter().map(|v| v.violation_count).sum(),
            violations,
            error_count,
            warning_count,
            info_count,
            compliance_percentage,
            tables_validated,
            constraints_checked,
            total_records,
        }
    }

    /// Keep only violations at or above `min_severity`. Compliance is left
    /// as computed over the full report.
    pub fn filtered(&self, min_severity: Severity) -> Self {
        let kept: Vec<ValidationViolation> = self
            .violations
            .iter()
            .filter(|v| v.severity >= min_severity)
            .cloned()
            .collect();
        let mut report = Self::summarize(
            kept,
            self.tables_validated.clone(),
            self.total_records,
            self.constraints_checked,
        );
        report.compliance_percentage = self.compliance_percentage;
        report
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JSON for a `.json` path, YAML otherwise.
    pub fn write(&self, path: &Path) -> Result<()> {
        let text = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => self.to_json()?,
            _ => self.to_yaml()?,
        };
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Human-readable summary with the `top` largest violations.
    pub fn render_summary(&self, top: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Validated {} ({} records, {} constraints checked)",
            if self.tables_validated.is_empty() {
                "no tables".to_string()
            } else {
                self.tables_validated.join(", ")
            },
            self.total_records,
            self.constraints_checked
        );
        let _ = writeln!(
            out,
            "Compliance: {:.1}%  errors: {}  warnings: {}  info: {}",
            self.compliance_percentage, self.error_count, self.warning_count, self.info_count
        );
        let mut ranked: Vec<&ValidationViolation> = self.violations.iter().collect();
        ranked.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(b.violation_count.cmp(&a.violation_count))
        });
        for v in ranked.into_iter().take(top) {
            let _ = writeln!(
                out,
                "  [{}] {}.{} {}: {} of {} ({:.1}%) - {}",
                v.severity,
                v.table,
                v.slot_name,
                v.constraint_type,
                v.violation_count,
                v.total_records,
                v.violation_percentage,
                v.description
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(severity: Severity, count: usize) -> ValidationViolation {
        ValidationViolation {
            constraint_type: ConstraintType::Required,
            slot_name: "id".into(),
            table: "nodes".into(),
            severity,
            description: "Field 'id' is required".into(),
            violation_count: count,
            total_records: 10,
            violation_percentage: ValidationViolation::percentage(count, 10),
            samples: Vec::new(),
        }
    }

    #[test]
    fn empty_report_is_fully_compliant() {
        let report = ValidationReport::default();
        assert_eq!(report.total_violations, 0);
        assert_eq!(report.compliance_percentage, 100.0);
        assert!(report.is_clean());
    }

    #[test]
    fn aggregates_come_from_severities() {
        let report = ValidationReport::summarize(
            vec![violation(Severity::Error, 3), violation(Severity::Warning, 5), violation(Severity::Info, 1)],
            vec!["nodes".into()],
            10,
            3,
        );
        assert_eq!(report.total_violations, 9);
        assert_eq!((report.error_count, report.warning_count, report.info_count), (3, 5, 1));
        assert_eq!(report.compliance_percentage, 70.0);

        let errors_only = report.filtered(Severity::Error);
        assert_eq!(errors_only.violations.len(), 1);
        assert_eq!(errors_only.warning_count, 0);
        assert_eq!(errors_only.compliance_percentage, 70.0);
    }

    #[test]
    fn compliance_never_goes_negative() {
        let report = ValidationReport::summarize(vec![violation(Severity::Error, 30)], vec!["nodes".into()], 10, 1);
        assert_eq!(report.compliance_percentage, 0.0);
    }

    #[test]
    fn serializes_and_summarizes() {
        let report = ValidationReport::summarize(vec![violation(Severity::Error, 3)], vec!["nodes".into()], 10, 1);
        let yaml = report.to_yaml().unwrap();
        assert!(yaml.contains("constraint_type: required"));
        assert!(report.to_json().unwrap().contains("\"violation_percentage\": 30.0"));
        let summary = report.render_summary(5);
        assert!(summary.contains("[error] nodes.id required: 3 of 10 (30.0%)"));
    }
}
