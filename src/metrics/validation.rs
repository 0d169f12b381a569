//! Validation Phase Metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::pipeline::validation::ValidationReport;

pub struct ValidationMetrics;

impl ValidationMetrics {
    pub fn record_report(report: &ValidationReport, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "validation", "runs")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "validation", "violations"))
            .increment(report.total_violations as u64);
        ::metrics::counter!(phase_metric!(counter, "validation", "constraints_checked"))
            .increment(report.constraints_checked as u64);
        ::metrics::gauge!(phase_metric!(gauge, "validation", "compliance_percentage"))
            .set(report.compliance_percentage);
        ::metrics::histogram!(phase_metric!(histogram, "validation", "duration_seconds"))
            .record(duration_secs);
    }
}

impl PhaseMetrics for ValidationMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        let _ = counter!(phase_metric!(counter, "validation", "runs"));
        let _ = counter!(phase_metric!(counter, "validation", "violations"));
        let _ = counter!(phase_metric!(counter, "validation", "constraints_checked"));
        let _ = gauge!(phase_metric!(gauge, "validation", "compliance_percentage"));
        let _ = histogram!(phase_metric!(histogram, "validation", "duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "validation"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "validation", "runs"),
                metric_type: MetricType::Counter,
                help: "Validation runs",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "validation", "violations"),
                metric_type: MetricType::Counter,
                help: "Aggregated violations reported",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "validation", "constraints_checked"),
                metric_type: MetricType::Counter,
                help: "Constraints evaluated against a table",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "validation", "compliance_percentage"),
                metric_type: MetricType::Gauge,
                help: "Overall compliance of the last validated graph",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "validation", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time of a validation run in seconds",
                labels: vec![],
            },
        ]
    }
}
