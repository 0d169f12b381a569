//! Transform Phase Metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::pipeline::processing::transform::RunSummary;

pub struct TransformMetrics;

impl TransformMetrics {
    /// A completed run
    pub fn record_run(summary: &RunSummary) {
        ::metrics::counter!(phase_metric!(counter, "transform", "runs")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "transform", "records_skipped"))
            .increment(summary.records_skipped as u64);
        ::metrics::counter!(phase_metric!(counter, "transform", "nodes_written"))
            .increment(summary.nodes as u64);
        ::metrics::counter!(phase_metric!(counter, "transform", "edges_written"))
            .increment(summary.edges as u64);
        ::metrics::histogram!(phase_metric!(histogram, "transform", "run_duration_seconds"))
            .record(summary.duration_secs);
    }

    pub fn record_run_failure() {
        ::metrics::counter!(phase_metric!(counter, "transform", "run_failures")).increment(1);
    }
}

impl PhaseMetrics for TransformMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "transform", "runs"));
        let _ = counter!(phase_metric!(counter, "transform", "run_failures"));
        let _ = counter!(phase_metric!(counter, "transform", "records_skipped"));
        let _ = counter!(phase_metric!(counter, "transform", "nodes_written"));
        let _ = counter!(phase_metric!(counter, "transform", "edges_written"));
        let _ = histogram!(phase_metric!(histogram, "transform", "run_duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "transform"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "transform", "runs"),
                metric_type: MetricType::Counter,
                help: "Transform runs that completed",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "run_failures"),
                metric_type: MetricType::Counter,
                help: "Transform runs aborted by a hook, reader or sink error",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "records_skipped"),
                metric_type: MetricType::Counter,
                help: "Records a per-record hook asked to skip",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "nodes_written"),
                metric_type: MetricType::Counter,
                help: "Node entities handed to sinks",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "edges_written"),
                metric_type: MetricType::Counter,
                help: "Edge entities handed to sinks",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "transform", "run_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time of a transform run in seconds",
                labels: vec![],
            },
        ]
    }
}
