//! Ingest Phase Metrics
//!
//! Resource acquisition and record reading.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct IngestMetrics;

impl IngestMetrics {
    /// A remote resource was fetched into a scratch file
    pub fn record_remote_fetch(bytes: usize) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "remote_fetches")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "ingest", "remote_fetch_bytes"))
            .record(bytes as f64);
    }

    pub fn record_resource_opened(format: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "ingest", "resources_opened"),
            "format" => format.to_string()
        )
        .increment(1);
    }

    /// Row counts for one exhausted source
    pub fn record_source_finished(rows_read: usize, rows_filtered: usize, rows_emitted: usize) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "rows_read")).increment(rows_read as u64);
        ::metrics::counter!(phase_metric!(counter, "ingest", "rows_filtered"))
            .increment(rows_filtered as u64);
        ::metrics::counter!(phase_metric!(counter, "ingest", "rows_emitted"))
            .increment(rows_emitted as u64);
    }
}

impl PhaseMetrics for IngestMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "ingest", "remote_fetches"));
        let _ = counter!(phase_metric!(counter, "ingest", "resources_opened"));
        let _ = counter!(phase_metric!(counter, "ingest", "rows_read"));
        let _ = counter!(phase_metric!(counter, "ingest", "rows_filtered"));
        let _ = counter!(phase_metric!(counter, "ingest", "rows_emitted"));
        let _ = histogram!(phase_metric!(histogram, "ingest", "remote_fetch_bytes"));
    }

    fn phase_name() -> &'static str {
        "ingest"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "ingest", "remote_fetches"),
                metric_type: MetricType::Counter,
                help: "Remote resources fetched to a local scratch file",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "resources_opened"),
                metric_type: MetricType::Counter,
                help: "Resources opened, by detected container format",
                labels: vec!["format"],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "rows_read"),
                metric_type: MetricType::Counter,
                help: "Records produced by the record readers",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "rows_filtered"),
                metric_type: MetricType::Counter,
                help: "Records dropped by row filters",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "rows_emitted"),
                metric_type: MetricType::Counter,
                help: "Records handed on to transforms",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingest", "remote_fetch_bytes"),
                metric_type: MetricType::Histogram,
                help: "Size of fetched remote resources in bytes",
                labels: vec![],
            },
        ]
    }
}
