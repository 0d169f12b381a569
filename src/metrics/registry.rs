//! Registration of every phase's metrics, with name-conflict detection.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{info, warn};

pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::ingest::IngestMetrics>(&mut all_metrics);
    register_phase_metrics::<super::transform::TransformMetrics>(&mut all_metrics);
    register_phase_metrics::<super::validation::ValidationMetrics>(&mut all_metrics);

    info!(
        "Registered {} total metrics across all phases",
        all_metrics.len()
    );

    if std::env::var("KGX_METRICS_DEBUG").is_ok() {
        log_metrics_summary(&all_metrics);
    }
}

fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<String, MetricDoc>) {
    T::register_metrics();
    let phase_name = T::phase_name();
    let phase_docs = T::metrics_documentation();

    for doc in phase_docs {
        if all_metrics.contains_key(doc.name) {
            warn!(
                "Metric name conflict detected: '{}' registered again by phase '{}'",
                doc.name, phase_name
            );
        } else {
            all_metrics.insert(doc.name.to_string(), doc);
        }
    }
}

fn log_metrics_summary(all_metrics: &HashMap<String, MetricDoc>) {
    let mut by_phase: HashMap<&str, Vec<&MetricDoc>> = HashMap::new();
    for doc in all_metrics.values() {
        by_phase
            .entry(extract_phase_from_metric_name(doc.name))
            .or_default()
            .push(doc);
    }

    for (phase, metrics) in by_phase {
        info!("Phase '{}': {} metrics", phase, metrics.len());
        for metric in metrics {
            info!("  - {} ({:?}): {}", metric.name, metric.metric_type, metric.help);
        }
    }
}

/// "kgx_transform_runs_total" -> "transform"
fn extract_phase_from_metric_name(metric_name: &str) -> &str {
    if let Some(stripped) = metric_name.strip_prefix("kgx_") {
        if let Some(next_underscore) = stripped.find('_') {
            return &stripped[..next_underscore];
        }
    }
    "unknown"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{IngestMetrics, TransformMetrics, ValidationMetrics};

    #[test]
    fn test_extract_phase_from_metric_name() {
        assert_eq!(extract_phase_from_metric_name("kgx_ingest_rows_read_total"), "ingest");
        assert_eq!(
            extract_phase_from_metric_name("kgx_validation_violations_total"),
            "validation"
        );
        assert_eq!(extract_phase_from_metric_name("invalid_metric_name"), "unknown");
    }

    #[test]
    fn documented_names_are_unique_and_carry_their_phase() {
        let mut seen = std::collections::HashSet::new();
        let docs = IngestMetrics::metrics_documentation()
            .into_iter()
            .map(|d| ("ingest", d))
            .chain(TransformMetrics::metrics_documentation().into_iter().map(|d| ("transform", d)))
            .chain(ValidationMetrics::metrics_documentation().into_iter().map(|d| ("validation", d)));
        for (phase, doc) in docs {
            assert!(seen.insert(doc.name), "duplicate metric {}", doc.name);
            assert_eq!(extract_phase_from_metric_name(doc.name), phase);
        }
    }
}
