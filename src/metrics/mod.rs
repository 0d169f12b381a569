//! Phase-organized pipeline metrics
//!
//! Each pipeline phase owns its metric names in a dedicated submodule so
//! phases cannot collide.

pub mod ingest;
pub mod registry;
pub mod transform;
pub mod validation;

pub use ingest::IngestMetrics;
pub use transform::TransformMetrics;
pub use validation::ValidationMetrics;

use std::path::Path;
use std::sync::{Once, OnceLock};
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and register every phase's metrics.
///
/// Idempotent. No HTTP listener is started; the exposition is rendered in
/// process with [`render_metrics`] at the end of a run.
pub fn init_metrics() {
    INIT.call_once(|| {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        match builder.install_recorder() {
            Ok(handle) => {
                if HANDLE.set(handle).is_err() {
                    warn!("Prometheus handle was already set");
                }
                registry::register_all_metrics();
                info!("Prometheus recorder installed");
            }
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
            }
        }
    });
}

/// Current exposition text, or `None` when no recorder was installed.
pub fn render_metrics() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

/// Write the current exposition to `path`.
pub fn write_metrics(path: &Path) -> std::io::Result<()> {
    match render_metrics() {
        Some(text) => {
            std::fs::write(path, text)?;
            info!(path = %path.display(), "Metrics written");
        }
        None => warn!("Metrics recorder not installed; nothing written to {}", path.display()),
    }
    Ok(())
}

/// Implemented by each phase's metrics collection.
pub trait PhaseMetrics {
    /// Touch every metric of the phase so it shows up before first use
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    #[allow(dead_code)]
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Metric names follow `kgx_{phase}_{metric_name}`, with `_total` on counters.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("kgx_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("kgx_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("kgx_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
