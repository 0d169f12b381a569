use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::constants::DEFAULT_SAMPLE_LIMIT;
use crate::pipeline::storage::InMemorySink;
use crate::pipeline::validation::{
    GraphTables, SchemaParser, Severity, ValidationEngine, ValidationReport,
};

/// Use case for validating a KGX graph against an optional schema
pub struct ValidateUseCase {
    schema: SchemaParser,
    sample_limit: usize,
    min_severity: Severity,
}

impl ValidateUseCase {
    /// An unreadable schema degrades to checking structure only.
    pub fn new(schema_path: Option<&Path>) -> Self {
        Self::with_schema(SchemaParser::load(schema_path))
    }

    pub fn with_schema(schema: SchemaParser) -> Self {
        Self {
            schema,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            min_severity: Severity::Info,
        }
    }

    pub fn with_sample_limit(mut self, sample_limit: usize) -> Self {
        self.sample_limit = sample_limit;
        self
    }

    pub fn with_min_severity(mut self, min_severity: Severity) -> Self {
        self.min_severity = min_severity;
        self
    }

    /// Validate node and edge files; either may be omitted.
    pub fn validate_files(
        &self,
        nodes: Option<&Path>,
        edges: Option<&Path>,
        output: Option<&Path>,
    ) -> Result<ValidationReport> {
        let graph = GraphTables::load(nodes, edges, &self.schema)
            .context("Failed to load graph tables")?;
        self.finish(&graph, output)
    }

    /// Validate the graph of a passthrough run.
    pub fn validate_sink(&self, sink: &InMemorySink) -> Result<ValidationReport> {
        self.finish(&GraphTables::from_sink(sink), None)
    }

    fn finish(&self, graph: &GraphTables, output: Option<&Path>) -> Result<ValidationReport> {
        let report = ValidationEngine::new(&self.schema)
            .with_sample_limit(self.sample_limit)
            .validate(graph)
            .filtered(self.min_severity);
        if let Some(path) = output {
            report
                .write(path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "Wrote validation report");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::GraphSink;
    use serde_json::json;
    use std::fs;

    #[test]
    fn structure_only_without_a_schema() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = dir.path().join("nodes.tsv");
        fs::write(&nodes, "id\tcategory\nA:1\tbiolink:Gene\n").unwrap();
        let report = ValidateUseCase::new(None)
            .validate_files(Some(&nodes), None, None)
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.compliance_percentage, 100.0);
    }

    #[test]
    fn report_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.json");
        let mut sink = InMemorySink::new();
        sink.write_node(json!({"id": "A:1"}).as_object().unwrap().clone())
            .unwrap();
        let report = ValidateUseCase::new(None)
            .validate_sink(&sink)
            .unwrap();
        assert_eq!(report.total_records, 1);

        let graph = GraphTables::from_sink(&sink);
        ValidateUseCase::new(None)
            .finish(&graph, Some(output.as_path()))
            .unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written["total_violations"], json!(0));
    }
}
