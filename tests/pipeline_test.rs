use std::fs;

use anyhow::Result;
use serde_json::json;
use tempfile::tempdir;

use kgx_ingest::app::ingest_use_case::{output_paths, IngestUseCase};
use kgx_ingest::app::validate_use_case::ValidateUseCase;
use kgx_ingest::config::{order_sources, SourceConfig};
use kgx_ingest::pipeline::ingestion::{ReaderConfig, Source};
use kgx_ingest::pipeline::storage::SinkFormat;
use kgx_ingest::pipeline::validation::{ConstraintType, Severity};
use kgx_ingest::types::Record;

const SCHEMA: &str = r#"
name: test-schema
classes:
  named thing:
    slots: [id, category, name]
  gene:
    is_a: named thing
  association:
    slots: [subject, predicate, object]
slots:
  id:
    identifier: true
    required: true
  category:
    required: true
  name:
    recommended: true
  subject:
    required: true
    range: named thing
  object:
    required: true
    range: named thing
  predicate:
    required: true
  related to:
  interacts with:
    is_a: related to
"#;

const GRAPH: &str = concat!(
    r#"{"id": "HGNC:1", "category": "biolink:Gene", "name": "BRCA1"}"#,
    "\n",
    r#"{"id": "HGNC:2", "category": "biolink:Gene", "name": "TP53"}"#,
    "\n",
    r#"{"subject": "HGNC:1", "predicate": "biolink:interacts_with", "object": "HGNC:2"}"#,
    "\n",
    r#"{"subject": "HGNC:1", "predicate": "biolink:interacts_with", "object": "MONDO:9"}"#,
    "\n",
);

#[test]
fn delimited_source_yields_one_record_per_row() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("genes.csv");
    fs::write(&path, "id,name\nHGNC:1,BRCA1\n")?;

    let config = ReaderConfig {
        files: vec![path.display().to_string()],
        ..ReaderConfig::delimited(",")
    };
    let records = Source::new("genes", config)?.collect::<Result<Vec<Record>, _>>()?;

    assert_eq!(records.len(), 1);
    assert_eq!(
        serde_json::Value::Object(records[0].clone()),
        json!({"id": "HGNC:1", "name": "BRCA1"})
    );
    Ok(())
}

#[test]
fn transform_then_validate_written_tables() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("graph.jsonl"), GRAPH)?;
    let schema_path = dir.path().join("schema.yaml");
    fs::write(&schema_path, SCHEMA)?;
    let config_path = dir.path().join("genes.toml");
    fs::write(
        &config_path,
        r#"
name = "genes"

[reader]
format = "jsonl"
files = ["graph.jsonl"]

[writer]
format = "tsv"
min_node_count = 2
min_edge_count = 2
"#,
    )?;

    let config = SourceConfig::load(&config_path)?;
    let out = dir.path().join("out");
    let outcome = IngestUseCase::new(&out).run(&config)?;
    assert_eq!(outcome.summary.records_read, 4);
    assert_eq!(outcome.summary.nodes, 2);
    assert_eq!(outcome.summary.edges, 2);

    let (nodes, edges) = output_paths(&out, "genes", SinkFormat::Tsv).expect("tsv paths");
    let header = fs::read_to_string(&nodes)?;
    assert!(header.starts_with("id\tcategory\tname"));

    let report = ValidateUseCase::new(Some(&schema_path))
        .with_min_severity(Severity::Warning)
        .validate_files(Some(&nodes), Some(&edges), None)?;
    let dangling = report
        .violations
        .iter()
        .find(|v| v.table == "edges" && v.slot_name == "object" && v.constraint_type == ConstraintType::RangeClass)
        .expect("dangling object is reported");
    assert_eq!(dangling.violation_count, 1);
    assert_eq!(dangling.samples[0].values, vec![json!("MONDO:9")]);
    assert!(report
        .violations
        .iter()
        .all(|v| v.severity >= Severity::Warning));
    Ok(())
}

#[test]
fn too_few_nodes_fails_the_run() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("graph.jsonl"), GRAPH)?;
    let config_path = dir.path().join("genes.yaml");
    fs::write(
        &config_path,
        "name: genes\nreader:\n  format: jsonl\n  files: [graph.jsonl]\nwriter:\n  format: passthrough\n  min_node_count: 5\n",
    )?;
    let config = SourceConfig::load(&config_path)?;
    let err = IngestUseCase::new(dir.path().join("out"))
        .run(&config)
        .expect_err("two nodes is below the minimum");
    assert!(format!("{err:#}").contains("min_node_count"));
    Ok(())
}

#[test]
fn passthrough_graph_validates_in_process() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("graph.jsonl"), GRAPH)?;
    let config_path = dir.path().join("a.toml");
    fs::write(
        &config_path,
        "name = \"a\"\ndepends_on = []\n[reader]\nformat = \"jsonl\"\nfiles = [\"graph.jsonl\"]\n[writer]\nformat = \"passthrough\"\n",
    )?;
    let configs = order_sources(vec![SourceConfig::load(&config_path)?])?;
    let outcomes = IngestUseCase::new(dir.path().join("out")).run_all(&configs)?;
    let graph = outcomes[0].graph.as_ref().expect("passthrough graph");
    assert_eq!((graph.nodes().len(), graph.edges().len()), (2, 2));

    let report = ValidateUseCase::new(None).validate_sink(graph)?;
    assert_eq!(report.violations.len(), 1);
    let dangling = &report.violations[0];
    assert_eq!(dangling.constraint_type, ConstraintType::DanglingEdge);
    assert_eq!(dangling.slot_name, "object");
    assert_eq!(dangling.samples[0].values, vec![json!("MONDO:9")]);
    assert_eq!(report.compliance_percentage, 75.0);
    Ok(())
}
