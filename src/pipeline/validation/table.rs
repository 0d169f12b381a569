use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;
use tracing::info;

use super::schema::SchemaParser;
use crate::constants::{EDGES_TABLE, LIST_DELIMITER, NODES_TABLE};
use crate::error::Result;
use crate::pipeline::ingestion::reader::{ReaderConfig, ReaderFormat};
use crate::pipeline::ingestion::Source;
use crate::pipeline::storage::InMemorySink;
use crate::types::Record;

/// An in-memory node or edge table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphTable {
    name: String,
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl GraphTable {
    /// Columns are the union of the rows' fields in first-seen order.
    pub fn new(name: impl Into<String>, rows: Vec<Record>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for row in &rows {
            for key in row.keys() {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    /// Load KGX TSV (`.tsv`, optionally compressed) or JSON lines (`.jsonl`).
    ///
    /// TSV cells are text: empty cells become null and multivalued columns
    /// are split on `|`.
    pub fn load(path: &Path, name: &str, schema: &SchemaParser) -> Result<Self> {
        let location = path.display().to_string();
        let is_jsonl = location
            .trim_end_matches(".gz")
            .rsplit('.')
            .next()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("json"));

        let table = if is_jsonl {
            let config = ReaderConfig {
                files: vec![location.clone()],
                ..ReaderConfig::with_format(ReaderFormat::Jsonl)
            };
            let rows = Source::new(name, config)?.collect::<Result<Vec<Record>>>()?;
            Self::new(name, rows)
        } else {
            let config = ReaderConfig {
                files: vec![location.clone()],
                comment_char: None,
                quoting: false,
                ..ReaderConfig::delimited("\t")
            };
            let rows = Source::new(name, config)?.collect::<Result<Vec<Record>>>()?;
            let mut table = Self::new(name, rows);
            let multivalued = schema.multivalued_columns(table.columns.iter().map(String::as_str));
            for row in &mut table.rows {
                normalize_tsv_row(row, &multivalued);
            }
            table
        };
        info!(path = %location, table = name, rows = table.len(), columns = table.columns.len(), "Loaded graph table");
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Remove the rows `keep` rejects and return them in table order.
    pub fn split_off_rows(&mut self, mut keep: impl FnMut(&Record) -> bool) -> Vec<Record> {
        let (kept, removed): (Vec<Record>, Vec<Record>) =
            std::mem::take(&mut self.rows).into_iter().partition(|row| keep(row));
        self.rows = kept;
        removed
    }

    /// Non-null string values of the `id` column.
    pub fn id_set(&self) -> HashSet<&str> {
        self.rows
            .iter()
            .filter_map(|row| row.get("id").and_then(Value::as_str))
            .collect()
    }
}

fn normalize_tsv_row(row: &mut Record, multivalued: &HashSet<String>) {
    for (column, value) in row.iter_mut() {
        let Value::String(text) = value else {
            continue;
        };
        if text.trim().is_empty() {
            *value = Value::Null;
        } else if multivalued.contains(column) {
            let items = text
                .split(LIST_DELIMITER)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect();
            *value = Value::Array(items);
        }
    }
}

/// The node and edge tables of one graph; either may be absent.
#[derive(Debug, Clone, Default)]
pub struct GraphTables {
    pub nodes: Option<GraphTable>,
    pub edges: Option<GraphTable>,
}

impl GraphTables {
    pub fn new(nodes: Option<GraphTable>, edges: Option<GraphTable>) -> Self {
        Self { nodes, edges }
    }

    pub fn load(nodes: Option<&Path>, edges: Option<&Path>, schema: &SchemaParser) -> Result<Self> {
        Ok(Self {
            nodes: nodes
                .map(|p| GraphTable::load(p, NODES_TABLE, schema))
                .transpose()?,
            edges: edges
                .map(|p| GraphTable::load(p, EDGES_TABLE, schema))
                .transpose()?,
        })
    }

    /// Tables from a finished run's in-memory output.
    pub fn from_sink(sink: &InMemorySink) -> Self {
        Self {
            nodes: Some(GraphTable::new(NODES_TABLE, sink.nodes().to_vec())),
            edges: Some(GraphTable::new(EDGES_TABLE, sink.edges().to_vec())),
        }
    }
}
