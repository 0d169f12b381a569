//! Sinks for classified nodes and edges.

pub mod in_memory;
pub mod jsonl;
pub mod tsv;

pub use in_memory::InMemorySink;
pub use jsonl::JsonlSink;
pub use tsv::TsvSink;

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::constants::LIST_COLUMNS;
use crate::error::Result;
use crate::types::Record;

/// Receives flattened nodes and edges in emission order.
pub trait GraphSink {
    fn write_node(&mut self, node: Record) -> Result<()>;

    fn write_edge(&mut self, edge: Record) -> Result<()>;

    /// Flush and close; called once after the last write of a run.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    #[default]
    Tsv,
    Jsonl,
    Passthrough,
}

/// Writer settings shared by the file sinks.
#[derive(Debug, Clone, Default)]
pub struct SinkOptions {
    pub node_properties: Vec<String>,
    pub edge_properties: Vec<String>,
    /// Add crosswalk provenance columns to the edge header
    pub sssom_columns: bool,
}

/// File sink for `format`, writing `{name}_nodes.*` and `{name}_edges.*`
/// into `output_dir`. Passthrough is handled by the caller with an
/// [`InMemorySink`].
pub fn file_sink(
    format: SinkFormat,
    output_dir: &Path,
    name: &str,
    options: SinkOptions,
) -> Result<Box<dyn GraphSink>> {
    Ok(match format {
        SinkFormat::Tsv => Box::new(TsvSink::new(output_dir, name, options)?),
        SinkFormat::Jsonl => Box::new(JsonlSink::new(output_dir, name)?),
        SinkFormat::Passthrough => Box::new(InMemorySink::new()),
    })
}

/// Drop nulls, and scrub newlines, tabs and escaped quotes from text.
///
/// With a list delimiter, lists (and values of list columns) are joined into
/// one string.
pub fn build_export_row(record: &Record, list_delimiter: Option<&str>) -> Record {
    let mut row = Record::new();
    for (key, value) in record {
        let Some(value) = remove_null(value) else {
            continue;
        };
        row.insert(key.clone(), sanitize(key, value, list_delimiter));
    }
    row
}

fn remove_null(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(Value::Array(items.iter().filter_map(remove_null).collect())),
        Value::Object(map) => Some(Value::Object(
            map.iter()
                .filter_map(|(k, v)| remove_null(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        other => Some(other.clone()),
    }
}

fn scrub(text: &str) -> String {
    text.replace('\n', " ").replace("\\\"", "").replace('\t', " ")
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => scrub(s),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => scrub(&other.to_string()),
    }
}

fn sanitize(key: &str, value: Value, list_delimiter: Option<&str>) -> Value {
    match (value, list_delimiter) {
        (Value::Array(items), Some(delimiter)) => Value::String(
            items
                .iter()
                .map(render)
                .collect::<Vec<_>>()
                .join(delimiter),
        ),
        (Value::Array(items), None) => Value::Array(
            items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Value::String(scrub(&s)),
                    other => other,
                })
                .collect(),
        ),
        (Value::Bool(b), _) => Value::Bool(b),
        (other, None) if LIST_COLUMNS.contains(&key) => Value::Array(vec![Value::String(render(&other))]),
        (other, _) => Value::String(render(&other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn export_row_joins_lists_and_scrubs_text() {
        let record = json!({
            "id": "X:1",
            "name": "two\tpart\nname",
            "synonym": ["a", null, "b"],
            "description": null,
            "negated": true,
        });
        let row = build_export_row(record.as_object().unwrap(), Some("|"));
        assert_eq!(row["name"], json!("two part name"));
        assert_eq!(row["synonym"], json!("a|b"));
        assert_eq!(row["negated"], json!(true));
        assert!(!row.contains_key("description"));
    }

    #[test]
    fn list_columns_stay_lists_without_a_delimiter() {
        let record = json!({"id": "X:1", "category": "biolink:Gene", "score": 2});
        let row = build_export_row(record.as_object().unwrap(), None);
        assert_eq!(row["category"], json!(["biolink:Gene"]));
        assert_eq!(row["score"], json!("2"));
    }
}
