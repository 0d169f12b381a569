use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use super::{build_export_row, GraphSink, SinkOptions};
use crate::constants::{
    EDGE_CORE_COLUMNS, LIST_DELIMITER, NODE_CORE_COLUMNS, ORIGINAL_OBJECT, ORIGINAL_SUBJECT,
    TSV_DELIMITER,
};
use crate::error::Result;
use crate::types::{scalar_to_string, Record};

/// Core columns first in their fixed order, then the rest sorted, then
/// `_`-prefixed internal columns sorted.
pub fn order_columns<'a, I>(columns: I, core: &[&str]) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut remaining: BTreeSet<&str> = columns.into_iter().collect();
    let mut ordered: Vec<String> = Vec::new();
    for c in core {
        if remaining.remove(c) {
            ordered.push(c.to_string());
        }
    }
    let (internal, regular): (Vec<&str>, Vec<&str>) =
        remaining.into_iter().partition(|c| c.starts_with('_'));
    ordered.extend(regular.into_iter().map(str::to_string));
    ordered.extend(internal.into_iter().map(str::to_string));
    ordered
}

struct TsvTable {
    path: PathBuf,
    core: &'static [&'static str],
    extra_columns: Vec<&'static str>,
    columns: Option<Vec<String>>,
    out: Option<BufWriter<File>>,
    buffered: Vec<Record>,
    rows: usize,
}

impl TsvTable {
    fn new(
        path: PathBuf,
        core: &'static [&'static str],
        properties: &[String],
        extra_columns: Vec<&'static str>,
    ) -> Result<Self> {
        let mut table = Self {
            path,
            core,
            extra_columns,
            columns: None,
            out: None,
            buffered: Vec::new(),
            rows: 0,
        };
        if !properties.is_empty() {
            let names = properties.iter().map(String::as_str);
            table.open(names)?;
        }
        Ok(table)
    }

    fn open<'a, I: IntoIterator<Item = &'a str>>(&mut self, names: I) -> Result<()> {
        let mut names: Vec<&str> = names.into_iter().collect();
        names.extend(self.extra_columns.iter().copied());
        let columns = order_columns(names, self.core);
        let mut out = BufWriter::new(File::create(&self.path)?);
        writeln!(out, "{}", columns.join(TSV_DELIMITER))?;
        self.columns = Some(columns);
        self.out = Some(out);
        Ok(())
    }

    fn write(&mut self, record: Record) -> Result<()> {
        match (&self.columns, self.out.as_mut()) {
            (Some(columns), Some(out)) => {
                write_row(out, columns, &record)?;
                self.rows += 1;
            }
            _ => self.buffered.push(record),
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.columns.is_none() && !self.buffered.is_empty() {
            let buffered = std::mem::take(&mut self.buffered);
            let names: BTreeSet<String> = buffered
                .iter()
                .flat_map(|r| r.iter().filter(|(_, v)| !v.is_null()).map(|(k, _)| k.clone()))
                .collect();
            self.open(names.iter().map(String::as_str))?;
            for record in buffered {
                self.write(record)?;
            }
        }
        if let Some(out) = self.out.as_mut() {
            out.flush()?;
        }
        Ok(())
    }
}

fn write_row(out: &mut BufWriter<File>, columns: &[String], record: &Record) -> Result<()> {
    let row = build_export_row(record, Some(LIST_DELIMITER));
    let values: Vec<String> = columns
        .iter()
        .map(|c| match row.get(c) {
            Some(Value::Bool(true)) => "True".to_string(),
            Some(Value::Bool(false)) => "False".to_string(),
            Some(value) => scalar_to_string(value),
            None => String::new(),
        })
        .collect();
    writeln!(out, "{}", values.join(TSV_DELIMITER))?;
    Ok(())
}

/// KGX TSV output: `{name}_nodes.tsv` and `{name}_edges.tsv`.
///
/// With configured node or edge properties the header is fixed up front and
/// rows stream straight to disk; otherwise rows are held until
/// [`GraphSink::finish`] and the header is the union of their fields.
pub struct TsvSink {
    name: String,
    output_dir: PathBuf,
    nodes: TsvTable,
    edges: TsvTable,
}

impl TsvSink {
    pub fn new(output_dir: &Path, name: &str, options: SinkOptions) -> Result<Self> {
        fs::create_dir_all(output_dir)?;
        let sssom = if options.sssom_columns {
            vec![ORIGINAL_SUBJECT, ORIGINAL_OBJECT]
        } else {
            Vec::new()
        };
        Ok(Self {
            name: name.to_string(),
            output_dir: output_dir.to_path_buf(),
            nodes: TsvTable::new(
                output_dir.join(format!("{name}_nodes.tsv")),
                NODE_CORE_COLUMNS,
                &options.node_properties,
                Vec::new(),
            )?,
            edges: TsvTable::new(
                output_dir.join(format!("{name}_edges.tsv")),
                EDGE_CORE_COLUMNS,
                &options.edge_properties,
                sssom,
            )?,
        })
    }

    pub fn nodes_path(&self) -> &Path {
        &self.nodes.path
    }

    pub fn edges_path(&self) -> &Path {
        &self.edges.path
    }
}

impl GraphSink for TsvSink {
    fn write_node(&mut self, node: Record) -> Result<()> {
        self.nodes.write(node)
    }

    fn write_edge(&mut self, edge: Record) -> Result<()> {
        self.edges.write(edge)
    }

    fn finish(&mut self) -> Result<()> {
        self.nodes.finish()?;
        self.edges.finish()?;
        info!(
            dir = %self.output_dir.display(),
            name = %self.name,
            nodes = self.nodes.rows,
            edges = self.edges.rows,
            "TSV output written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn column_order_is_core_then_sorted_then_internal() {
        let ordered = order_columns(
            ["zeta", "_hidden", "name", "alpha", "id", "category"],
            NODE_CORE_COLUMNS,
        );
        assert_eq!(ordered, vec!["id", "category", "name", "alpha", "zeta", "_hidden"]);
    }

    #[test]
    fn configured_properties_fix_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let options = SinkOptions {
            node_properties: vec!["name".into(), "id".into(), "synonym".into()],
            edge_properties: vec!["subject".into(), "predicate".into(), "object".into()],
            sssom_columns: true,
        };
        let mut sink = TsvSink::new(dir.path(), "src", options).unwrap();
        sink.write_node(record(json!({"id": "X:1", "name": "a\tb", "synonym": ["s1", "s2"], "ignored": 1})))
            .unwrap();
        sink.write_edge(record(json!({
            "subject": "B:9", "predicate": "p", "object": "X:1", "original_subject": "A:1"
        })))
        .unwrap();
        sink.finish().unwrap();

        let nodes = fs::read_to_string(sink.nodes_path()).unwrap();
        assert_eq!(nodes, "id\tname\tsynonym\nX:1\ta b\ts1|s2\n");
        let edges = fs::read_to_string(sink.edges_path()).unwrap();
        assert_eq!(
            edges,
            "subject\tpredicate\tobject\toriginal_object\toriginal_subject\nB:9\tp\tX:1\t\tA:1\n"
        );
    }

    #[test]
    fn header_is_inferred_from_buffered_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = TsvSink::new(dir.path(), "src", SinkOptions::default()).unwrap();
        sink.write_node(record(json!({"id": "X:1", "name": "one"}))).unwrap();
        sink.write_node(record(json!({"id": "X:2", "name": "two", "in_taxon": "NCBITaxon:9606", "_note": null})))
            .unwrap();
        sink.finish().unwrap();

        let nodes = fs::read_to_string(sink.nodes_path()).unwrap();
        assert_eq!(nodes, "id\tname\tin_taxon\nX:1\tone\t\nX:2\ttwo\tNCBITaxon:9606\n");
        assert!(!sink.edges_path().exists());
    }
}
