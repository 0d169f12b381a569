use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use super::GraphSink;
use crate::error::Result;
use crate::types::Record;

/// Writes `{name}_nodes.jsonl` and `{name}_edges.jsonl`; each file is created
/// on its first write, so a run without edges leaves no edge file.
pub struct JsonlSink {
    output_dir: PathBuf,
    name: String,
    nodes: Option<BufWriter<File>>,
    edges: Option<BufWriter<File>>,
}

impl JsonlSink {
    pub fn new(output_dir: &Path, name: &str) -> Result<Self> {
        fs::create_dir_all(output_dir)?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            name: name.to_string(),
            nodes: None,
            edges: None,
        })
    }

    pub fn nodes_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_nodes.jsonl", self.name))
    }

    pub fn edges_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_edges.jsonl", self.name))
    }

    fn write_line(slot: &mut Option<BufWriter<File>>, path: PathBuf, mut record: Record) -> Result<()> {
        record.retain(|_, v| !v.is_null());
        if slot.is_none() {
            *slot = Some(BufWriter::new(File::create(path)?));
        }
        if let Some(out) = slot.as_mut() {
            serde_json::to_writer(&mut *out, &Value::Object(record))?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

impl GraphSink for JsonlSink {
    fn write_node(&mut self, node: Record) -> Result<()> {
        let path = self.nodes_path();
        Self::write_line(&mut self.nodes, path, node)
    }

    fn write_edge(&mut self, edge: Record) -> Result<()> {
        let path = self.edges_path();
        Self::write_line(&mut self.edges, path, edge)
    }

    fn finish(&mut self) -> Result<()> {
        for out in [self.nodes.as_mut(), self.edges.as_mut()].into_iter().flatten() {
            out.flush()?;
        }
        info!(dir = %self.output_dir.display(), name = %self.name, "JSON lines output written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_one_object_per_line_and_skips_unused_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonlSink::new(dir.path(), "genes").unwrap();
        sink.write_node(json!({"id": "X:1", "name": "one", "description": null}).as_object().unwrap().clone())
            .unwrap();
        sink.write_node(json!({"id": "X:2", "name": "two"}).as_object().unwrap().clone())
            .unwrap();
        sink.finish().unwrap();

        let text = fs::read_to_string(sink.nodes_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![r#"{"id":"X:1","name":"one"}"#, r#"{"id":"X:2","name":"two"}"#]);
        assert!(!sink.edges_path().exists());
    }
}
