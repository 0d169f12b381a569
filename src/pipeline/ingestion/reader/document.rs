use std::io::Read;

use serde_json::Value;

use super::{project, ReaderConfig, ReaderFormat};
use crate::error::{IngestError, Result};
use crate::types::Record;

/// Whole-document JSON or YAML reader.
///
/// The document is parsed up front; `json_path` walks into it (object keys,
/// or indexes into lists) and the value found there yields one record per
/// list element, or a single record for an object.
pub struct DocumentReader {
    source_name: String,
    required: Vec<String>,
    items: std::vec::IntoIter<Value>,
}

impl DocumentReader {
    pub fn new<R: Read>(
        source_name: impl Into<String>,
        mut input: R,
        config: &ReaderConfig,
    ) -> Result<Self> {
        let source_name = source_name.into();
        let mut text = String::new();
        input.read_to_string(&mut text)?;

        let document: Value = match config.format {
            ReaderFormat::Yaml => serde_yaml::from_str(&text)?,
            _ => serde_json::from_str(&text)?,
        };

        let mut node = &document;
        for step in &config.json_path {
            node = match node {
                Value::Object(map) => map.get(step),
                Value::Array(items) => step.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(|| {
                IngestError::Config(format!(
                    "json_path {:?} not found in {}",
                    config.json_path, source_name
                ))
            })?;
        }

        let items = match node {
            Value::Array(items) => items.clone(),
            Value::Object(_) => vec![node.clone()],
            Value::Null => Vec::new(),
            other => {
                return Err(IngestError::Config(format!(
                    "{source_name}: expected an object or a list of objects, found {other}"
                )))
            }
        };

        Ok(Self {
            source_name,
            required: config.required_properties.clone(),
            items: items.into_iter(),
        })
    }
}

impl Iterator for DocumentReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.next()?;
        Some(match item {
            Value::Object(record) => project(&self.source_name, record, &self.required),
            other => Err(IngestError::Config(format!(
                "{}: list element is not an object: {}",
                self.source_name, other
            ))),
        })
    }
}
