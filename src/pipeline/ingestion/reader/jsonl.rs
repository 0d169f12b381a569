use std::io::BufRead;

use serde_json::Value;
use tracing::debug;

use super::project;
use crate::error::{IngestError, Result};
use crate::types::Record;

/// One JSON object per line. A blank line ends the stream.
pub struct JsonLinesReader<R: BufRead> {
    source_name: String,
    input: R,
    required: Vec<String>,
    line: String,
    line_number: u64,
    done: bool,
}

impl<R: BufRead> JsonLinesReader<R> {
    pub fn new(source_name: impl Into<String>, input: R, required: Vec<String>) -> Self {
        Self {
            source_name: source_name.into(),
            input,
            required,
            line: String::new(),
            line_number: 0,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for JsonLinesReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.line.clear();
        match self.input.read_line(&mut self.line) {
            Ok(0) => {
                self.done = true;
                return None;
            }
            Ok(_) => self.line_number += 1,
            Err(e) => {
                self.done = true;
                return Some(Err(e.into()));
            }
        }
        if self.line.trim().is_empty() {
            debug!(source = %self.source_name, line = self.line_number, "Blank line ends JSON lines stream");
            self.done = true;
            return None;
        }

        let record = match serde_json::from_str::<Value>(&self.line) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Some(Err(IngestError::Config(format!(
                    "{} line {} is not a JSON object: {}",
                    self.source_name, self.line_number, other
                ))))
            }
            Err(e) => return Some(Err(e.into())),
        };
        Some(project(&self.source_name, record, &self.required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn blank_line_ends_the_stream() {
        let text = "{\"id\": \"X:1\"}\n{\"id\": \"X:2\"}\n\n{\"id\": \"X:3\"}\n";
        let records: Vec<Record> = JsonLinesReader::new("rows.jsonl", Cursor::new(text), vec![])
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["id"], json!("X:2"));
    }

    #[test]
    fn projection_is_applied_per_line() {
        let text = "{\"id\": \"X:1\", \"name\": \"one\", \"extra\": true}\n{\"id\": \"X:2\"}\n";
        let mut reader = JsonLinesReader::new(
            "rows.jsonl",
            Cursor::new(text),
            vec!["name".into(), "id".into()],
        );
        let first = reader.next().unwrap().unwrap();
        assert_eq!(
            first.keys().collect::<Vec<_>>(),
            vec!["name", "id"]
        );
        match reader.next().unwrap() {
            Err(IngestError::Projection { missing, .. }) => assert_eq!(missing, vec!["name"]),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
