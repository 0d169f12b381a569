use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Read};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{parse_delimiter, ColumnType, HeaderMode, ReaderConfig};
use crate::error::{IngestError, Result};
use crate::types::Record;

/// Delimited text reader.
///
/// Header lines are consumed eagerly in [`DelimitedReader::new`]; data rows
/// are parsed lazily. Short rows are padded with the configured missing
/// value, values beyond the header go to the rest field as a list, and blank
/// rows never surface as records.
pub struct DelimitedReader<R: Read> {
    source_name: String,
    fields: Vec<String>,
    types: HashMap<String, ColumnType>,
    missing_value: Value,
    rest_key: String,
    comment: Option<String>,
    rows: csv::Reader<R>,
    row: csv::StringRecord,
    emitted: u64,
}

impl<R: BufRead> DelimitedReader<R> {
    pub fn new(source_name: impl Into<String>, mut input: R, config: &ReaderConfig) -> Result<Self> {
        let source_name = source_name.into();
        config.validate()?;
        let delimiter = parse_delimiter(&config.delimiter)?;
        let header_delimiter = match &config.header_delimiter {
            Some(d) => parse_delimiter(d)?,
            None => delimiter,
        };
        let comment = config.comment_char.clone().filter(|c| !c.is_empty());

        let header = match config.header_mode {
            HeaderMode::None => None,
            HeaderMode::Infer => Some(read_header(
                &mut input,
                header_delimiter,
                config,
                comment.as_deref(),
                true,
            )?),
            HeaderMode::Line(skip) => {
                let mut discard = String::new();
                for _ in 0..skip {
                    discard.clear();
                    if input.read_line(&mut discard)? == 0 {
                        break;
                    }
                }
                Some(read_header(
                    &mut input,
                    header_delimiter,
                    config,
                    comment.as_deref(),
                    false,
                )?)
            }
        };

        let fields = match header {
            Some(header) => {
                compare_header_to_columns(&source_name, &header, config)?;
                header
            }
            None => config.columns.iter().map(|c| c.name.clone()).collect(),
        };
        if fields.is_empty() {
            return Err(IngestError::Config(format!(
                "no field names found for {source_name}"
            )));
        }
        debug!(source = %source_name, ?fields, "Delimited header");

        let types = config
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.kind))
            .collect();

        let rows = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .quoting(config.quoting)
            .from_reader(input);

        Ok(Self {
            source_name,
            fields,
            types,
            missing_value: config.missing_value.clone(),
            rest_key: config.rest_key.clone(),
            comment,
            rows,
            row: csv::StringRecord::new(),
            emitted: 0,
        })
    }
}

impl<R: Read> DelimitedReader<R> {
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    fn build_record(&self) -> Option<Result<Record>> {
        let values: Vec<&str> = self.row.iter().map(str::trim).collect();
        if values.iter().all(|v| v.is_empty()) {
            return None;
        }
        if let (Some(comment), Some(first)) = (&self.comment, values.first()) {
            if first.starts_with(comment.as_str()) {
                return None;
            }
        }

        let mut record = Record::new();
        for (i, field) in self.fields.iter().enumerate() {
            let value = match values.get(i) {
                Some(raw) => match self.coerce(field, raw) {
                    Ok(value) => value,
                    Err(e) => return Some(Err(e)),
                },
                None => self.missing_value.clone(),
            };
            record.insert(field.clone(), value);
        }

        if values.len() > self.fields.len() {
            let extra = values[self.fields.len()..]
                .iter()
                .map(|v| Value::String(v.to_string()))
                .collect();
            record.insert(self.rest_key.clone(), Value::Array(extra));
        }
        Some(Ok(record))
    }

    fn coerce(&self, field: &str, raw: &str) -> Result<Value> {
        let kind = self.types.get(field).copied().unwrap_or(ColumnType::Str);
        if raw.is_empty() && kind != ColumnType::Str {
            return Ok(self.missing_value.clone());
        }
        let line = self.row.position().map(|p| p.line()).unwrap_or_default();
        let invalid = |expected: &str| {
            IngestError::Config(format!(
                "{}: column '{}' expects {} but line {} has '{}'",
                self.source_name, field, expected, line, raw
            ))
        };
        Ok(match kind {
            ColumnType::Str => Value::String(raw.to_string()),
            ColumnType::Int => Value::from(raw.parse::<i64>().map_err(|_| invalid("int"))?),
            ColumnType::Float => {
                let parsed = raw.parse::<f64>().map_err(|_| invalid("float"))?;
                serde_json::Number::from_f64(parsed)
                    .map(Value::Number)
                    .ok_or_else(|| invalid("a finite float"))?
            }
        })
    }
}

impl<R: Read> Iterator for DelimitedReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.rows.read_record(&mut self.row) {
                Ok(false) => {
                    info!(source = %self.source_name, rows = self.emitted, "Finished reading rows");
                    return None;
                }
                Err(e) => return Some(Err(e.into())),
                Ok(true) => {
                    if let Some(record) = self.build_record() {
                        if record.is_ok() {
                            self.emitted += 1;
                        }
                        return Some(record);
                    }
                }
            }
        }
    }
}

fn read_header<R: BufRead>(
    input: &mut R,
    delimiter: u8,
    config: &ReaderConfig,
    comment: Option<&str>,
    skip_blank_or_commented: bool,
) -> Result<Vec<String>> {
    let mut line = String::new();
    let mut first = true;
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(IngestError::Config(
                "reached end of input before a header line".into(),
            ));
        }
        let mut fields = split_line(line.trim_end_matches(['\r', '\n']), delimiter, config.quoting)?;

        // Prefix removal comes first: a prefix like '#' would otherwise read as a comment
        if first {
            if let (Some(prefix), Some(head)) = (&config.header_prefix, fields.first_mut()) {
                *head = head.trim_start_matches(prefix.as_str()).to_string();
            }
            first = false;
        }

        if skip_blank_or_commented {
            if fields.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            if let (Some(comment), Some(head)) = (comment, fields.first()) {
                if head.starts_with(comment) {
                    continue;
                }
            }
        }

        return Ok(fields.into_iter().map(|f| f.trim().to_string()).collect());
    }
}

fn split_line(line: &str, delimiter: u8, quoting: bool) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .quoting(quoting)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();
    if !reader.read_record(&mut record)? {
        return Ok(Vec::new());
    }
    Ok(record.iter().map(str::to_string).collect())
}

fn compare_header_to_columns(source_name: &str, header: &[String], config: &ReaderConfig) -> Result<()> {
    if config.columns.is_empty() {
        return Ok(());
    }
    let header_set: HashSet<&str> = header.iter().map(String::as_str).collect();
    let configured: Vec<&str> = config.columns.iter().map(|c| c.name.as_str()).collect();

    let missing: Vec<&str> = configured
        .iter()
        .copied()
        .filter(|c| !header_set.contains(c))
        .collect();
    if !missing.is_empty() {
        return Err(IngestError::Config(format!(
            "configured columns missing in source file {source_name}: {missing:?}"
        )));
    }

    let extra: Vec<&str> = header
        .iter()
        .map(String::as_str)
        .filter(|h| !configured.contains(h))
        .collect();
    if !extra.is_empty() {
        warn!(source = %source_name, ?extra, "Additional columns in source file");
        let leading = header.iter().take(configured.len()).map(String::as_str);
        if leading.ne(configured.iter().copied()) {
            warn!(
                source = %source_name,
                given = ?configured,
                found = ?header,
                "Additional columns located within configured fields"
            );
        }
    }
    Ok(())
}
