//! Record readers: lazy, single-pass sequences of records over one resource.

pub mod delimited;
pub mod document;
pub mod jsonl;

pub use delimited::DelimitedReader;
pub use document::DocumentReader;
pub use jsonl::JsonLinesReader;

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::Value;

use crate::constants::DEFAULT_REST_KEY;
use crate::error::{IngestError, Result};
use crate::pipeline::ingestion::filter::ColumnFilter;
use crate::pipeline::ingestion::resource::SizedResource;
use crate::types::Record;

/// A boxed record stream, as handed out by [`open_records`].
pub type RecordStream = Box<dyn Iterator<Item = Result<Record>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReaderFormat {
    #[default]
    Csv,
    Jsonl,
    Json,
    Yaml,
}

/// Coercion applied to a delimited column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Str,
    Int,
    Float,
}

/// A declared column: a bare name, or `{name = "int"}` with a type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawColumn")]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnType::Str,
        }
    }

    pub fn typed(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumn {
    Name(String),
    Typed(BTreeMap<String, ColumnType>),
}

impl TryFrom<RawColumn> for ColumnSpec {
    type Error = String;

    fn try_from(raw: RawColumn) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawColumn::Name(name) => Ok(ColumnSpec::new(name)),
            RawColumn::Typed(map) => {
                if map.len() != 1 {
                    return Err(format!(
                        "typed column must have exactly one key, got {:?}",
                        map.keys().collect::<Vec<_>>()
                    ));
                }
                let (name, kind) = map.into_iter().next().ok_or("empty column")?;
                Ok(ColumnSpec::typed(name, kind))
            }
        }
    }
}

/// Where a delimited source gets its field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "RawHeaderMode")]
pub enum HeaderMode {
    /// First non-blank, non-comment line
    #[default]
    Infer,
    /// No header line; the configured columns are the field names
    None,
    /// Skip this many lines, then read the header
    Line(usize),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawHeaderMode {
    Keyword(String),
    Line(usize),
}

impl TryFrom<RawHeaderMode> for HeaderMode {
    type Error = String;

    fn try_from(raw: RawHeaderMode) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawHeaderMode::Line(n) => Ok(HeaderMode::Line(n)),
            RawHeaderMode::Keyword(k) => match k.as_str() {
                "infer" => Ok(HeaderMode::Infer),
                "none" => Ok(HeaderMode::None),
                other => other
                    .parse::<usize>()
                    .map(HeaderMode::Line)
                    .map_err(|_| format!("invalid header_mode '{other}'")),
            },
        }
    }
}

/// Reader settings for one source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub format: ReaderFormat,
    /// Paths or URLs, relative paths resolved against the config's directory
    pub files: Vec<String>,
    pub columns: Vec<ColumnSpec>,
    pub delimiter: String,
    pub header_mode: HeaderMode,
    pub header_delimiter: Option<String>,
    pub header_prefix: Option<String>,
    pub comment_char: Option<String>,
    pub quoting: bool,
    /// Value used to pad rows shorter than the header
    pub missing_value: Value,
    /// Field that collects values beyond the header
    pub rest_key: String,
    /// Restrict structured records to these fields
    pub required_properties: Vec<String>,
    /// Path into a JSON or YAML document to the records
    pub json_path: Vec<String>,
    pub filters: Vec<ColumnFilter>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            format: ReaderFormat::Csv,
            files: Vec::new(),
            columns: Vec::new(),
            delimiter: "\t".to_string(),
            header_mode: HeaderMode::Infer,
            header_delimiter: None,
            header_prefix: None,
            comment_char: Some("#".to_string()),
            quoting: true,
            missing_value: Value::Null,
            rest_key: DEFAULT_REST_KEY.to_string(),
            required_properties: Vec::new(),
            json_path: Vec::new(),
            filters: Vec::new(),
        }
    }
}

impl ReaderConfig {
    pub fn delimited(delimiter: &str) -> Self {
        Self {
            delimiter: delimiter.to_string(),
            ..Self::default()
        }
    }

    pub fn with_format(format: ReaderFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Checks settings that can be rejected before any file is opened.
    pub fn validate(&self) -> Result<()> {
        if self.format == ReaderFormat::Csv {
            parse_delimiter(&self.delimiter)?;
            if let Some(d) = &self.header_delimiter {
                parse_delimiter(d)?;
            }
            if self.header_mode == HeaderMode::None && self.columns.is_empty() {
                return Err(IngestError::Config(
                    "header_mode is 'none' but no columns were supplied; configure 'columns' \
                     or set header_mode to 'infer' or a line index"
                        .into(),
                ));
            }
        }
        let mut seen = BTreeSet::new();
        let duplicates: Vec<&str> = self
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .filter(|name| !seen.insert(*name))
            .collect();
        if !duplicates.is_empty() {
            return Err(IngestError::Config(format!(
                "columns are listed more than once: {duplicates:?}"
            )));
        }
        Ok(())
    }
}

/// Resolve delimiter aliases to the single byte the parser uses.
pub fn parse_delimiter(raw: &str) -> Result<u8> {
    match raw {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        "\\s" | "space" | " " => Ok(b' '),
        other if other.len() == 1 => Ok(other.as_bytes()[0]),
        other => Err(IngestError::Config(format!(
            "delimiter must be a single byte, got '{other}'"
        ))),
    }
}

/// Narrow a structured record to exactly `required`, in that order.
///
/// An empty projection returns the record unchanged.
pub fn project(source_name: &str, mut record: Record, required: &[String]) -> Result<Record> {
    if required.is_empty() {
        return Ok(record);
    }
    let missing: Vec<String> = required
        .iter()
        .filter(|field| !record.contains_key(field.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(IngestError::Projection {
            source_name: source_name.to_string(),
            missing,
        });
    }
    let mut projected = Record::new();
    for field in required {
        if let Some(value) = record.remove(field) {
            projected.insert(field.clone(), value);
        }
    }
    Ok(projected)
}

/// Build the reader for `config.format` over one resource stream.
pub fn open_records(resource: SizedResource, config: &ReaderConfig) -> Result<RecordStream> {
    let name = resource.name.clone();
    Ok(match config.format {
        ReaderFormat::Csv => Box::new(DelimitedReader::new(name, resource, config)?),
        ReaderFormat::Jsonl => Box::new(JsonLinesReader::new(
            name,
            resource,
            config.required_properties.clone(),
        )),
        ReaderFormat::Json | ReaderFormat::Yaml => {
            Box::new(DocumentReader::new(name, resource, config)?)
        }
    })
}
