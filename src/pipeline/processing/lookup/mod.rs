//! Lookup tables consulted by transforms: direct key maps, translation
//! tables and SSSOM crosswalks.

pub mod sssom;
pub mod translation;

pub use sssom::{parse_sssom, MatchType, SssomConfig, SssomCrosswalk, SssomMapping};
pub use translation::TranslationTable;

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{IngestError, Result};
use crate::pipeline::ingestion::reader::ReaderConfig;
use crate::pipeline::ingestion::source::Source;
use crate::types::{scalar_to_string, Record};

/// What a transform's lookup does when a key has no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnMapFailure {
    /// Log and hand back the key unchanged
    #[default]
    Warning,
    Error,
}

/// A map file: one entry per row, keyed by `key`, holding the `values` columns.
#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    pub name: String,
    pub key: String,
    pub values: Vec<String>,
    pub reader: ReaderConfig,
}

/// Immutable key to sub-record index built once per run.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    name: String,
    entries: HashMap<String, Record>,
}

impl LookupTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.entries.get(key)
    }

    /// Add one entry; keys are unique within a table.
    pub fn insert(&mut self, key: impl Into<String>, values: Record) -> Result<()> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(IngestError::DuplicateKey {
                key,
                context: format!("map '{}'", self.name),
            });
        }
        self.entries.insert(key, values);
        Ok(())
    }

    /// Index a record stream by `key_column`, keeping only `value_columns`.
    pub fn from_records<I>(
        name: impl Into<String>,
        key_column: &str,
        value_columns: &[String],
        records: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        let mut table = Self::new(name);
        for record in records {
            let record = record?;
            let key = match record.get(key_column) {
                Some(value) if !value.is_null() => scalar_to_string(value),
                _ => {
                    return Err(IngestError::Config(format!(
                        "map '{}' row has no key column '{}'",
                        table.name, key_column
                    )))
                }
            };
            let values: Record = record
                .into_iter()
                .filter(|(column, _)| value_columns.contains(column))
                .collect();
            table.insert(key, values)?;
        }
        Ok(table)
    }

    /// Build a table by reading a map file through a [`Source`].
    pub fn load(config: &MapConfig, base_dir: Option<&Path>) -> Result<Self> {
        let mut source = Source::new(config.name.clone(), config.reader.clone())?;
        if let Some(dir) = base_dir {
            source = source.with_base_dir(dir);
        }
        let table = Self::from_records(config.name.clone(), &config.key, &config.values, source)?;
        info!(map = %table.name, entries = table.len(), "Loaded map");
        Ok(table)
    }
}

/// The named lookup tables of one run, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct Mappings {
    tables: Vec<LookupTable>,
    on_map_failure: OnMapFailure,
}

impl Mappings {
    pub fn new(on_map_failure: OnMapFailure) -> Self {
        Self {
            tables: Vec::new(),
            on_map_failure,
        }
    }

    pub fn with_table(mut self, table: LookupTable) -> Self {
        self.add(table);
        self
    }

    pub fn add(&mut self, table: LookupTable) {
        self.tables.push(table);
    }

    pub fn load_all(
        configs: &[MapConfig],
        on_map_failure: OnMapFailure,
        base_dir: Option<&Path>,
    ) -> Result<Self> {
        let mut mappings = Self::new(on_map_failure);
        for config in configs {
            mappings.add(LookupTable::load(config, base_dir)?);
        }
        Ok(mappings)
    }

    pub fn table(&self, name: &str) -> Option<&LookupTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// The value of `column` for `key`, from the named table or, without a
    /// name, from the first table that holds the key.
    ///
    /// A miss follows the configured policy: with `warning` it is logged and
    /// the key itself comes back; with `error` it is a `LookupMiss`.
    pub fn lookup(&self, key: &str, column: &str, map_name: Option<&str>) -> Result<Value> {
        let found = match map_name {
            Some(name) => {
                let table = self.table(name).ok_or_else(|| {
                    IngestError::Config(format!("map '{name}' does not exist"))
                })?;
                table.get(key).and_then(|values| values.get(column))
            }
            None => self
                .tables
                .iter()
                .find_map(|t| t.get(key))
                .and_then(|values| values.get(column)),
        };

        match found {
            Some(value) if !value.is_null() => Ok(value.clone()),
            _ => {
                let map = map_name.unwrap_or("*").to_string();
                match self.on_map_failure {
                    OnMapFailure::Warning => {
                        warn!(key, column, map = %map, "Lookup miss, keeping key");
                        Ok(Value::String(key.to_string()))
                    }
                    OnMapFailure::Error => Err(IngestError::LookupMiss {
                        map,
                        key: key.to_string(),
                        column: column.to_string(),
                    }),
                }
            }
        }
    }
}
