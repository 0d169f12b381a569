use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::pipeline::ingestion::reader::ReaderConfig;
use crate::pipeline::ingestion::resource::is_remote;
use crate::pipeline::processing::lookup::{MapConfig, OnMapFailure, SssomConfig};
use crate::pipeline::storage::{SinkFormat, SinkOptions};
use crate::types::Record;

/// One ingest source: how to read it, transform it and write it.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub metadata: SourceMetadata,
    /// Sources that must run before this one
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Directory of the config file; relative paths resolve against it
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub mappings: Vec<MapConfig>,
    pub on_map_failure: OnMapFailure,
    /// Fields a transform may merge into what it writes
    pub extra_fields: Record,
    /// YAML file with `global` and `local` term tables
    pub translation_table: Option<String>,
    /// Rewrite prefix synonyms in `id`, `subject` and `object`
    pub clean_curies: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub format: SinkFormat,
    pub node_properties: Vec<String>,
    pub edge_properties: Vec<String>,
    pub sssom: Option<SssomConfig>,
    pub min_node_count: Option<usize>,
    pub min_edge_count: Option<usize>,
}

impl WriterConfig {
    pub fn sink_options(&self) -> SinkOptions {
        SinkOptions {
            node_properties: self.node_properties.clone(),
            edge_properties: self.edge_properties.clone(),
            sssom_columns: self.sssom.is_some(),
        }
    }
}

/// Descriptive information about where a source comes from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceMetadata {
    pub description: Option<String>,
    pub url: Option<String>,
    pub license: Option<String>,
    pub provided_by: Option<String>,
}

impl SourceConfig {
    /// Load a source config: YAML for `.yaml`/`.yml`, TOML otherwise.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let mut config: SourceConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        config.base_dir = path.parent().map(Path::to_path_buf);
        config.validate()?;
        debug!(source = %config.name, path = %path.display(), "Loaded source config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(IngestError::Config("source name must not be empty".into()));
        }
        if self.reader.files.is_empty() {
            return Err(IngestError::Config(format!(
                "source '{}' lists no files",
                self.name
            )));
        }
        self.reader.validate()?;
        for map in &self.transform.mappings {
            map.reader.validate()?;
        }
        Ok(())
    }

    /// Resolve a path from the config against its directory.
    pub fn resolve(&self, file: &str) -> PathBuf {
        match &self.base_dir {
            Some(dir) if !is_remote(file) && Path::new(file).is_relative() => dir.join(file),
            _ => PathBuf::from(file),
        }
    }
}

/// Order sources so each runs after everything in its `depends_on`.
///
/// Sources with no ordering constraint between them keep their input order.
/// An unknown dependency or a cycle is a configuration error.
pub fn order_sources(configs: Vec<SourceConfig>) -> Result<Vec<SourceConfig>> {
    let index: HashMap<&str, usize> = configs
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.as_str(), i))
        .collect();
    if index.len() != configs.len() {
        return Err(IngestError::Config("source names must be unique".into()));
    }

    let mut blocked_by = vec![0usize; configs.len()];
    let mut unblocks: Vec<Vec<usize>> = vec![Vec::new(); configs.len()];
    for (i, config) in configs.iter().enumerate() {
        for dependency in &config.depends_on {
            let &d = index.get(dependency.as_str()).ok_or_else(|| {
                IngestError::Config(format!(
                    "source '{}' depends on unknown source '{}'",
                    config.name, dependency
                ))
            })?;
            blocked_by[i] += 1;
            unblocks[d].push(i);
        }
    }

    let mut ready: VecDeque<usize> = (0..configs.len()).filter(|&i| blocked_by[i] == 0).collect();
    let mut order = Vec::with_capacity(configs.len());
    while let Some(i) = ready.pop_front() {
        order.push(i);
        let mut released: Vec<usize> = Vec::new();
        for &next in &unblocks[i] {
            blocked_by[next] -= 1;
            if blocked_by[next] == 0 {
                released.push(next);
            }
        }
        released.sort_unstable();
        ready.extend(released);
    }

    if order.len() != configs.len() {
        let stuck: Vec<&str> = (0..configs.len())
            .filter(|i| !order.contains(i))
            .map(|i| configs[i].name.as_str())
            .collect();
        return Err(IngestError::Config(format!(
            "dependency cycle between sources: {}",
            stuck.join(", ")
        )));
    }

    let mut slots: Vec<Option<SourceConfig>> = configs.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}
