use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, info_span};

use crate::config::SourceConfig;
use crate::curie::CurieCleaner;
use crate::pipeline::ingestion::{ResourceOpener, Source};
use crate::pipeline::processing::lookup::{Mappings, SssomCrosswalk, TranslationTable};
use crate::pipeline::processing::transform::{
    RecordOutcome, RunSummary, Transform, TransformContext, TransformRunner,
};
use crate::pipeline::storage::{file_sink, GraphSink, InMemorySink, SinkFormat};
use crate::types::Record;

/// Result of ingesting one source
#[derive(Debug)]
pub struct IngestOutcome {
    pub summary: RunSummary,
    /// The graph itself when the writer format is `passthrough`
    pub graph: Option<InMemorySink>,
}

/// Use case for running a config-driven transform over one source
pub struct IngestUseCase {
    output_dir: PathBuf,
    format: Option<SinkFormat>,
    row_limit: Option<usize>,
}

impl IngestUseCase {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            format: None,
            row_limit: None,
        }
    }

    /// Override the writer format of every source
    pub fn with_format(mut self, format: Option<SinkFormat>) -> Self {
        self.format = format;
        self
    }

    pub fn with_row_limit(mut self, row_limit: Option<usize>) -> Self {
        self.row_limit = row_limit;
        self
    }

    /// Read, transform and write one source.
    pub fn run(&self, config: &SourceConfig) -> Result<IngestOutcome> {
        let _span = info_span!("ingest", source = %config.name).entered();
        log_metadata(config);

        let base_dir = config.base_dir.as_deref();
        let mut runner = self.build_runner(config)?;

        let mut source = Source::new(config.name.clone(), config.reader.clone())?
            .with_row_limit(self.row_limit);
        if let Some(dir) = base_dir {
            source = source.with_base_dir(dir);
        }

        let format = self.format.unwrap_or(config.writer.format);
        if format == SinkFormat::Passthrough {
            let mut sink = InMemorySink::new();
            let summary = runner.run(source, &mut sink)?;
            return Ok(IngestOutcome {
                summary,
                graph: Some(sink),
            });
        }

        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory {}", self.output_dir.display())
        })?;
        let mut sink: Box<dyn GraphSink> = file_sink(
            format,
            &self.output_dir,
            &config.name,
            config.writer.sink_options(),
        )?;
        let summary = runner.run(source, sink.as_mut())?;
        info!(
            source = %config.name,
            output_dir = %self.output_dir.display(),
            nodes = summary.nodes,
            edges = summary.edges,
            "Wrote source output"
        );
        Ok(IngestOutcome {
            summary,
            graph: None,
        })
    }

    /// Run every source in order, stopping at the first failure.
    pub fn run_all(&self, configs: &[SourceConfig]) -> Result<Vec<IngestOutcome>> {
        configs
            .iter()
            .map(|config| {
                self.run(config)
                    .with_context(|| format!("source '{}' failed", config.name))
            })
            .collect()
    }

    fn build_runner(&self, config: &SourceConfig) -> Result<TransformRunner> {
        let base_dir = config.base_dir.as_deref();
        let transform_config = &config.transform;

        let mappings =
            Mappings::load_all(&transform_config.mappings, transform_config.on_map_failure, base_dir)?;
        let mut context = TransformContext::new(config.name.clone())
            .with_mappings(mappings)
            .with_extra_fields(transform_config.extra_fields.clone());
        if let Some(file) = &transform_config.translation_table {
            let path = config.resolve(file);
            let table = TranslationTable::load(&path)
                .with_context(|| format!("Failed to load translation table {}", path.display()))?;
            context = context.with_translation(table);
        }

        let transform = passthrough_transform(&config.name, transform_config.clean_curies)?;
        let mut runner = TransformRunner::new(transform, context)
            .with_min_counts(config.writer.min_node_count, config.writer.min_edge_count);
        if let Some(sssom) = &config.writer.sssom {
            let crosswalk = SssomCrosswalk::load(sssom, &ResourceOpener::default(), base_dir)?;
            info!(mappings = crosswalk.len(), "Loaded SSSOM crosswalk");
            runner = runner.with_crosswalk(crosswalk);
        }
        Ok(runner)
    }
}

/// Writes records that are already KGX nodes or edges, adding the source's
/// extra fields where a record has none of its own.
pub fn passthrough_transform(name: &str, clean_curies: bool) -> crate::error::Result<Transform> {
    let cleaner = clean_curies.then(CurieCleaner::default);
    Transform::builder(name)
        .transform_record(move |ctx: &mut TransformContext, mut record: Record| {
            if let Some(cleaner) = &cleaner {
                clean_identifiers(cleaner, &mut record);
            }
            for (key, value) in ctx.extra_fields() {
                record.entry(key.clone()).or_insert_with(|| value.clone());
            }
            ctx.write(&record)?;
            Ok(RecordOutcome::Continue)
        })
        .build()
}

fn clean_identifiers(cleaner: &CurieCleaner, record: &mut Record) {
    for field in ["id", "subject", "object"] {
        if let Some(serde_json::Value::String(id)) = record.get_mut(field) {
            *id = cleaner.clean(id);
        }
    }
}

fn log_metadata(config: &SourceConfig) {
    let metadata = &config.metadata;
    info!(
        source = %config.name,
        description = metadata.description.as_deref().unwrap_or(""),
        license = metadata.license.as_deref().unwrap_or(""),
        provided_by = metadata.provided_by.as_deref().unwrap_or(""),
        url = metadata.url.as_deref().unwrap_or(""),
        "Starting source"
    );
}

/// Paths a file sink writes for `name`.
pub fn output_paths(output_dir: &Path, name: &str, format: SinkFormat) -> Option<(PathBuf, PathBuf)> {
    let extension = match format {
        SinkFormat::Tsv => "tsv",
        SinkFormat::Jsonl => "jsonl",
        SinkFormat::Passthrough => return None,
    };
    Some((
        output_dir.join(format!("{name}_nodes.{extension}")),
        output_dir.join(format!("{name}_edges.{extension}")),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SourceMetadata, TransformConfig, WriterConfig};
    use crate::pipeline::ingestion::ReaderConfig;
    use serde_json::json;

    fn tsv_source(dir: &Path, format: SinkFormat) -> SourceConfig {
        fs::write(
            dir.join("graph.tsv"),
            "id\tcategory\tname\n\
             taxon:9606\tbiolink:OrganismTaxon\thuman\n\
             HGNC:1\tbiolink:Gene\tBRCA1\n",
        )
        .unwrap();
        let mut transform = TransformConfig {
            clean_curies: true,
            ..TransformConfig::default()
        };
        transform
            .extra_fields
            .insert("provided_by".into(), json!("infores:example"));
        SourceConfig {
            name: "example".into(),
            reader: ReaderConfig {
                files: vec!["graph.tsv".into()],
                ..ReaderConfig::default()
            },
            transform,
            writer: WriterConfig {
                format,
                ..WriterConfig::default()
            },
            metadata: SourceMetadata::default(),
            depends_on: Vec::new(),
            base_dir: Some(dir.to_path_buf()),
        }
    }

    #[test]
    fn passthrough_keeps_the_graph_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let config = tsv_source(dir.path(), SinkFormat::Passthrough);
        let outcome = IngestUseCase::new(dir.path().join("out")).run(&config).unwrap();
        let graph = outcome.graph.expect("passthrough graph");
        assert_eq!(outcome.summary.records_read, 2);
        assert_eq!(graph.len(), 2);
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn transform_writes_files_with_clean_curies() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = tsv_source(dir.path(), SinkFormat::Jsonl);
        config.writer.min_node_count = Some(2);
        let out = dir.path().join("out");
        let outcome = IngestUseCase::new(&out).run(&config).unwrap();
        assert_eq!(outcome.summary.nodes, 2);

        let (nodes, _) = output_paths(&out, "example", SinkFormat::Jsonl).unwrap();
        let written = fs::read_to_string(nodes).unwrap();
        let first: serde_json::Value = serde_json::from_str(written.lines().next().unwrap()).unwrap();
        assert_eq!(first["id"], json!("NCBITaxon:9606"));
        assert_eq!(first["provided_by"], json!("infores:example"));
    }

    #[test]
    fn row_limit_and_format_override() {
        let dir = tempfile::tempdir().unwrap();
        let config = tsv_source(dir.path(), SinkFormat::Tsv);
        fs::write(
            dir.path().join("graph.tsv"),
            "id\tcategory\tname\nA:1\tbiolink:Gene\tone\nA:2\tbiolink:Gene\ttwo\nA:3\tbiolink:Gene\tthree\n",
        )
        .unwrap();
        let outcome = IngestUseCase::new(dir.path().join("out"))
            .with_format(Some(SinkFormat::Passthrough))
            .with_row_limit(Some(2))
            .run(&config)
            .unwrap();
        assert_eq!(outcome.summary.records_read, 2);
        assert_eq!(outcome.graph.map(|g| g.len()), Some(2));
    }
}
