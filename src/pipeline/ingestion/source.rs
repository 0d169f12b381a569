use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{debug, info, info_span};

use super::filter::RowFilter;
use super::reader::{open_records, ReaderConfig, RecordStream};
use super::resource::{is_remote, OpenedResource, Progress, ResourceOpener};
use crate::error::Result;
use crate::metrics::IngestMetrics;
use crate::types::Record;

/// Row counts for one pass over a source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub files: usize,
    pub members: usize,
    pub rows_read: usize,
    pub rows_filtered: usize,
    pub rows_emitted: usize,
}

/// Every record of every configured file, in order.
///
/// Files are opened one at a time; archives are walked member by member.
/// Filters and the optional row limit apply across all files. Iteration
/// stops after the first error.
pub struct Source {
    name: String,
    config: ReaderConfig,
    base_dir: Option<PathBuf>,
    opener: ResourceOpener,
    filter: RowFilter,
    row_limit: Option<usize>,
    pending: VecDeque<String>,
    resource: Option<OpenedResource>,
    records: Option<(String, Progress, RecordStream)>,
    stats: SourceStats,
    finished: bool,
}

impl Source {
    pub fn new(name: impl Into<String>, config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            filter: RowFilter::new(config.filters.clone()),
            pending: config.files.iter().cloned().collect(),
            config,
            base_dir: None,
            opener: ResourceOpener::default(),
            row_limit: None,
            resource: None,
            records: None,
            stats: SourceStats::default(),
            finished: false,
        })
    }

    /// Resolve relative file paths against this directory.
    pub fn with_base_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.base_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_opener(mut self, opener: ResourceOpener) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_row_limit(mut self, limit: Option<usize>) -> Self {
        self.row_limit = limit.filter(|l| *l > 0);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> SourceStats {
        self.stats
    }

    fn resolve(&self, file: &str) -> String {
        match &self.base_dir {
            Some(dir) if !is_remote(file) && Path::new(file).is_relative() => {
                dir.join(file).to_string_lossy().into_owned()
            }
            _ => file.to_string(),
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.records = None;
        self.resource = None;
        info!(
            source = %self.name,
            files = self.stats.files,
            rows_read = self.stats.rows_read,
            rows_filtered = self.stats.rows_filtered,
            rows_emitted = self.stats.rows_emitted,
            "Source exhausted"
        );
        IngestMetrics::record_source_finished(
            self.stats.rows_read,
            self.stats.rows_filtered,
            self.stats.rows_emitted,
        );
    }

    fn fail<T>(&mut self, err: crate::error::IngestError) -> Option<Result<T>> {
        self.finish();
        Some(Err(err))
    }
}

impl Iterator for Source {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let _span = info_span!("source", name = %self.name).entered();
        loop {
            if self.finished {
                return None;
            }
            if self
                .row_limit
                .is_some_and(|limit| self.stats.rows_emitted >= limit)
            {
                debug!(source = %self.name, "Row limit reached");
                self.finish();
                return None;
            }

            if let Some((member, progress, records)) = &mut self.records {
                match records.next() {
                    Some(Ok(record)) => {
                        self.stats.rows_read += 1;
                        if self.filter.include_row(&record) {
                            self.stats.rows_emitted += 1;
                            return Some(Ok(record));
                        }
                        self.stats.rows_filtered += 1;
                        continue;
                    }
                    Some(Err(e)) => return self.fail(e),
                    None => {
                        debug!(
                            member = %member,
                            position = progress.position(),
                            percent = progress.percent(),
                            "Finished member"
                        );
                        self.records = None;
                        continue;
                    }
                }
            }

            if let Some(resource) = &mut self.resource {
                match resource.next() {
                    Some(Ok(member)) => {
                        self.stats.members += 1;
                        let name = member.name.clone();
                        let progress = member.progress();
                        info!(member = %name, size = member.size, "Reading member");
                        match open_records(member, &self.config) {
                            Ok(records) => self.records = Some((name, progress, records)),
                            Err(e) => return self.fail(e),
                        }
                    }
                    Some(Err(e)) => return self.fail(e),
                    None => self.resource = None,
                }
                continue;
            }

            match self.pending.pop_front() {
                Some(file) => {
                    let location = self.resolve(&file);
                    match self.opener.open(&location) {
                        Ok(resource) => {
                            self.stats.files += 1;
                            info!(file = %location, format = resource.format().as_str(), "Opened file");
                            self.resource = Some(resource);
                        }
                        Err(e) => return self.fail(e),
                    }
                }
                None => {
                    self.finish();
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::pipeline::ingestion::filter::{ColumnFilter, FilterRule};
    use serde_json::json;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn reads_all_files_with_filters_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.tsv", "id\tscore\nX:1\t1\nX:2\t9\n");
        write(dir.path(), "b.tsv", "id\tscore\nX:3\t8\nX:4\t7\n");

        let mut config = ReaderConfig::default();
        config.files = vec!["a.tsv".into(), "b.tsv".into()];
        config.filters = vec![ColumnFilter::include("score", FilterRule::Gt(5.0))];

        let mut source = Source::new("scores", config)
            .unwrap()
            .with_base_dir(dir.path())
            .with_row_limit(Some(2));
        let ids: Vec<serde_json::Value> = source
            .by_ref()
            .map(|r| r.unwrap()["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("X:2"), json!("X:3")]);

        let stats = source.stats();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.rows_filtered, 1);
        assert_eq!(stats.rows_emitted, 2);
    }

    #[test]
    fn missing_file_stops_iteration_with_an_error() {
        let mut config = ReaderConfig::default();
        config.files = vec!["nope.tsv".into()];
        let mut source = Source::new("missing", config).unwrap();
        assert!(matches!(
            source.next(),
            Some(Err(IngestError::ResourceNotFound { .. }))
        ));
        assert!(source.next().is_none());
    }
}
