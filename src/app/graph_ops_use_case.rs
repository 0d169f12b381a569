use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::pipeline::storage::{file_sink, GraphSink, JsonlSink, SinkFormat, SinkOptions};
use crate::pipeline::validation::{
    deduplicate, prune, DeduplicateOutcome, GraphStats, GraphTables, PruneOptions, PruneOutcome,
    SchemaParser,
};
use crate::types::Record;

/// Which clean-up steps to run; deduplication runs before pruning.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanOptions {
    pub deduplicate: bool,
    pub prune: bool,
    pub remove_singletons: bool,
}

/// What a clean-up run removed, and the statistics of the graph it wrote.
#[derive(Debug)]
pub struct CleanOutcome {
    pub deduplicated: Option<DeduplicateOutcome>,
    pub pruned: Option<PruneOutcome>,
    pub stats: GraphStats,
}

/// Use case for graph statistics and clean-up over written KGX files
pub struct GraphOpsUseCase {
    schema: SchemaParser,
}

impl GraphOpsUseCase {
    /// The schema only decides which TSV columns are split into lists.
    pub fn new(schema_path: Option<&Path>) -> Self {
        Self {
            schema: SchemaParser::load(schema_path),
        }
    }

    pub fn stats(&self, nodes: Option<&Path>, edges: Option<&Path>) -> Result<GraphStats> {
        let graph = GraphTables::load(nodes, edges, &self.schema)
            .context("Failed to load graph tables")?;
        Ok(GraphStats::collect(&graph))
    }

    /// Load, clean and rewrite a graph as `{name}_nodes.*` and `{name}_edges.*`.
    ///
    /// Removed rows are kept beside the output as JSON lines:
    /// `{name}_duplicates_*.jsonl` and `{name}_pruned_*.jsonl`.
    pub fn clean(
        &self,
        nodes: Option<&Path>,
        edges: Option<&Path>,
        options: CleanOptions,
        output_dir: &Path,
        name: &str,
        format: SinkFormat,
    ) -> Result<CleanOutcome> {
        if format == SinkFormat::Passthrough {
            bail!("clean writes files; choose tsv or jsonl");
        }
        let mut graph = GraphTables::load(nodes, edges, &self.schema)
            .context("Failed to load graph tables")?;

        let deduplicated = options.deduplicate.then(|| deduplicate(&mut graph));
        if let Some(outcome) = &deduplicated {
            write_removed(
                output_dir,
                &format!("{name}_duplicates"),
                &outcome.duplicate_nodes,
                &outcome.duplicate_edges,
            )?;
        }
        let pruned = options.prune.then(|| {
            prune(
                &mut graph,
                PruneOptions {
                    remove_singletons: options.remove_singletons,
                },
            )
        });
        if let Some(outcome) = &pruned {
            write_removed(
                output_dir,
                &format!("{name}_pruned"),
                &outcome.singleton_nodes,
                &outcome.dangling_edges,
            )?;
        }

        let mut sink = file_sink(format, output_dir, name, SinkOptions::default())?;
        write_tables(sink.as_mut(), &graph)?;
        let stats = GraphStats::collect(&graph);
        info!(
            dir = %output_dir.display(),
            name,
            nodes = stats.total_nodes,
            edges = stats.total_edges,
            "Wrote cleaned graph"
        );
        Ok(CleanOutcome {
            deduplicated,
            pruned,
            stats,
        })
    }
}

fn write_tables(sink: &mut dyn GraphSink, graph: &GraphTables) -> Result<()> {
    for row in graph.nodes.iter().flat_map(|t| t.rows()) {
        sink.write_node(row.clone())?;
    }
    for row in graph.edges.iter().flat_map(|t| t.rows()) {
        sink.write_edge(row.clone())?;
    }
    sink.finish()?;
    Ok(())
}

fn write_removed(output_dir: &Path, name: &str, nodes: &[Record], edges: &[Record]) -> Result<()> {
    if nodes.is_empty() && edges.is_empty() {
        return Ok(());
    }
    let mut sink = JsonlSink::new(output_dir, name)
        .with_context(|| format!("Failed to open {}", output_dir.join(name).display()))?;
    for row in nodes {
        sink.write_node(row.clone())?;
    }
    for row in edges {
        sink.write_edge(row.clone())?;
    }
    sink.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_graph(dir: &Path) -> (PathBuf, PathBuf) {
        let nodes = dir.join("in_nodes.tsv");
        let edges = dir.join("in_edges.tsv");
        fs::write(
            &nodes,
            "id\tcategory\tname\n\
             A:1\tbiolink:Gene\tone\n\
             A:2\tbiolink:Gene\ttwo\n\
             A:1\tbiolink:Gene\tone again\n\
             A:3\tbiolink:Gene\tlonely\n",
        )
        .unwrap();
        fs::write(
            &edges,
            "id\tsubject\tpredicate\tobject\n\
             e1\tA:1\tbiolink:related_to\tA:2\n\
             e2\tA:1\tbiolink:related_to\tB:9\n",
        )
        .unwrap();
        (nodes, edges)
    }

    #[test]
    fn stats_read_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let (nodes, edges) = write_graph(dir.path());
        let stats = GraphOpsUseCase::new(None)
            .stats(Some(&nodes), Some(&edges))
            .unwrap();
        assert_eq!((stats.total_nodes, stats.total_edges), (4, 2));
        assert_eq!(stats.dangling_edges, 1);
        assert_eq!(stats.singleton_nodes, 1);
        assert_eq!(stats.duplicate_node_rows, 1);
    }

    #[test]
    fn clean_rewrites_the_graph_and_keeps_what_it_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (nodes, edges) = write_graph(dir.path());
        let out = dir.path().join("out");
        let options = CleanOptions {
            deduplicate: true,
            prune: true,
            remove_singletons: true,
        };
        let outcome = GraphOpsUseCase::new(None)
            .clean(Some(&nodes), Some(&edges), options, &out, "clean", SinkFormat::Tsv)
            .unwrap();

        assert_eq!(outcome.deduplicated.as_ref().map(|d| d.nodes_removed), Some(1));
        assert_eq!(outcome.pruned.as_ref().map(|p| p.dangling_edges.len()), Some(1));
        assert_eq!((outcome.stats.total_nodes, outcome.stats.total_edges), (2, 1));
        assert_eq!(outcome.stats.dangling_edges, 0);

        let written = fs::read_to_string(out.join("clean_nodes.tsv")).unwrap();
        assert_eq!(written.lines().count(), 3);
        assert!(!written.contains("lonely"));
        let pruned = fs::read_to_string(out.join("clean_pruned_edges.jsonl")).unwrap();
        assert!(pruned.contains("B:9"));
        assert!(out.join("clean_duplicates_nodes.jsonl").exists());
        assert!(!out.join("clean_duplicates_edges.jsonl").exists());
    }

    #[test]
    fn clean_refuses_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let (nodes, _) = write_graph(dir.path());
        let err = GraphOpsUseCase::new(None)
            .clean(Some(&nodes), None, CleanOptions::default(), dir.path(), "x", SinkFormat::Passthrough)
            .unwrap_err();
        assert!(err.to_string().contains("tsv or jsonl"));
    }
}
