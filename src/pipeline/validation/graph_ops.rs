//! Graph-level quality control over loaded node and edge tables: summary
//! statistics, pruning of dangling edges and singleton nodes, and removal of
//! rows that repeat an id.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::table::{GraphTable, GraphTables};
use crate::error::Result;
use crate::types::{curie_prefix, scalar_to_string, scalars, Record};

const UNKNOWN_SOURCE: &str = "unknown";

/// Counts describing one graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub nodes_by_category: BTreeMap<String, usize>,
    pub nodes_by_prefix: BTreeMap<String, usize>,
    pub nodes_by_source: BTreeMap<String, usize>,
    pub edges_by_predicate: BTreeMap<String, usize>,
    pub edges_by_source: BTreeMap<String, usize>,
    /// Prefixes of edge subjects and objects together
    pub endpoint_prefixes: BTreeMap<String, usize>,
    pub dangling_edges: usize,
    pub singleton_nodes: usize,
    pub duplicate_node_rows: usize,
    pub duplicate_edge_rows: usize,
}

impl GraphStats {
    pub fn collect(graph: &GraphTables) -> Self {
        let mut stats = GraphStats::default();
        let empty = HashSet::new();
        let node_ids = graph.nodes.as_ref().map(GraphTable::id_set);

        if let Some(nodes) = &graph.nodes {
            stats.total_nodes = nodes.len();
            stats.duplicate_node_rows = duplicate_rows(nodes);
            for row in nodes.rows() {
                tally_values(&mut stats.nodes_by_category, row.get("category"));
                if let Some(id) = row.get("id").and_then(Value::as_str) {
                    *stats.nodes_by_prefix.entry(curie_prefix(id).to_string()).or_default() += 1;
                }
                *stats.nodes_by_source.entry(source_of(row)).or_default() += 1;
            }
        }

        if let Some(edges) = &graph.edges {
            stats.total_edges = edges.len();
            stats.duplicate_edge_rows = duplicate_rows(edges);
            let ids = node_ids.as_ref().unwrap_or(&empty);
            for row in edges.rows() {
                tally_values(&mut stats.edges_by_predicate, row.get("predicate"));
                *stats.edges_by_source.entry(source_of(row)).or_default() += 1;
                for slot in ["subject", "object"] {
                    if let Some(endpoint) = row.get(slot).and_then(Value::as_str) {
                        *stats
                            .endpoint_prefixes
                            .entry(curie_prefix(endpoint).to_string())
                            .or_default() += 1;
                    }
                }
                if node_ids.is_some() && dangling(row, ids).is_some() {
                    stats.dangling_edges += 1;
                }
            }
        }

        if let Some(nodes) = &graph.nodes {
            let connected = endpoints(graph.edges.as_ref());
            stats.singleton_nodes = nodes
                .rows()
                .iter()
                .filter_map(|row| row.get("id").and_then(Value::as_str))
                .filter(|id| !connected.contains(*id))
                .count();
        }
        stats
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JSON for a `.json` path, YAML otherwise.
    pub fn write(&self, path: &Path) -> Result<()> {
        let text = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => self.to_json()?,
            _ => self.to_yaml()?,
        };
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Totals plus the `top` largest categories and predicates.
    pub fn render_summary(&self, top: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Nodes: {}  Edges: {}", self.total_nodes, self.total_edges);
        let _ = writeln!(
            out,
            "Dangling edges: {}  Singleton nodes: {}  Duplicate rows: {} nodes, {} edges",
            self.dangling_edges, self.singleton_nodes, self.duplicate_node_rows, self.duplicate_edge_rows
        );
        for (title, counts) in [
            ("Categories", &self.nodes_by_category),
            ("Predicates", &self.edges_by_predicate),
        ] {
            if counts.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{title}:");
            for (name, count) in largest(counts, top) {
                let _ = writeln!(out, "  {name}: {count}");
            }
        }
        out
    }
}

/// What [`prune`] removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PruneOutcome {
    pub dangling_edges: Vec<Record>,
    pub singleton_nodes: Vec<Record>,
    pub dangling_edges_by_source: BTreeMap<String, usize>,
    /// Distinct missing endpoint ids, per edge source
    pub missing_nodes_by_source: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PruneOptions {
    /// Singleton nodes are kept unless this is set
    pub remove_singletons: bool,
}

/// Move out edges whose subject or object names no node, then (optionally)
/// nodes left with no edge at all.
///
/// Without a node table nothing can be judged dangling and no edge is moved.
pub fn prune(graph: &mut GraphTables, options: PruneOptions) -> PruneOutcome {
    let mut outcome = PruneOutcome::default();

    match (&graph.nodes, &mut graph.edges) {
        (Some(nodes), Some(edges)) => {
            let ids = nodes.id_set();
            let mut missing: HashMap<String, HashSet<String>> = HashMap::new();
            outcome.dangling_edges = edges.split_off_rows(|row| match dangling(row, &ids) {
                Some(absent) => {
                    missing.entry(source_of(row)).or_default().extend(absent);
                    false
                }
                None => true,
            });
            for row in &outcome.dangling_edges {
                *outcome.dangling_edges_by_source.entry(source_of(row)).or_default() += 1;
            }
            outcome.missing_nodes_by_source = missing
                .into_iter()
                .map(|(source, absent)| (source, absent.len()))
                .collect();
        }
        (None, Some(_)) => warn!("No node table; dangling edges cannot be identified"),
        _ => {}
    }

    if options.remove_singletons {
        let connected = endpoints(graph.edges.as_ref());
        if let Some(nodes) = &mut graph.nodes {
            outcome.singleton_nodes = nodes.split_off_rows(|row| {
                row.get("id")
                    .and_then(Value::as_str)
                    .map_or(true, |id| connected.contains(id))
            });
        }
    }

    info!(
        dangling_edges = outcome.dangling_edges.len(),
        singleton_nodes = outcome.singleton_nodes.len(),
        "Pruned graph"
    );
    outcome
}

/// What [`deduplicate`] found and removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeduplicateOutcome {
    /// Every row of an id that occurs more than once, first occurrence included
    pub duplicate_nodes: Vec<Record>,
    pub duplicate_edges: Vec<Record>,
    pub nodes_removed: usize,
    pub edges_removed: usize,
}

/// Keep the first row for each node and edge id. Rows without an id are
/// never treated as duplicates.
pub fn deduplicate(graph: &mut GraphTables) -> DeduplicateOutcome {
    let mut outcome = DeduplicateOutcome::default();
    if let Some(nodes) = &mut graph.nodes {
        let (duplicates, removed) = deduplicate_table(nodes);
        outcome.duplicate_nodes = duplicates;
        outcome.nodes_removed = removed;
    }
    if let Some(edges) = &mut graph.edges {
        let (duplicates, removed) = deduplicate_table(edges);
        outcome.duplicate_edges = duplicates;
        outcome.edges_removed = removed;
    }
    info!(
        nodes_removed = outcome.nodes_removed,
        edges_removed = outcome.edges_removed,
        "Deduplicated graph"
    );
    outcome
}

fn deduplicate_table(table: &mut GraphTable) -> (Vec<Record>, usize) {
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    for id in table.rows().iter().filter_map(row_id) {
        *occurrences.entry(id).or_default() += 1;
    }
    let duplicates: Vec<Record> = table
        .rows()
        .iter()
        .filter(|row| row_id(row).is_some_and(|id| occurrences[&id] > 1))
        .cloned()
        .collect();

    let mut seen = HashSet::new();
    let removed = table.split_off_rows(|row| match row_id(row) {
        Some(id) => seen.insert(id),
        None => true,
    });
    (duplicates, removed.len())
}

fn row_id(row: &Record) -> Option<String> {
    row.get("id")
        .filter(|v| !v.is_null())
        .map(scalar_to_string)
        .filter(|id| !id.is_empty())
}

/// Rows beyond the first for each repeated id.
fn duplicate_rows(table: &GraphTable) -> usize {
    let mut seen = HashSet::new();
    table
        .rows()
        .iter()
        .filter_map(row_id)
        .filter(|id| !seen.insert(id.clone()))
        .count()
}

/// The endpoint ids of `row` missing from `ids`, or `None` when both exist.
fn dangling(row: &Record, ids: &HashSet<&str>) -> Option<Vec<String>> {
    let absent: Vec<String> = ["subject", "object"]
        .into_iter()
        .filter_map(|slot| row.get(slot))
        .flat_map(scalars)
        .map(scalar_to_string)
        .filter(|id| !ids.contains(id.as_str()))
        .collect();
    (!absent.is_empty()).then_some(absent)
}

fn endpoints(edges: Option<&GraphTable>) -> HashSet<String> {
    edges
        .map(|edges| {
            edges
                .rows()
                .iter()
                .flat_map(|row| ["subject", "object"].into_iter().filter_map(|slot| row.get(slot)))
                .flat_map(scalars)
                .map(scalar_to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn source_of(row: &Record) -> String {
    ["provided_by", "primary_knowledge_source"]
        .into_iter()
        .filter_map(|field| row.get(field))
        .flat_map(scalars)
        .map(scalar_to_string)
        .next()
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string())
}

fn tally_values(counts: &mut BTreeMap<String, usize>, value: Option<&Value>) {
    let Some(value) = value else { return };
    for item in scalars(value) {
        *counts.entry(scalar_to_string(item)).or_default() += 1;
    }
}

fn largest(counts: &BTreeMap<String, usize>, top: usize) -> Vec<(&str, usize)> {
    let mut ordered: Vec<(&str, usize)> = counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ordered.truncate(top);
    ordered
}
