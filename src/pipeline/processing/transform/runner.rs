use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use super::{RecordOutcome, Transform, TransformBody, TransformContext};
use crate::error::{IngestError, Result};
use crate::metrics::TransformMetrics;
use crate::pipeline::processing::classify::{classify, EntityKind};
use crate::pipeline::processing::lookup::SssomCrosswalk;
use crate::pipeline::storage::GraphSink;
use crate::types::Record;

/// Counts and timing for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub records_read: usize,
    pub records_processed: usize,
    pub records_skipped: usize,
    pub entities: usize,
    pub nodes: usize,
    pub edges: usize,
}

/// Drives a [`Transform`] over a record stream.
///
/// Hooks run begin, then per-record (in source order) or bulk, then end.
/// Each successful hook call commits its writes; committed entities are
/// classified and handed to the sink in emission order. A failing hook
/// aborts the run and its uncommitted writes are dropped.
pub struct TransformRunner {
    transform: Transform,
    context: TransformContext,
    crosswalk: Option<SssomCrosswalk>,
    min_node_count: Option<usize>,
    min_edge_count: Option<usize>,
}

struct Counts {
    nodes: usize,
    edges: usize,
}

impl TransformRunner {
    pub fn new(transform: Transform, context: TransformContext) -> Self {
        Self {
            transform,
            context,
            crosswalk: None,
            min_node_count: None,
            min_edge_count: None,
        }
    }

    /// Rewrite edge endpoints through a crosswalk before they reach the sink.
    pub fn with_crosswalk(mut self, crosswalk: SssomCrosswalk) -> Self {
        self.crosswalk = Some(crosswalk);
        self
    }

    /// Fail the run when it produces fewer nodes or edges than these.
    pub fn with_min_counts(mut self, nodes: Option<usize>, edges: Option<usize>) -> Self {
        self.min_node_count = nodes;
        self.min_edge_count = edges;
        self
    }

    pub fn context(&self) -> &TransformContext {
        &self.context
    }

    pub fn run<I>(&mut self, records: I, sink: &mut dyn GraphSink) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        let run_id = Uuid::new_v4();
        let source = self.context.source_name().to_string();
        let span = info_span!("transform", source = %source, run_id = %run_id);
        let _guard = span.enter();
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(transform = %self.transform.name, "Starting transform run");

        self.context.begin_run();
        let mut counts = Counts { nodes: 0, edges: 0 };
        let mut records_read = 0usize;
        let mut records_processed = 0usize;
        let mut records_skipped = 0usize;

        let result = self.drive(
            records.into_iter(),
            sink,
            &mut counts,
            &mut records_read,
            &mut records_processed,
            &mut records_skipped,
        );
        if let Err(e) = result {
            TransformMetrics::record_run_failure();
            warn!(error = %e, records_read, "Transform run aborted");
            return Err(e);
        }

        sink.finish()?;
        self.check_min_counts(&source, &counts)?;

        let summary = RunSummary {
            run_id,
            source,
            started_at,
            duration_secs: clock.elapsed().as_secs_f64(),
            records_read,
            records_processed,
            records_skipped,
            entities: self.context.entities_written(),
            nodes: counts.nodes,
            edges: counts.edges,
        };
        TransformMetrics::record_run(&summary);
        info!(
            records_read = summary.records_read,
            records_skipped = summary.records_skipped,
            nodes = summary.nodes,
            edges = summary.edges,
            duration_secs = summary.duration_secs,
            "Transform run finished"
        );
        Ok(summary)
    }

    fn drive(
        &mut self,
        records: impl Iterator<Item = Result<Record>>,
        sink: &mut dyn GraphSink,
        counts: &mut Counts,
        records_read: &mut usize,
        records_processed: &mut usize,
        records_skipped: &mut usize,
    ) -> Result<()> {
        let name = self.transform.name.clone();

        if let Some(begin) = self.transform.on_data_begin.as_mut() {
            if let Err(e) = begin(&mut self.context) {
                self.context.discard();
                return Err(hook_failure(e, format!("on_data_begin of '{name}'")));
            }
            let committed = self.context.commit();
            emit(committed, self.crosswalk.as_ref(), sink, counts)?;
        }

        match &mut self.transform.body {
            TransformBody::PerRecord(hook) => {
                for record in records {
                    let record = record?;
                    *records_read += 1;
                    match hook(&mut self.context, record) {
                        Ok(RecordOutcome::Continue) => {
                            *records_processed += 1;
                            let committed = self.context.commit();
                            emit(committed, self.crosswalk.as_ref(), sink, counts)?;
                        }
                        Ok(RecordOutcome::Skip) => {
                            *records_skipped += 1;
                            self.context.discard();
                            debug!(record = *records_read, "Record skipped");
                        }
                        Err(e) => {
                            self.context.discard();
                            return Err(hook_failure(
                                e,
                                format!("transform_record of '{name}' at record {records_read}"),
                            ));
                        }
                    }
                }
            }
            TransformBody::Bulk(hook) => {
                let mut counted = CountingRecords {
                    inner: records,
                    read: 0,
                };
                let outcome = hook(&mut self.context, &mut counted);
                *records_read = counted.read;
                if let Err(e) = outcome {
                    self.context.discard();
                    return Err(hook_failure(e, format!("transform of '{name}'")));
                }
                *records_processed = counted.read;
                let committed = self.context.commit();
                emit(committed, self.crosswalk.as_ref(), sink, counts)?;
            }
        }

        if let Some(end) = self.transform.on_data_end.as_mut() {
            if let Err(e) = end(&mut self.context) {
                self.context.discard();
                return Err(hook_failure(e, format!("on_data_end of '{name}'")));
            }
            let committed = self.context.commit();
            emit(committed, self.crosswalk.as_ref(), sink, counts)?;
        }
        Ok(())
    }

    fn check_min_counts(&self, source: &str, counts: &Counts) -> Result<()> {
        if let Some(min) = self.min_node_count {
            if counts.nodes < min {
                return Err(IngestError::Config(format!(
                    "source '{source}' produced {} nodes, fewer than min_node_count {min}",
                    counts.nodes
                )));
            }
        }
        if let Some(min) = self.min_edge_count {
            if counts.edges < min {
                return Err(IngestError::Config(format!(
                    "source '{source}' produced {} edges, fewer than min_edge_count {min}",
                    counts.edges
                )));
            }
        }
        Ok(())
    }
}

/// Hook failures keep their error chain; an `IngestError` raised inside a
/// hook comes back out unchanged.
fn hook_failure(error: anyhow::Error, stage: String) -> IngestError {
    match error.downcast::<IngestError>() {
        Ok(ingest) => ingest,
        Err(other) => IngestError::Transform(other.context(stage)),
    }
}

fn emit(
    entities: Vec<Record>,
    crosswalk: Option<&SssomCrosswalk>,
    sink: &mut dyn GraphSink,
    counts: &mut Counts,
) -> Result<()> {
    // Classify the whole batch first so a bad entity leaves nothing in the sink.
    let classified = entities
        .into_iter()
        .map(|attributes| classify(&attributes).map(|kind| (kind, attributes)))
        .collect::<Result<Vec<(EntityKind, Record)>>>()?;
    for (kind, attributes) in classified {
        match kind {
            EntityKind::Node => {
                sink.write_node(attributes)?;
                counts.nodes += 1;
            }
            EntityKind::Edge => {
                let edge = match crosswalk {
                    Some(crosswalk) => crosswalk.apply_mapping(attributes),
                    None => attributes,
                };
                sink.write_edge(edge)?;
                counts.edges += 1;
            }
        }
    }
    Ok(())
}

struct CountingRecords<I> {
    inner: I,
    read: usize,
}

impl<I: Iterator<Item = Result<Record>>> Iterator for CountingRecords<I> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        if item.is_ok() {
            self.read += 1;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::lookup::{SssomConfig, SssomMapping};
    use crate::pipeline::processing::transform::RecordOutcome;
    use crate::pipeline::storage::InMemorySink;
    use crate::constants::SKOS_EXACT_MATCH;
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn records(values: Vec<Value>) -> Vec<Result<Record>> {
        values
            .into_iter()
            .map(|v| Ok(v.as_object().unwrap().clone()))
            .collect()
    }

    fn genes(n: usize) -> Vec<Result<Record>> {
        records(
            (0..n)
                .map(|i| json!({"id": format!("HGNC:{i}"), "symbol": format!("G{i}")}))
                .collect(),
        )
    }

    #[test]
    fn per_record_hook_runs_once_per_record_in_order() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&calls);
        let transform = Transform::builder("genes")
            .on_data_begin(|ctx| {
                ctx.state_mut().insert("phase".into(), json!("begin"));
                Ok(())
            })
            .transform_record(move |ctx, record| {
                assert_eq!(ctx.state()["phase"], json!("begin"));
                seen.borrow_mut().push(record["id"].clone());
                ctx.write(&json!({"id": record["id"], "name": record["symbol"]}))?;
                Ok(RecordOutcome::Continue)
            })
            .build()
            .unwrap();

        let mut sink = InMemorySink::new();
        let mut runner = TransformRunner::new(transform, TransformContext::new("genes"));
        let summary = runner.run(genes(5), &mut sink).unwrap();

        assert_eq!(calls.borrow().len(), 5);
        assert_eq!(summary.records_read, 5);
        assert_eq!(summary.nodes, 5);
        let ids: Vec<Value> = sink.nodes().iter().map(|n| n["id"].clone()).collect();
        assert_eq!(ids, *calls.borrow());
    }

    #[test]
    fn skipped_records_emit_nothing_and_the_run_continues() {
        let transform = Transform::builder("genes")
            .transform_record(|ctx, record| {
                ctx.write(&json!({"id": record["id"], "name": "partial"}))?;
                if record["symbol"] == json!("G1") {
                    return Ok(RecordOutcome::Skip);
                }
                Ok(RecordOutcome::Continue)
            })
            .build()
            .unwrap();
        let mut sink = InMemorySink::new();
        let summary = TransformRunner::new(transform, TransformContext::new("genes"))
            .run(genes(3), &mut sink)
            .unwrap();
        assert_eq!(summary.records_skipped, 1);
        assert_eq!(summary.records_processed, 2);
        let ids: Vec<Value> = sink.nodes().iter().map(|n| n["id"].clone()).collect();
        assert_eq!(ids, vec![json!("HGNC:0"), json!("HGNC:2")]);
    }

    #[test]
    fn hook_error_aborts_and_drops_that_records_writes() {
        let transform = Transform::builder("genes")
            .transform_record(|ctx, record| {
                ctx.write(&json!({"id": record["id"], "name": "x"}))?;
                if record["symbol"] == json!("G2") {
                    anyhow::bail!("bad gene");
                }
                Ok(RecordOutcome::Continue)
            })
            .build()
            .unwrap();
        let mut sink = InMemorySink::new();
        let err = TransformRunner::new(transform, TransformContext::new("genes"))
            .run(genes(5), &mut sink)
            .unwrap_err();
        assert!(matches!(err, IngestError::Transform(_)));
        assert!(format!("{err}").contains("bad gene"));
        assert_eq!(sink.nodes().len(), 2);
    }

    #[test]
    fn bulk_hook_drives_iteration_and_can_stop_early() {
        let transform = Transform::builder("genes")
            .transform(|ctx, records| {
                for record in records.take(2) {
                    let record = record?;
                    ctx.write(&json!({"id": record["id"], "name": "bulk"}))?;
                }
                Ok(())
            })
            .on_data_end(|ctx| {
                let total = ctx.entities_written();
                ctx.write(&json!({"subject": "HGNC:0", "predicate": "p", "object": "HGNC:1", "total": total}))?;
                Ok(())
            })
            .build()
            .unwrap();
        let mut sink = InMemorySink::new();
        let summary = TransformRunner::new(transform, TransformContext::new("genes"))
            .run(genes(10), &mut sink)
            .unwrap();
        assert_eq!(summary.records_read, 2);
        assert_eq!((summary.nodes, summary.edges), (2, 1));
        assert_eq!(sink.edges()[0]["total"], json!(2));
    }

    #[test]
    fn unclassifiable_entity_fails_the_run() {
        let transform = Transform::builder("bad")
            .transform_record(|ctx, _| {
                ctx.write(&json!({"label": "orphan"}))?;
                Ok(RecordOutcome::Continue)
            })
            .build()
            .unwrap();
        let err = TransformRunner::new(transform, TransformContext::new("bad"))
            .run(genes(1), &mut InMemorySink::new())
            .unwrap_err();
        assert!(matches!(err, IngestError::Classification { .. }));
    }

    #[test]
    fn classification_failure_leaves_none_of_the_record_in_the_sink() {
        let transform = Transform::builder("mixed")
            .transform_record(|ctx, record| {
                ctx.write(&json!({"id": record["id"], "name": "ok"}))?;
                ctx.write(&json!({"label": "orphan"}))?;
                Ok(RecordOutcome::Continue)
            })
            .build()
            .unwrap();
        let mut sink = InMemorySink::new();
        let err = TransformRunner::new(transform, TransformContext::new("mixed"))
            .run(genes(1), &mut sink)
            .unwrap_err();
        assert!(matches!(err, IngestError::Classification { .. }));
        assert_eq!(sink.nodes().len(), 0);
        assert_eq!(sink.edges().len(), 0);
    }

    #[test]
    fn edges_pass_through_the_crosswalk() {
        let config = SssomConfig {
            subject_target_prefixes: vec!["B".into()],
            ..SssomConfig::default()
        };
        let crosswalk = SssomCrosswalk::from_tables(
            &config,
            vec![vec![SssomMapping::new("A:1", SKOS_EXACT_MATCH, "B:9")]],
        );
        let mut sink = InMemorySink::new();
        TransformRunner::new(Transform::passthrough("edges"), TransformContext::new("edges"))
            .with_crosswalk(crosswalk)
            .run(
                records(vec![json!({"subject": "A:1", "predicate": "p", "object": "A:2"})]),
                &mut sink,
            )
            .unwrap();
        assert_eq!(sink.edges()[0]["subject"], json!("B:9"));
        assert_eq!(sink.edges()[0]["original_subject"], json!("A:1"));
    }

    #[test]
    fn min_counts_are_enforced() {
        let mut runner = TransformRunner::new(Transform::passthrough("nodes"), TransformContext::new("nodes"))
            .with_min_counts(Some(3), None);
        let result = runner.run(
            records(vec![json!({"id": "X:1", "name": "one"})]),
            &mut InMemorySink::new(),
        );
        assert!(matches!(result, Err(IngestError::Config(msg)) if msg.contains("min_node_count")));
    }
}
