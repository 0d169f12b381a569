//! Transform runtime: hooks registered on a builder, run over a record
//! stream with a per-run context.

pub mod context;
pub mod runner;

pub use context::TransformContext;
pub use runner::{RunSummary, TransformRunner};

use crate::error::{IngestError, Result};
use crate::types::Record;

/// What the runtime does with a record after the per-record hook returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Keep the writes made for this record
    Continue,
    /// Drop this record and its writes, then carry on with the next one
    Skip,
}

pub type LifecycleHook = Box<dyn FnMut(&mut TransformContext) -> anyhow::Result<()>>;
pub type RecordHook = Box<dyn FnMut(&mut TransformContext, Record) -> anyhow::Result<RecordOutcome>>;
/// Receives the whole, still lazy, record stream.
pub type BulkHook = Box<
    dyn FnMut(&mut TransformContext, &mut dyn Iterator<Item = Result<Record>>) -> anyhow::Result<()>,
>;

pub(crate) enum TransformBody {
    PerRecord(RecordHook),
    Bulk(BulkHook),
}

/// A validated set of hooks: exactly one of per-record or bulk, plus
/// optional begin and end hooks.
pub struct Transform {
    pub(crate) name: String,
    pub(crate) on_data_begin: Option<LifecycleHook>,
    pub(crate) body: TransformBody,
    pub(crate) on_data_end: Option<LifecycleHook>,
}

impl Transform {
    pub fn builder(name: impl Into<String>) -> TransformBuilder {
        TransformBuilder::new(name)
    }

    /// Emits every record unchanged, for sources already shaped as nodes and edges.
    pub fn passthrough(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_data_begin: None,
            body: TransformBody::PerRecord(Box::new(|ctx: &mut TransformContext, record: Record| {
                ctx.write(&record)?;
                Ok(RecordOutcome::Continue)
            })),
            on_data_end: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_bulk(&self) -> bool {
        matches!(self.body, TransformBody::Bulk(_))
    }
}

/// Registers hooks against the pipeline stages; [`TransformBuilder::build`]
/// rejects a registration with both or neither of the record hooks.
pub struct TransformBuilder {
    name: String,
    on_data_begin: Option<LifecycleHook>,
    transform_record: Option<RecordHook>,
    transform: Option<BulkHook>,
    on_data_end: Option<LifecycleHook>,
}

impl TransformBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_data_begin: None,
            transform_record: None,
            transform: None,
            on_data_end: None,
        }
    }

    pub fn on_data_begin<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut TransformContext) -> anyhow::Result<()> + 'static,
    {
        self.on_data_begin = Some(Box::new(hook));
        self
    }

    pub fn transform_record<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut TransformContext, Record) -> anyhow::Result<RecordOutcome> + 'static,
    {
        self.transform_record = Some(Box::new(hook));
        self
    }

    pub fn transform<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut TransformContext, &mut dyn Iterator<Item = Result<Record>>) -> anyhow::Result<()>
            + 'static,
    {
        self.transform = Some(Box::new(hook));
        self
    }

    pub fn on_data_end<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut TransformContext) -> anyhow::Result<()> + 'static,
    {
        self.on_data_end = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> Result<Transform> {
        let body = match (self.transform_record, self.transform) {
            (Some(record), None) => TransformBody::PerRecord(record),
            (None, Some(bulk)) => TransformBody::Bulk(bulk),
            (Some(_), Some(_)) => {
                return Err(IngestError::Config(format!(
                    "transform '{}' registers both transform_record and transform; only one may be used",
                    self.name
                )))
            }
            (None, None) => {
                return Err(IngestError::Config(format!(
                    "transform '{}' registers neither transform_record nor transform",
                    self.name
                )))
            }
        };
        Ok(Transform {
            name: self.name,
            on_data_begin: self.on_data_begin,
            body,
            on_data_end: self.on_data_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_record_hooks_is_a_setup_error() {
        let result = Transform::builder("genes")
            .transform_record(|_, _| Ok(RecordOutcome::Continue))
            .transform(|_, _| Ok(()))
            .build();
        assert!(matches!(result, Err(IngestError::Config(msg)) if msg.contains("both")));
    }

    #[test]
    fn a_record_hook_is_required() {
        let result = Transform::builder("genes").on_data_begin(|_| Ok(())).build();
        assert!(matches!(result, Err(IngestError::Config(_))));
    }

    #[test]
    fn bulk_only_builds() {
        let transform = Transform::builder("genes").transform(|_, _| Ok(())).build().unwrap();
        assert!(transform.is_bulk());
        assert_eq!(transform.name(), "genes");
    }
}
