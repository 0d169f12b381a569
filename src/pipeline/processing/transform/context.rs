use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::pipeline::processing::classify::Entity;
use crate::pipeline::processing::lookup::{Mappings, TranslationTable};
use crate::types::{scalar_to_string, Record};

/// What a transform hook sees during a run.
///
/// Writes made by a hook are held until the hook returns: they are committed
/// when it succeeds and dropped when it skips or fails.
pub struct TransformContext {
    source_name: String,
    state: Map<String, Value>,
    extra_fields: Record,
    mappings: Mappings,
    translation: Option<TranslationTable>,
    pending: Vec<Record>,
    committed: usize,
}

impl TransformContext {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            state: Map::new(),
            extra_fields: Record::new(),
            mappings: Mappings::default(),
            translation: None,
            pending: Vec::new(),
            committed: 0,
        }
    }

    pub fn with_mappings(mut self, mappings: Mappings) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn with_translation(mut self, table: TranslationTable) -> Self {
        self.translation = Some(table);
        self
    }

    pub fn with_extra_fields(mut self, extra_fields: Record) -> Self {
        self.extra_fields = extra_fields;
        self
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Run-scoped key/value store shared by every hook of the run
    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.state
    }

    pub fn extra_fields(&self) -> &Record {
        &self.extra_fields
    }

    /// Emit one entity.
    pub fn write<E: Entity + ?Sized>(&mut self, entity: &E) -> Result<()> {
        self.pending.push(entity.to_attributes()?);
        Ok(())
    }

    /// Emit several entities, in order.
    pub fn write_all<E: Entity>(&mut self, entities: &[E]) -> Result<()> {
        for entity in entities {
            self.write(entity)?;
        }
        Ok(())
    }

    /// See [`Mappings::lookup`].
    pub fn lookup(&self, key: &str, column: &str, map_name: Option<&str>) -> Result<Value> {
        self.mappings.lookup(key, column, map_name)
    }

    /// Lookup rendered as a string.
    pub fn lookup_str(&self, key: &str, column: &str, map_name: Option<&str>) -> Result<String> {
        self.lookup(key, column, map_name).map(|v| scalar_to_string(&v))
    }

    /// See [`TranslationTable::resolve_term`].
    pub fn resolve_term(&self, word: &str, mandatory: bool, default: Option<&str>) -> Result<String> {
        match &self.translation {
            Some(table) => table.resolve_term(word, mandatory, default),
            None if mandatory => Err(IngestError::LookupMiss {
                map: "translation table".into(),
                key: word.to_string(),
                column: "global".into(),
            }),
            None => Ok(default.unwrap_or(word).to_string()),
        }
    }

    /// Entities committed so far in this run
    pub fn entities_written(&self) -> usize {
        self.committed
    }

    pub(crate) fn begin_run(&mut self) {
        self.state.clear();
        self.pending.clear();
        self.committed = 0;
    }

    pub(crate) fn commit(&mut self) -> Vec<Record> {
        self.committed += self.pending.len();
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn discard(&mut self) {
        if !self.pending.is_empty() {
            debug!(dropped = self.pending.len(), "Discarding uncommitted writes");
        }
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::lookup::{LookupTable, OnMapFailure};
    use serde_json::json;

    #[test]
    fn writes_are_held_until_commit() {
        let mut ctx = TransformContext::new("genes");
        ctx.write(&json!({"id": "X:1", "name": "one"})).unwrap();
        ctx.discard();
        assert_eq!(ctx.entities_written(), 0);

        ctx.write_all(&[json!({"id": "X:2", "name": "two"}), json!({"id": "X:3", "name": "three"})])
            .unwrap();
        let committed = ctx.commit();
        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0]["id"], json!("X:2"));
        assert_eq!(ctx.entities_written(), 2);
    }

    #[test]
    fn lookups_go_through_the_run_mappings() {
        let mut table = LookupTable::new("taxa");
        table
            .insert("human", json!({"id": "NCBITaxon:9606"}).as_object().unwrap().clone())
            .unwrap();
        let ctx = TransformContext::new("genes")
            .with_mappings(Mappings::new(OnMapFailure::Error).with_table(table));
        assert_eq!(ctx.lookup_str("human", "id", Some("taxa")).unwrap(), "NCBITaxon:9606");
        assert!(ctx.lookup("yeti", "id", None).is_err());
    }

    #[test]
    fn resolve_term_without_table() {
        let ctx = TransformContext::new("genes");
        assert_eq!(ctx.resolve_term("x", false, Some("d")).unwrap(), "d");
        assert!(ctx.resolve_term("x", true, None).is_err());
    }
}
