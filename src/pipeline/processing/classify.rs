//! Entity classification: emitted entities are split into nodes and edges by
//! the attributes they carry.

use serde::Serialize;
use serde_json::Value;

use crate::error::{IngestError, Result};
use crate::types::Record;

const EDGE_KEYS: [&str; 3] = ["subject", "predicate", "object"];
const NODE_KEYS: [&str; 2] = ["id", "name"];

/// Anything a transform can emit.
///
/// Every `Serialize` type that serializes to a map is an entity; its plain
/// attribute mapping is what sinks receive.
pub trait Entity {
    fn to_attributes(&self) -> Result<Record>;
}

impl<T: Serialize + ?Sized> Entity for T {
    fn to_attributes(&self) -> Result<Record> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(IngestError::Classification {
                entity: truncate(other.to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Edge,
}

/// Edge when subject, predicate and object are all present; node when id and
/// name are. An entity carrying both shapes is an edge.
pub fn classify(attributes: &Record) -> Result<EntityKind> {
    if EDGE_KEYS.iter().all(|k| attributes.contains_key(*k)) {
        Ok(EntityKind::Edge)
    } else if NODE_KEYS.iter().all(|k| attributes.contains_key(*k)) {
        Ok(EntityKind::Node)
    } else {
        Err(IngestError::Classification {
            entity: truncate(Value::Object(attributes.clone()).to_string()),
        })
    }
}

/// Nodes and edges of one run, each in emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedEntities {
    pub nodes: Vec<Record>,
    pub edges: Vec<Record>,
}

/// Partition a whole emitted sequence; the first unclassifiable entity fails it.
pub fn split_entities<I>(entities: I) -> Result<ClassifiedEntities>
where
    I: IntoIterator<Item = Record>,
{
    let mut out = ClassifiedEntities::default();
    for attributes in entities {
        match classify(&attributes)? {
            EntityKind::Node => out.nodes.push(attributes),
            EntityKind::Edge => out.edges.push(attributes),
        }
    }
    Ok(out)
}

fn truncate(mut text: String) -> String {
    const LIMIT: usize = 200;
    if text.len() > LIMIT {
        let mut cut = LIMIT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}
