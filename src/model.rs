//! Minimal node and edge shapes for transforms that do not bring their own
//! generated model types. Anything `Serialize` can be emitted; these are a
//! convenience.

use serde::{Deserialize, Serialize};

use crate::types::Record;

/// A described thing. `name` is always serialized so the node shape holds
/// even when the name is unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<String>,
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub xref: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonym: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub in_taxon: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provided_by: Vec<String>,
    /// Slots beyond the ones above
    #[serde(flatten)]
    pub extra: Record,
}

impl Node {
    pub fn new(id: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: vec![category.into()],
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_taxon(mut self, taxon: impl Into<String>) -> Self {
        self.in_taxon.push(taxon.into());
        self
    }
}

/// A typed, directed relationship between two node identifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<String>,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_knowledge_source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregator_knowledge_source: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publications: Vec<String>,
    #[serde(flatten)]
    pub extra: Record,
}

impl Edge {
    /// An edge with a fresh `uuid:` identifier.
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("uuid:{}", uuid::Uuid::new_v4()),
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category.push(category.into());
        self
    }

    pub fn with_primary_knowledge_source(mut self, source: impl Into<String>) -> Self {
        self.primary_knowledge_source = Some(source.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::classify::{classify, Entity, EntityKind};

    #[test]
    fn unnamed_node_is_still_node_shaped() {
        let node = Node::new("HGNC:1100", "biolink:Gene");
        let attributes = node.to_attributes().unwrap();
        assert!(attributes.contains_key("name"));
        assert_eq!(classify(&attributes).unwrap(), EntityKind::Node);
    }

    #[test]
    fn edges_get_uuid_ids() {
        let edge = Edge::new("HGNC:1", "biolink:interacts_with", "HGNC:2");
        assert!(edge.id.starts_with("uuid:"));
        assert_eq!(
            classify(&edge.to_attributes().unwrap()).unwrap(),
            EntityKind::Edge
        );
    }
}
