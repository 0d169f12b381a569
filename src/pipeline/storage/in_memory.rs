use tracing::debug;

use super::GraphSink;
use crate::error::Result;
use crate::types::Record;

/// Keeps every node and edge in memory, in emission order.
///
/// Used for passthrough runs and as the input of in-process validation.
#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    nodes: Vec<Record>,
    edges: Vec<Record>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Record] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Record] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_parts(self) -> (Vec<Record>, Vec<Record>) {
        (self.nodes, self.edges)
    }
}

impl GraphSink for InMemorySink {
    fn write_node(&mut self, node: Record) -> Result<()> {
        self.nodes.push(node);
        Ok(())
    }

    fn write_edge(&mut self, edge: Record) -> Result<()> {
        self.edges.push(edge);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        debug!(nodes = self.nodes.len(), edges = self.edges.len(), "In-memory sink finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_order_per_kind() {
        let mut sink = InMemorySink::new();
        for id in ["A", "B"] {
            sink.write_node(json!({"id": id, "name": id}).as_object().unwrap().clone())
                .unwrap();
        }
        sink.write_edge(json!({"subject": "A", "predicate": "p", "object": "B"}).as_object().unwrap().clone())
            .unwrap();
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.nodes()[1]["id"], json!("B"));
        let (nodes, edges) = sink.into_parts();
        assert_eq!((nodes.len(), edges.len()), (2, 1));
    }
}
