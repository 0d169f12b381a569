//! Schema-constrained validation of node and edge tables, and graph-level
//! quality control over them.

pub mod constraints;
pub mod engine;
pub mod graph_ops;
pub mod report;
pub mod schema;
pub mod table;

pub use constraints::{ClassConstraints, ConstraintType, Severity, SlotConstraint};
pub use engine::ValidationEngine;
pub use graph_ops::{deduplicate, prune, DeduplicateOutcome, GraphStats, PruneOptions, PruneOutcome};
pub use report::{ValidationReport, ValidationViolation, ViolationSample};
pub use schema::{SchemaParser, SchemaView, SlotDefinition, YamlSchema};
pub use table::{GraphTable, GraphTables};
