//! Constraint vocabulary shared by the schema parser and the engine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    Required,
    Recommended,
    Pattern,
    Enum,
    MinimumValue,
    MaximumValue,
    Identifier,
    Multivalued,
    RangeClass,
    MissingColumn,
    IdPrefix,
    InvalidSubproperty,
    /// Edge endpoint with no matching node id; checked with or without a schema
    DanglingEdge,
}

impl ConstraintType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintType::Required => "required",
            ConstraintType::Recommended => "recommended",
            ConstraintType::Pattern => "pattern",
            ConstraintType::Enum => "enum",
            ConstraintType::MinimumValue => "minimum_value",
            ConstraintType::MaximumValue => "maximum_value",
            ConstraintType::Identifier => "identifier",
            ConstraintType::Multivalued => "multivalued",
            ConstraintType::RangeClass => "range_class",
            ConstraintType::MissingColumn => "missing_column",
            ConstraintType::IdPrefix => "id_prefix",
            ConstraintType::InvalidSubproperty => "invalid_subproperty",
            ConstraintType::DanglingEdge => "dangling_edge",
        }
    }
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered so that `Info < Warning < Error`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rule on one slot, in the context of a schema class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotConstraint {
    pub slot_name: String,
    pub constraint_type: ConstraintType,
    /// Pattern text, permissible values, bound, or range class
    pub value: Value,
    pub class_context: String,
    pub severity: Severity,
    pub description: String,
}

impl SlotConstraint {
    pub fn new(
        slot_name: impl Into<String>,
        constraint_type: ConstraintType,
        value: Value,
        class_context: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            slot_name: slot_name.into(),
            constraint_type,
            value,
            class_context: class_context.into(),
            severity,
            description: description.into(),
        }
    }
}

/// Every constraint for one class, grouped by slot, and the table the class
/// is stored in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassConstraints {
    pub class_name: String,
    pub table_mapping: String,
    pub slots: BTreeMap<String, Vec<SlotConstraint>>,
}

impl ClassConstraints {
    pub fn new(class_name: impl Into<String>, table_mapping: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            table_mapping: table_mapping.into(),
            slots: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, constraint: SlotConstraint) {
        self.slots
            .entry(constraint.slot_name.clone())
            .or_default()
            .push(constraint);
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn constraint_count(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }

    pub fn has(&self, slot: &str, constraint_type: ConstraintType) -> bool {
        self.slots
            .get(slot)
            .is_some_and(|cs| cs.iter().any(|c| c.constraint_type == constraint_type))
    }
}
