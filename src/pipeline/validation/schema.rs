//! Schema metadata: the [`SchemaView`] provider seam, a YAML implementation
//! for LinkML-style documents, and the [`SchemaParser`] that turns slots
//! into constraints.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::constraints::{ClassConstraints, ConstraintType, Severity, SlotConstraint};
use crate::constants::{
    EDGE_CLASS, EDGES_TABLE, FORCE_SINGLE_VALUED_FIELDS, KGX_MULTIVALUED_FIELDS_FALLBACK,
    NODE_CLASS, NODES_TABLE, ROOT_PREDICATE, SCHEMA_PREFIX,
};
use crate::error::{IngestError, Result};

/// A slot as declared, or as induced for a class once inheritance and
/// `slot_usage` are applied.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SlotDefinition {
    #[serde(skip)]
    pub name: String,
    pub is_a: Option<String>,
    pub mixins: Vec<String>,
    pub domain: Option<String>,
    pub range: Option<String>,
    pub required: Option<bool>,
    pub recommended: Option<bool>,
    pub multivalued: Option<bool>,
    pub identifier: Option<bool>,
    pub pattern: Option<String>,
    pub minimum_value: Option<f64>,
    pub maximum_value: Option<f64>,
}

impl SlotDefinition {
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }

    pub fn is_recommended(&self) -> bool {
        self.recommended.unwrap_or(false)
    }

    pub fn is_multivalued(&self) -> bool {
        self.multivalued.unwrap_or(false)
    }

    pub fn is_identifier(&self) -> bool {
        self.identifier.unwrap_or(false)
    }

    /// Take every property this slot leaves unset from `parent`.
    fn inherit(&mut self, parent: &SlotDefinition) {
        fn fill<T: Clone>(own: &mut Option<T>, parent: &Option<T>) {
            if own.is_none() {
                own.clone_from(parent);
            }
        }
        fill(&mut self.domain, &parent.domain);
        fill(&mut self.range, &parent.range);
        fill(&mut self.required, &parent.required);
        fill(&mut self.recommended, &parent.recommended);
        fill(&mut self.multivalued, &parent.multivalued);
        fill(&mut self.identifier, &parent.identifier);
        fill(&mut self.pattern, &parent.pattern);
        fill(&mut self.minimum_value, &parent.minimum_value);
        fill(&mut self.maximum_value, &parent.maximum_value);
    }

    /// Let every property `usage` sets win.
    fn refine(&mut self, usage: &SlotDefinition) {
        fn set<T: Clone>(own: &mut Option<T>, usage: &Option<T>) {
            if usage.is_some() {
                own.clone_from(usage);
            }
        }
        set(&mut self.domain, &usage.domain);
        set(&mut self.range, &usage.range);
        set(&mut self.required, &usage.required);
        set(&mut self.recommended, &usage.recommended);
        set(&mut self.multivalued, &usage.multivalued);
        set(&mut self.identifier, &usage.identifier);
        set(&mut self.pattern, &usage.pattern);
        set(&mut self.minimum_value, &usage.minimum_value);
        set(&mut self.maximum_value, &usage.maximum_value);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClassDefinition {
    pub is_a: Option<String>,
    pub mixins: Vec<String>,
    pub slots: Vec<String>,
    pub slot_usage: BTreeMap<String, Option<SlotDefinition>>,
    pub attributes: BTreeMap<String, Option<SlotDefinition>>,
    pub id_prefixes: Vec<String>,
    pub id_prefixes_are_closed: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnumDefinition {
    /// Keys are the permissible values, in document order
    pub permissible_values: serde_json::Map<String, Value>,
}

/// Read access to a schema's classes, slots and enums.
///
/// Names are the schema's own (space separated, e.g. `named thing`).
pub trait SchemaView {
    fn all_classes(&self) -> Vec<String>;

    fn all_slots(&self) -> Vec<String>;

    fn has_class(&self, name: &str) -> bool;

    fn has_slot(&self, name: &str) -> bool;

    /// The class and everything below it through `is_a` or `mixins`.
    fn class_descendants(&self, name: &str) -> Vec<String>;

    /// The slot and everything below it through `is_a` or `mixins`.
    fn slot_descendants(&self, name: &str) -> Vec<String>;

    /// Every slot of the class, own and inherited, fully resolved.
    fn class_induced_slots(&self, class: &str) -> Vec<SlotDefinition>;

    fn induced_slot(&self, slot: &str, class: &str) -> Option<SlotDefinition> {
        self.class_induced_slots(class)
            .into_iter()
            .find(|s| s.name == slot)
    }

    fn enum_values(&self, name: &str) -> Option<Vec<String>>;

    /// Declared id prefixes and whether that list is closed.
    fn class_id_prefixes(&self, class: &str) -> (Vec<String>, bool);
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SchemaDocument {
    name: Option<String>,
    classes: BTreeMap<String, Option<ClassDefinition>>,
    slots: BTreeMap<String, Option<SlotDefinition>>,
    enums: BTreeMap<String, Option<EnumDefinition>>,
}

/// A LinkML-style schema read from YAML; imports are not followed.
#[derive(Debug, Clone, Default)]
pub struct YamlSchema {
    name: Option<String>,
    classes: BTreeMap<String, ClassDefinition>,
    slots: BTreeMap<String, SlotDefinition>,
    enums: BTreeMap<String, EnumDefinition>,
}

impl YamlSchema {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let document: SchemaDocument = serde_yaml::from_str(text)?;
        let slots = document
            .slots
            .into_iter()
            .map(|(name, slot)| {
                let mut slot = slot.unwrap_or_default();
                slot.name = name.clone();
                (name, slot)
            })
            .collect();
        Ok(Self {
            name: document.name,
            classes: document
                .classes
                .into_iter()
                .map(|(name, class)| (name, class.unwrap_or_default()))
                .collect(),
            slots,
            enums: document
                .enums
                .into_iter()
                .map(|(name, e)| (name, e.unwrap_or_default()))
                .collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| IngestError::ResourceNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The class, its `is_a` chain, then mixins; nearest first.
    fn class_ancestors(&self, name: &str) -> Vec<String> {
        fn visit(schema: &YamlSchema, name: &str, seen: &mut Vec<String>) {
            if seen.iter().any(|s| s == name) {
                return;
            }
            seen.push(name.to_string());
            if let Some(class) = schema.classes.get(name) {
                if let Some(parent) = &class.is_a {
                    visit(schema, parent, seen);
                }
                for mixin in &class.mixins {
                    visit(schema, mixin, seen);
                }
            }
        }
        let mut seen = Vec::new();
        visit(self, name, &mut seen);
        seen
    }

    fn slot_ancestors(&self, name: &str) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            if seen.contains(&current) {
                continue;
            }
            if let Some(slot) = self.slots.get(&current) {
                stack.extend(slot.mixins.iter().rev().cloned());
                stack.extend(slot.is_a.iter().cloned());
            }
            seen.push(current);
        }
        seen
    }

    /// The global slot definition with its `is_a` ancestors folded in.
    fn resolved_slot(&self, name: &str) -> SlotDefinition {
        let mut slot = self.slots.get(name).cloned().unwrap_or_default();
        slot.name = name.to_string();
        let mut seen = HashSet::from([name.to_string()]);
        let mut parent = slot.is_a.clone();
        while let Some(parent_name) = parent {
            if !seen.insert(parent_name.clone()) {
                break;
            }
            match self.slots.get(&parent_name) {
                Some(def) => {
                    slot.inherit(def);
                    parent = def.is_a.clone();
                }
                None => break,
            }
        }
        slot
    }
}

impl SchemaView for YamlSchema {
    fn all_classes(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    fn all_slots(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    fn has_slot(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    fn class_descendants(&self, name: &str) -> Vec<String> {
        self.classes
            .keys()
            .filter(|c| self.class_ancestors(c).iter().any(|a| a == name))
            .cloned()
            .collect()
    }

    fn slot_descendants(&self, name: &str) -> Vec<String> {
        self.slots
            .keys()
            .filter(|s| self.slot_ancestors(s).iter().any(|a| a == name))
            .cloned()
            .collect()
    }

    fn class_induced_slots(&self, class: &str) -> Vec<SlotDefinition> {
        if !self.classes.contains_key(class) {
            return Vec::new();
        }
        // root first, so nearer classes refine what farther ones declare
        let lineage: Vec<String> = self.class_ancestors(class).into_iter().rev().collect();

        let mut names: Vec<&str> = Vec::new();
        for ancestor in &lineage {
            if let Some(def) = self.classes.get(ancestor) {
                for slot in def.slots.iter().chain(def.attributes.keys()) {
                    if !names.contains(&slot.as_str()) {
                        names.push(slot);
                    }
                }
            }
        }

        names
            .into_iter()
            .map(|name| {
                let mut slot = self.resolved_slot(name);
                for ancestor in &lineage {
                    let Some(def) = self.classes.get(ancestor) else {
                        continue;
                    };
                    if let Some(Some(attribute)) = def.attributes.get(name) {
                        slot.refine(attribute);
                    }
                    if let Some(Some(usage)) = def.slot_usage.get(name) {
                        slot.refine(usage);
                    }
                }
                slot
            })
            .collect()
    }

    fn enum_values(&self, name: &str) -> Option<Vec<String>> {
        self.enums
            .get(name)
            .map(|e| e.permissible_values.keys().cloned().collect())
    }

    fn class_id_prefixes(&self, class: &str) -> (Vec<String>, bool) {
        match self.classes.get(class) {
            Some(def) => (
                def.id_prefixes.clone(),
                def.id_prefixes_are_closed.unwrap_or(false),
            ),
            None => (Vec::new(), false),
        }
    }
}

/// `interacts with` -> `interacts_with`
pub fn slot_field_name(slot: &str) -> String {
    slot.replace(' ', "_")
}

/// `gene or gene product` -> `biolink:GeneOrGeneProduct`
pub fn class_curie(class: &str) -> String {
    let camel: String = class
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    format!("{SCHEMA_PREFIX}:{camel}")
}

/// `interacts with` -> `biolink:interacts_with`
pub fn slot_curie(slot: &str) -> String {
    format!("{SCHEMA_PREFIX}:{}", slot_field_name(slot))
}

/// Constraint extraction over an optional schema.
///
/// Without a schema every query answers empty, so validation degrades to a
/// no-op instead of failing.
pub struct SchemaParser {
    view: Option<Box<dyn SchemaView>>,
}

impl Default for SchemaParser {
    fn default() -> Self {
        Self::without_schema()
    }
}

impl SchemaParser {
    pub fn new(view: Box<dyn SchemaView>) -> Self {
        Self { view: Some(view) }
    }

    pub fn without_schema() -> Self {
        Self { view: None }
    }

    /// Load a YAML schema; a missing path or unreadable schema yields a
    /// parser without one.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            debug!("No schema configured; schema constraints disabled");
            return Self::without_schema();
        };
        match YamlSchema::load(path) {
            Ok(schema) => {
                info!(
                    path = %path.display(),
                    schema = schema.name().unwrap_or("unnamed"),
                    classes = schema.classes.len(),
                    slots = schema.slots.len(),
                    "Loaded schema"
                );
                Self::new(Box::new(schema))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not load schema; schema constraints disabled");
                Self::without_schema()
            }
        }
    }

    pub fn has_schema(&self) -> bool {
        self.view.is_some()
    }

    pub fn view(&self) -> Option<&dyn SchemaView> {
        self.view.as_deref()
    }

    pub fn node_constraints(&self) -> ClassConstraints {
        self.class_constraints(NODE_CLASS, NODES_TABLE)
    }

    pub fn edge_constraints(&self) -> ClassConstraints {
        self.class_constraints(EDGE_CLASS, EDGES_TABLE)
    }

    pub fn class_constraints(&self, class_name: &str, table_mapping: &str) -> ClassConstraints {
        let mut constraints = ClassConstraints::new(class_name, table_mapping);
        let Some(view) = self.view() else {
            return constraints;
        };
        let node_classes: HashSet<String> = if table_mapping == EDGES_TABLE {
            view.class_descendants(NODE_CLASS).into_iter().collect()
        } else {
            HashSet::new()
        };
        for slot in view.class_induced_slots(class_name) {
            for constraint in slot_constraints(view, &slot, class_name, &node_classes) {
                constraints.add(constraint);
            }
        }
        debug!(
            class = class_name,
            table = table_mapping,
            slots = constraints.slots.len(),
            constraints = constraints.constraint_count(),
            "Extracted class constraints"
        );
        constraints
    }

    /// Whether a column holds lists. `category`, `in_taxon` and `type` never
    /// do; without a schema a fixed list of KGX fields is used.
    pub fn is_field_multivalued(&self, field: &str) -> bool {
        if FORCE_SINGLE_VALUED_FIELDS.contains(&field) {
            return false;
        }
        let Some(view) = self.view() else {
            return KGX_MULTIVALUED_FIELDS_FALLBACK.contains(&field);
        };
        let slot = field.replace('_', " ");
        [EDGE_CLASS, NODE_CLASS]
            .iter()
            .find_map(|class| view.induced_slot(&slot, class))
            .is_some_and(|s| s.is_multivalued())
    }

    pub fn multivalued_columns<'a, I>(&self, columns: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        columns
            .into_iter()
            .filter(|c| self.is_field_multivalued(c))
            .map(str::to_string)
            .collect()
    }

    /// Curies of every class at or below the node root.
    pub fn valid_categories(&self) -> BTreeSet<String> {
        self.view()
            .map(|view| {
                view.class_descendants(NODE_CLASS)
                    .iter()
                    .map(|c| class_curie(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Curies of every slot at or below the root predicate.
    pub fn valid_predicates(&self) -> BTreeSet<String> {
        self.view()
            .map(|view| {
                view.slot_descendants(ROOT_PREDICATE)
                    .iter()
                    .map(|s| slot_curie(s))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Curies of every slot the schema declares.
    pub fn known_slots(&self) -> BTreeSet<String> {
        self.view()
            .map(|view| view.all_slots().iter().map(|s| slot_curie(s)).collect())
            .unwrap_or_default()
    }

    pub fn class_id_prefixes(&self, class: &str) -> (Vec<String>, bool) {
        self.view()
            .map(|view| view.class_id_prefixes(class))
            .unwrap_or_default()
    }

    /// Category curie to its declared id prefixes and closedness, for classes
    /// that declare any.
    pub fn category_prefix_map(&self) -> BTreeMap<String, (Vec<String>, bool)> {
        let Some(view) = self.view() else {
            return BTreeMap::new();
        };
        view.all_classes()
            .into_iter()
            .filter_map(|class| {
                let (prefixes, closed) = view.class_id_prefixes(&class);
                (!prefixes.is_empty()).then(|| (class_curie(&class), (prefixes, closed)))
            })
            .collect()
    }
}

fn slot_constraints(
    view: &dyn SchemaView,
    slot: &SlotDefinition,
    class_name: &str,
    node_classes: &HashSet<String>,
) -> Vec<SlotConstraint> {
    let field = slot_field_name(&slot.name);
    let make = |kind: ConstraintType, value: Value, severity: Severity, description: String| {
        SlotConstraint::new(field.clone(), kind, value, class_name, severity, description)
    };
    let mut constraints = Vec::new();

    if slot.is_required() {
        constraints.push(make(
            ConstraintType::Required,
            json!(true),
            Severity::Error,
            format!("Field '{field}' is required"),
        ));
    }
    if slot.is_recommended() {
        constraints.push(make(
            ConstraintType::Recommended,
            json!(true),
            Severity::Warning,
            format!("Field '{field}' is recommended"),
        ));
    }
    if let Some(pattern) = &slot.pattern {
        constraints.push(make(
            ConstraintType::Pattern,
            json!(pattern),
            Severity::Error,
            format!("Field '{field}' must match pattern: {pattern}"),
        ));
    }
    if let Some(range) = &slot.range {
        if let Some(values) = view.enum_values(range) {
            constraints.push(make(
                ConstraintType::Enum,
                json!(values),
                Severity::Warning,
                format!("Field '{field}' must be one of: {}", values.join(", ")),
            ));
        } else if node_classes.contains(range) {
            constraints.push(make(
                ConstraintType::RangeClass,
                json!(range),
                Severity::Error,
                format!("Edge {field} references non-existent node"),
            ));
        }
    }
    if let Some(min) = slot.minimum_value {
        constraints.push(make(
            ConstraintType::MinimumValue,
            json!(min),
            Severity::Error,
            format!("Field '{field}' must be >= {min}"),
        ));
    }
    if let Some(max) = slot.maximum_value {
        constraints.push(make(
            ConstraintType::MaximumValue,
            json!(max),
            Severity::Error,
            format!("Field '{field}' must be <= {max}"),
        ));
    }
    if slot.is_identifier() {
        constraints.push(make(
            ConstraintType::Identifier,
            json!(true),
            Severity::Error,
            format!("Field '{field}' is the identifier"),
        ));
    }
    if slot.is_multivalued() && !FORCE_SINGLE_VALUED_FIELDS.contains(&field.as_str()) {
        constraints.push(make(
            ConstraintType::Multivalued,
            json!(true),
            Severity::Info,
            format!("Field '{field}' is multivalued"),
        ));
    }
    constraints
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SCHEMA: &str = r#"
name: mini-biolink
classes:
  entity:
    slots: [id, category]
    id_prefixes: []
  named thing:
    is_a: entity
    slots: [name, provided by, in taxon]
    slot_usage:
      name:
        recommended: true
  gene:
    is_a: named thing
    id_prefixes: [HGNC, NCBIGene]
    id_prefixes_are_closed: true
  disease:
    is_a: named thing
    id_prefixes: [MONDO]
  association:
    is_a: entity
    slots: [subject, predicate, object, knowledge level, score]
slots:
  id:
    identifier: true
    required: true
    pattern: "^[A-Za-z_][A-Za-z0-9_.-]*:.+$"
  category:
    multivalued: true
    required: true
  name:
  provided by:
    multivalued: true
  in taxon:
    multivalued: true
    recommended: true
  subject:
    required: true
    range: named thing
  object:
    required: true
    range: named thing
  predicate:
    required: true
  knowledge level:
    range: KnowledgeLevelEnum
  score:
    minimum_value: 0
    maximum_value: 1
  related to:
    domain: named thing
  interacts with:
    is_a: related to
  physically interacts with:
    is_a: interacts with
  has attribute:
    range: attribute
enums:
  KnowledgeLevelEnum:
    permissible_values:
      knowledge_assertion:
      prediction:
"#;

    pub(crate) fn parser() -> SchemaParser {
        SchemaParser::new(Box::new(YamlSchema::from_yaml_str(SCHEMA).unwrap()))
    }

    #[test]
    fn induced_slots_follow_inheritance_and_usage() {
        let schema = YamlSchema::from_yaml_str(SCHEMA).unwrap();
        let names: Vec<String> = schema
            .class_induced_slots("gene")
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["id", "category", "name", "provided by", "in taxon"]);
        let name = schema.induced_slot("name", "gene").unwrap();
        assert!(name.is_recommended());
        let interacts = schema.resolved_slot("physically interacts with");
        assert_eq!(interacts.domain.as_deref(), Some("named thing"));
    }

    #[test]
    fn node_constraints_normalize_slot_names() {
        let constraints = parser().node_constraints();
        assert!(constraints.has("id", ConstraintType::Required));
        assert!(constraints.has("id", ConstraintType::Pattern));
        assert!(constraints.has("id", ConstraintType::Identifier));
        assert!(constraints.has("name", ConstraintType::Recommended));
        assert!(constraints.has("provided_by", ConstraintType::Multivalued));
        assert!(!constraints.has("category", ConstraintType::Multivalued));
        assert_eq!(constraints.table_mapping, "nodes");
    }

    #[test]
    fn edge_constraints_cover_enums_bounds_and_node_ranges() {
        let constraints = parser().edge_constraints();
        assert!(constraints.has("knowledge_level", ConstraintType::Enum));
        assert!(constraints.has("score", ConstraintType::MinimumValue));
        assert!(constraints.has("score", ConstraintType::MaximumValue));
        assert!(constraints.has("subject", ConstraintType::RangeClass));
        assert!(constraints.has("object", ConstraintType::RangeClass));
        assert!(!constraints.has("predicate", ConstraintType::RangeClass));
    }

    #[test]
    fn missing_schema_degrades_to_empty_constraints() {
        let parser = SchemaParser::load(Some(Path::new("/nonexistent/schema.yaml")));
        assert!(!parser.has_schema());
        assert!(parser.node_constraints().is_empty());
        assert!(parser.valid_categories().is_empty());
        assert!(parser.is_field_multivalued("xref"));
        assert!(!parser.is_field_multivalued("category"));
    }

    #[test]
    fn categories_predicates_and_prefixes() {
        let parser = parser();
        let categories = parser.valid_categories();
        assert!(categories.contains("biolink:Gene"));
        assert!(categories.contains("biolink:NamedThing"));
        assert!(!categories.contains("biolink:Association"));

        let predicates = parser.valid_predicates();
        assert!(predicates.contains("biolink:related_to"));
        assert!(predicates.contains("biolink:physically_interacts_with"));
        assert!(!predicates.contains("biolink:has_attribute"));
        assert!(parser.known_slots().contains("biolink:has_attribute"));

        let prefixes = parser.category_prefix_map();
        assert_eq!(
            prefixes.get("biolink:Gene"),
            Some(&(vec!["HGNC".to_string(), "NCBIGene".to_string()], true))
        );
        assert_eq!(prefixes.get("biolink:Disease").map(|p| p.1), Some(false));
        assert!(parser.is_field_multivalued("provided_by"));
        assert!(!parser.is_field_multivalued("name"));
    }

    #[test]
    fn class_curies_keep_acronyms() {
        assert_eq!(class_curie("RNA product"), "biolink:RNAProduct");
        assert_eq!(slot_curie("interacts with"), "biolink:interacts_with");
    }
}
