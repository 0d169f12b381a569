use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::constraints::{ClassConstraints, ConstraintType, Severity, SlotConstraint};
use super::report::{ValidationReport, ValidationViolation, ViolationSample};
use super::schema::SchemaParser;
use super::table::{GraphTable, GraphTables};
use crate::constants::DEFAULT_SAMPLE_LIMIT;
use crate::metrics::ValidationMetrics;
use crate::types::{as_f64, curie_prefix, is_null_value, scalar_to_string, scalars, Record};

/// Offending rows for one check, with bounded samples.
///
/// Row samples keep `[id, value]` for the first rows seen; value samples
/// group by offending value and keep the most frequent.
struct Tally {
    count: usize,
    limit: usize,
    rows: Vec<ViolationSample>,
    values: BTreeMap<String, (Value, usize)>,
}

impl Tally {
    fn new(limit: usize) -> Self {
        Self {
            count: 0,
            limit,
            rows: Vec::new(),
            values: BTreeMap::new(),
        }
    }

    fn row(&mut self, row: &Record, value: Option<&Value>) {
        self.count += 1;
        if self.rows.len() < self.limit {
            self.rows.push(ViolationSample {
                values: vec![
                    row.get("id").cloned().unwrap_or(Value::Null),
                    value.cloned().unwrap_or(Value::Null),
                ],
                count: 1,
            });
        }
    }

    /// Count the row once, and each offending value it holds.
    fn row_values<'a, I: IntoIterator<Item = &'a Value>>(&mut self, offending: I) {
        self.count += 1;
        for value in offending {
            let entry = self
                .values
                .entry(scalar_to_string(value))
                .or_insert_with(|| (value.clone(), 0));
            entry.1 += 1;
        }
    }

    fn into_violation(
        self,
        constraint_type: ConstraintType,
        slot_name: &str,
        table: &GraphTable,
        severity: Severity,
        description: String,
    ) -> Option<ValidationViolation> {
        if self.count == 0 {
            return None;
        }
        let samples = if self.values.is_empty() {
            self.rows
        } else {
            let mut grouped: Vec<(Value, usize)> = self.values.into_values().collect();
            grouped.sort_by(|a, b| b.1.cmp(&a.1));
            grouped
                .into_iter()
                .take(self.limit)
                .map(|(value, count)| ViolationSample {
                    values: vec![value],
                    count,
                })
                .collect()
        };
        Some(ValidationViolation {
            constraint_type,
            slot_name: slot_name.to_string(),
            table: table.name().to_string(),
            severity,
            description,
            violation_count: self.count,
            total_records: table.len(),
            violation_percentage: ValidationViolation::percentage(self.count, table.len()),
            samples,
        })
    }
}

/// Evaluates schema constraints against node and edge tables.
pub struct ValidationEngine<'a> {
    schema: &'a SchemaParser,
    sample_limit: usize,
}

impl<'a> ValidationEngine<'a> {
    pub fn new(schema: &'a SchemaParser) -> Self {
        Self {
            schema,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }

    pub fn with_sample_limit(mut self, sample_limit: usize) -> Self {
        self.sample_limit = sample_limit;
        self
    }

    /// Validate against the constraints the schema derives for the node and
    /// edge classes.
    pub fn validate(&self, graph: &GraphTables) -> ValidationReport {
        let node_constraints = self.schema.node_constraints();
        let edge_constraints = self.schema.edge_constraints();
        self.validate_against(graph, &node_constraints, &edge_constraints)
    }

    /// Validate against explicit constraint sets. Schema-wide checks still
    /// run when the parser has a schema.
    pub fn validate_against(
        &self,
        graph: &GraphTables,
        node_constraints: &ClassConstraints,
        edge_constraints: &ClassConstraints,
    ) -> ValidationReport {
        let started = Instant::now();
        let mut violations = Vec::new();
        let mut checked = 0usize;
        let mut tables = Vec::new();
        let mut total_records = 0usize;

        let node_ids: Option<HashSet<&str>> = graph.nodes.as_ref().map(GraphTable::id_set);

        for (table, constraints) in [
            (graph.nodes.as_ref(), node_constraints),
            (graph.edges.as_ref(), edge_constraints),
        ] {
            let Some(table) = table else {
                continue;
            };
            tables.push(table.name().to_string());
            total_records += table.len();
            let (found, n) = self.check_structure(table, constraints);
            violations.extend(found);
            checked += n;
            let (found, n) = self.check_table(table, constraints, node_ids.as_ref());
            violations.extend(found);
            checked += n;
        }

        if let (Some(edges), Some(node_ids)) = (&graph.edges, &node_ids) {
            let (found, n) = self.check_endpoints(edges, node_ids, edge_constraints);
            violations.extend(found);
            checked += n;
        }

        if self.schema.has_schema() {
            if let Some(nodes) = &graph.nodes {
                let (found, n) = self.check_categories(nodes);
                violations.extend(found);
                checked += n;
                let (found, n) = self.check_id_prefixes(nodes);
                violations.extend(found);
                checked += n;
            }
            if let Some(edges) = &graph.edges {
                let (found, n) = self.check_predicates(edges);
                violations.extend(found);
                checked += n;
            }
        }

        let report = ValidationReport::summarize(violations, tables, total_records, checked);
        let elapsed = started.elapsed().as_secs_f64();
        ValidationMetrics::record_report(&report, elapsed);
        info!(
            tables = ?report.tables_validated,
            constraints = report.constraints_checked,
            violations = report.violations.len(),
            errors = report.error_count,
            warnings = report.warning_count,
            compliance = report.compliance_percentage,
            "Validation finished"
        );
        report
    }

    /// Required and recommended slots with no column at all.
    fn check_structure(
        &self,
        table: &GraphTable,
        constraints: &ClassConstraints,
    ) -> (Vec<ValidationViolation>, usize) {
        let mut violations = Vec::new();
        let mut checked = 0;
        if table.is_empty() {
            return (violations, checked);
        }
        for (slot, slot_constraints) in &constraints.slots {
            let required = slot_constraints
                .iter()
                .any(|c| c.constraint_type == ConstraintType::Required);
            let recommended = slot_constraints
                .iter()
                .any(|c| c.constraint_type == ConstraintType::Recommended);
            if !required && !recommended {
                continue;
            }
            checked += 1;
            if table.has_column(slot) {
                continue;
            }
            let (severity, kind) = if required {
                (Severity::Error, "Required")
            } else {
                (Severity::Warning, "Recommended")
            };
            violations.push(ValidationViolation {
                constraint_type: ConstraintType::MissingColumn,
                slot_name: slot.clone(),
                table: table.name().to_string(),
                severity,
                description: format!("{kind} column '{slot}' does not exist in table"),
                violation_count: table.len(),
                total_records: table.len(),
                violation_percentage: 100.0,
                samples: Vec::new(),
            });
        }
        (violations, checked)
    }

    /// Edge `subject` and `object` values that name no node. Slots carrying
    /// a range constraint are already covered by `check_table`.
    fn check_endpoints(
        &self,
        edges: &GraphTable,
        node_ids: &HashSet<&str>,
        constraints: &ClassConstraints,
    ) -> (Vec<ValidationViolation>, usize) {
        let mut violations = Vec::new();
        let mut checked = 0;
        for slot in ["subject", "object"] {
            if !edges.has_column(slot) || constraints.has(slot, ConstraintType::RangeClass) {
                continue;
            }
            checked += 1;
            let mut tally = Tally::new(self.sample_limit);
            for row in edges.rows() {
                let Some(value) = row.get(slot) else { continue };
                let dangling: Vec<&Value> = scalars(value)
                    .filter(|v| !node_ids.contains(scalar_to_string(v).as_str()))
                    .collect();
                if !dangling.is_empty() {
                    tally.row_values(dangling);
                }
            }
            violations.extend(tally.into_violation(
                ConstraintType::DanglingEdge,
                slot,
                edges,
                Severity::Error,
                format!("Edge {slot} references non-existent node"),
            ));
        }
        (violations, checked)
    }

    /// Slot value constraints, for slots whose column exists.
    pub fn check_table(
        &self,
        table: &GraphTable,
        constraints: &ClassConstraints,
        node_ids: Option<&HashSet<&str>>,
    ) -> (Vec<ValidationViolation>, usize) {
        let mut violations = Vec::new();
        let mut checked = 0;
        for (slot, slot_constraints) in &constraints.slots {
            if !table.has_column(slot) {
                continue;
            }
            for constraint in slot_constraints {
                if let Some(tally) = self.evaluate(table, constraint, node_ids) {
                    checked += 1;
                    violations.extend(tally.into_violation(
                        constraint.constraint_type,
                        slot,
                        table,
                        constraint.severity,
                        constraint.description.clone(),
                    ));
                }
            }
        }
        (violations, checked)
    }

    /// `None` when the constraint cannot be evaluated against this table.
    fn evaluate(
        &self,
        table: &GraphTable,
        constraint: &SlotConstraint,
        node_ids: Option<&HashSet<&str>>,
    ) -> Option<Tally> {
        let slot = constraint.slot_name.as_str();
        let mut tally = Tally::new(self.sample_limit);
        match constraint.constraint_type {
            ConstraintType::Required | ConstraintType::Recommended => {
                for row in table.rows() {
                    let value = row.get(slot);
                    if value.map_or(true, is_null_value) {
                        tally.row(row, value);
                    }
                }
            }
            ConstraintType::Pattern => {
                let pattern = constraint.value.as_str()?;
                let regex = match Regex::new(pattern) {
                    Ok(regex) => regex,
                    Err(e) => {
                        warn!(slot, pattern, error = %e, "Skipping unparseable pattern constraint");
                        return None;
                    }
                };
                for row in table.rows() {
                    if let Some(value) = row.get(slot) {
                        if scalars(value).any(|v| !regex.is_match(&scalar_to_string(v))) {
                            tally.row(row, Some(value));
                        }
                    }
                }
            }
            ConstraintType::Enum => {
                let allowed: HashSet<&str> = constraint
                    .value
                    .as_array()?
                    .iter()
                    .filter_map(Value::as_str)
                    .collect();
                for row in table.rows() {
                    let Some(value) = row.get(slot) else { continue };
                    let offending: Vec<&Value> = scalars(value)
                        .filter(|v| !allowed.contains(scalar_to_string(v).as_str()))
                        .collect();
                    if !offending.is_empty() {
                        tally.row_values(offending);
                    }
                }
            }
            ConstraintType::MinimumValue | ConstraintType::MaximumValue => {
                let bound = constraint.value.as_f64()?;
                let is_min = constraint.constraint_type == ConstraintType::MinimumValue;
                for row in table.rows() {
                    let Some(value) = row.get(slot) else { continue };
                    let out_of_bounds = scalars(value).filter_map(as_f64).any(|n| {
                        if is_min {
                            n < bound
                        } else {
                            n > bound
                        }
                    });
                    if out_of_bounds {
                        tally.row(row, Some(value));
                    }
                }
            }
            ConstraintType::Identifier => {
                let mut seen: HashSet<String> = HashSet::new();
                for row in table.rows() {
                    match row.get(slot) {
                        Some(value) if !is_null_value(value) => {
                            if !seen.insert(scalar_to_string(value)) {
                                tally.row_values([value]);
                            }
                        }
                        value => tally.row_values([value.unwrap_or(&Value::Null)]),
                    }
                }
            }
            ConstraintType::Multivalued => {
                for row in table.rows() {
                    if let Some(value) = row.get(slot) {
                        if !is_null_value(value) && !value.is_array() {
                            tally.row(row, Some(value));
                        }
                    }
                }
            }
            ConstraintType::RangeClass => {
                let Some(node_ids) = node_ids else {
                    debug!(slot, "No node table; skipping endpoint check");
                    return None;
                };
                for row in table.rows() {
                    let Some(value) = row.get(slot) else { continue };
                    let dangling: Vec<&Value> = scalars(value)
                        .filter(|v| !node_ids.contains(scalar_to_string(v).as_str()))
                        .collect();
                    if !dangling.is_empty() {
                        tally.row_values(dangling);
                    }
                }
            }
            ConstraintType::MissingColumn
            | ConstraintType::IdPrefix
            | ConstraintType::InvalidSubproperty
            | ConstraintType::DanglingEdge => {
                return None;
            }
        }
        Some(tally)
    }

    /// Node categories the schema does not define.
    fn check_categories(&self, nodes: &GraphTable) -> (Vec<ValidationViolation>, usize) {
        let valid = self.schema.valid_categories();
        if valid.is_empty() || !nodes.has_column("category") {
            return (Vec::new(), 0);
        }
        let mut tally = Tally::new(self.sample_limit);
        for row in nodes.rows() {
            let Some(value) = row.get("category") else { continue };
            let unknown: Vec<&Value> = scalars(value)
                .filter(|v| !valid.contains(&scalar_to_string(v)))
                .collect();
            if !unknown.is_empty() {
                tally.row_values(unknown);
            }
        }
        let violation = tally.into_violation(
            ConstraintType::Enum,
            "category",
            nodes,
            Severity::Warning,
            "Node category not in schema".into(),
        );
        (violation.into_iter().collect(), 1)
    }

    /// Node ids whose prefix is outside the closed `id_prefixes` of their
    /// category.
    fn check_id_prefixes(&self, nodes: &GraphTable) -> (Vec<ValidationViolation>, usize) {
        let closed: BTreeMap<String, Vec<String>> = self
            .schema
            .category_prefix_map()
            .into_iter()
            .filter(|(_, (prefixes, is_closed))| *is_closed && !prefixes.is_empty())
            .map(|(category, (prefixes, _))| (category, prefixes))
            .collect();
        if closed.is_empty() || !nodes.has_column("category") {
            return (Vec::new(), 0);
        }
        let mut tally = Tally::new(self.sample_limit);
        for row in nodes.rows() {
            let Some(id) = row.get("id").and_then(Value::as_str) else {
                continue;
            };
            let Some(category) = row.get("category") else { continue };
            let prefix = curie_prefix(id);
            let broken = scalars(category).find(|c| {
                closed
                    .get(&scalar_to_string(c))
                    .is_some_and(|allowed| !allowed.iter().any(|p| p == prefix))
            });
            if let Some(category) = broken {
                tally.row(row, Some(category));
            }
        }
        let described: Vec<String> = closed
            .iter()
            .map(|(category, prefixes)| format!("{category}: {}", prefixes.join(", ")))
            .collect();
        let violation = tally.into_violation(
            ConstraintType::IdPrefix,
            "id",
            nodes,
            Severity::Warning,
            format!("ID prefix not in allowed list for its category ({})", described.join("; ")),
        );
        (violation.into_iter().collect(), 1)
    }

    /// Predicates the schema does not know, and known slots that are not
    /// predicates.
    fn check_predicates(&self, edges: &GraphTable) -> (Vec<ValidationViolation>, usize) {
        let valid = self.schema.valid_predicates();
        if valid.is_empty() || !edges.has_column("predicate") {
            return (Vec::new(), 0);
        }
        let known = self.schema.known_slots();
        let mut unknown = Tally::new(self.sample_limit);
        let mut outside = Tally::new(self.sample_limit);
        for row in edges.rows() {
            let Some(value) = row.get("predicate") else { continue };
            let (mut not_known, mut not_predicate) = (Vec::new(), Vec::new());
            for predicate in scalars(value) {
                let text = scalar_to_string(predicate);
                if valid.contains(&text) {
                    continue;
                }
                if known.contains(&text) {
                    not_predicate.push(predicate);
                } else {
                    not_known.push(predicate);
                }
            }
            if !not_known.is_empty() {
                unknown.row_values(not_known);
            }
            if !not_predicate.is_empty() {
                outside.row_values(not_predicate);
            }
        }
        let mut violations: Vec<ValidationViolation> = Vec::new();
        violations.extend(unknown.into_violation(
            ConstraintType::Enum,
            "predicate",
            edges,
            Severity::Warning,
            "Edge predicate not in schema".into(),
        ));
        violations.extend(outside.into_violation(
            ConstraintType::InvalidSubproperty,
            "predicate",
            edges,
            Severity::Warning,
            "Edge predicate is a schema slot but not a descendant of the root predicate".into(),
        ));
        (violations, 2)
    }
}
