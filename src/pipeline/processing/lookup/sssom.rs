//! SSSOM crosswalks: identifier mappings between namespaces, applied to edge
//! endpoints before they reach a sink.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::constants::{ORIGINAL_OBJECT, ORIGINAL_SUBJECT, SKOS_EXACT_MATCH};
use crate::error::Result;
use crate::pipeline::ingestion::resource::ResourceOpener;
use crate::types::{curie_prefix, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    /// Accepted but never resolved
    Narrow,
    /// Accepted but never resolved
    Broad,
}

/// Crosswalk settings for one source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SssomConfig {
    pub files: Vec<String>,
    pub filter_prefixes: Vec<String>,
    pub subject_target_prefixes: Vec<String>,
    pub object_target_prefixes: Vec<String>,
    pub use_match: Vec<MatchType>,
}

impl SssomConfig {
    fn matches(&self) -> Vec<MatchType> {
        if self.use_match.is_empty() {
            vec![MatchType::Exact]
        } else {
            self.use_match.clone()
        }
    }

    fn target_prefixes(&self) -> impl Iterator<Item = &String> {
        self.subject_target_prefixes
            .iter()
            .chain(self.object_target_prefixes.iter())
    }
}

/// One row of an SSSOM table; columns beyond these are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct SssomMapping {
    pub subject_id: String,
    pub predicate_id: String,
    pub object_id: String,
    #[serde(default)]
    pub mapping_justification: Option<String>,
}

impl SssomMapping {
    pub fn new(subject_id: &str, predicate_id: &str, object_id: &str) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            predicate_id: predicate_id.to_string(),
            object_id: object_id.to_string(),
            mapping_justification: None,
        }
    }
}

/// Parse the SSSOM TSV serialization; the leading `#` metadata block is skipped.
pub fn parse_sssom<R: Read>(input: R) -> Result<Vec<SssomMapping>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(input);
    let mut mappings: Vec<SssomMapping> = Vec::new();
    for row in reader.deserialize() {
        mappings.push(row?);
    }
    Ok(mappings)
}

/// Compiled crosswalk: original id to target prefix to mapped id.
#[derive(Debug, Clone, Default)]
pub struct SssomCrosswalk {
    config: SssomConfig,
    lookup: HashMap<String, HashMap<String, String>>,
}

impl SssomCrosswalk {
    /// Read, merge and compile every file in `config.files`.
    pub fn load(
        config: &SssomConfig,
        opener: &ResourceOpener,
        base_dir: Option<&Path>,
    ) -> Result<Self> {
        let mut tables = Vec::new();
        for file in &config.files {
            let location = match base_dir {
                Some(dir) if Path::new(file).is_relative() && !file.contains("://") => {
                    dir.join(file).to_string_lossy().into_owned()
                }
                _ => file.clone(),
            };
            for member in opener.open(&location)? {
                tables.push(parse_sssom(member?)?);
            }
        }
        Ok(Self::from_tables(config, tables))
    }

    /// Merge several parsed tables, dropping repeated rows, then filter and compile.
    pub fn from_tables(config: &SssomConfig, tables: Vec<Vec<SssomMapping>>) -> Self {
        let mut seen = HashSet::new();
        let merged: Vec<SssomMapping> = tables
            .into_iter()
            .flatten()
            .filter(|m| seen.insert(m.clone()))
            .collect();

        let mut filters: Vec<&str> = config.target_prefixes().map(String::as_str).collect();
        for prefix in &config.filter_prefixes {
            if !filters.contains(&prefix.as_str()) {
                filters.push(prefix);
            }
        }
        let kept: Vec<SssomMapping> = if filters.is_empty() {
            merged
        } else {
            merged
                .into_iter()
                .filter(|m| {
                    filters.contains(&curie_prefix(&m.subject_id))
                        || filters.contains(&curie_prefix(&m.object_id))
                })
                .collect()
        };
        debug!(?filters, rows = kept.len(), "Filtered SSSOM mappings");

        let mut crosswalk = Self {
            config: config.clone(),
            lookup: HashMap::new(),
        };
        let matches = crosswalk.config.matches();
        for mapping in &kept {
            if matches.contains(&MatchType::Exact) {
                crosswalk.set_mapping(&mapping.subject_id, &mapping.object_id, &mapping.predicate_id);
                crosswalk.set_mapping(&mapping.object_id, &mapping.subject_id, &mapping.predicate_id);
            }
        }
        for unresolved in [MatchType::Narrow, MatchType::Broad] {
            if matches.contains(&unresolved) {
                warn!(match_type = ?unresolved, "SSSOM match type is not implemented and is ignored");
            }
        }
        info!(ids = crosswalk.lookup.len(), "Built SSSOM lookup table");
        crosswalk
    }

    fn set_mapping(&mut self, original_id: &str, mapped_id: &str, predicate: &str) {
        let original_prefix = curie_prefix(original_id);
        let mapped_prefix = curie_prefix(mapped_id);
        let original_allowed = self.config.filter_prefixes.is_empty()
            || self.config.filter_prefixes.iter().any(|p| p == original_prefix);
        let mapped_targeted = self.config.target_prefixes().any(|p| p == mapped_prefix);
        if !(original_allowed && mapped_targeted) {
            return;
        }
        if predicate != SKOS_EXACT_MATCH {
            debug!(original_id, mapped_id, predicate, "Not an exact match, skipped");
            return;
        }

        let targets = self.lookup.entry(original_id.to_string()).or_default();
        match targets.get(mapped_prefix) {
            Some(existing) if existing != mapped_id => warn!(
                original_id,
                kept = %existing,
                ignored = mapped_id,
                "Duplicate mapping for {} to {}, keeping the first",
                original_id,
                mapped_prefix
            ),
            Some(_) => {}
            None => {
                targets.insert(mapped_prefix.to_string(), mapped_id.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// First mapping of `id` into one of `target_prefixes`, in prefix order.
    pub fn get_mapping(&self, id: &str, target_prefixes: &[String]) -> Option<&str> {
        let targets = self.lookup.get(id)?;
        target_prefixes
            .iter()
            .find_map(|prefix| targets.get(prefix))
            .map(String::as_str)
    }

    /// Rewrite an edge's subject and object through the crosswalk, keeping
    /// the replaced values as `original_subject` and `original_object`.
    pub fn apply_mapping(&self, mut entity: Record) -> Record {
        for (field, original_field, targets) in [
            ("subject", ORIGINAL_SUBJECT, &self.config.subject_target_prefixes),
            ("object", ORIGINAL_OBJECT, &self.config.object_target_prefixes),
        ] {
            let Some(Value::String(id)) = entity.get(field) else {
                continue;
            };
            if let Some(mapped) = self.get_mapping(id, targets) {
                let mapped = Value::String(mapped.to_string());
                if let Some(original) = entity.insert(field.to_string(), mapped) {
                    entity.insert(original_field.to_string(), original);
                }
            }
        }
        entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(subject: &[&str], object: &[&str]) -> SssomConfig {
        SssomConfig {
            subject_target_prefixes: subject.iter().map(|s| s.to_string()).collect(),
            object_target_prefixes: object.iter().map(|s| s.to_string()).collect(),
            ..SssomConfig::default()
        }
    }

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn subject_is_rewritten_and_original_kept() {
        let crosswalk = SssomCrosswalk::from_tables(
            &config(&["B"], &[]),
            vec![vec![SssomMapping::new("A:1", SKOS_EXACT_MATCH, "B:9")]],
        );
        let mapped = crosswalk.apply_mapping(record(json!({"subject": "A:1", "object": "A:2"})));
        assert_eq!(
            Value::Object(mapped),
            json!({"subject": "B:9", "object": "A:2", "original_subject": "A:1"})
        );
    }

    #[test]
    fn exact_matches_are_indexed_both_ways() {
        let crosswalk = SssomCrosswalk::from_tables(
            &config(&["A"], &["B"]),
            vec![vec![SssomMapping::new("A:1", SKOS_EXACT_MATCH, "B:9")]],
        );
        let mapped =
            crosswalk.apply_mapping(record(json!({"subject": "B:9", "predicate": "p", "object": "A:1"})));
        assert_eq!(mapped["subject"], json!("A:1"));
        assert_eq!(mapped["original_subject"], json!("B:9"));
        assert_eq!(mapped["object"], json!("B:9"));
        assert_eq!(mapped["original_object"], json!("A:1"));
    }

    #[test]
    fn first_conflicting_mapping_wins() {
        let crosswalk = SssomCrosswalk::from_tables(
            &config(&["B"], &[]),
            vec![
                vec![SssomMapping::new("A:1", SKOS_EXACT_MATCH, "B:9")],
                vec![
                    SssomMapping::new("A:1", SKOS_EXACT_MATCH, "B:9"),
                    SssomMapping::new("A:1", SKOS_EXACT_MATCH, "B:7"),
                ],
            ],
        );
        assert_eq!(crosswalk.get_mapping("A:1", &["B".into()]), Some("B:9"));
    }

    #[test]
    fn narrow_and_broad_never_resolve() {
        let mut cfg = config(&["B"], &[]);
        cfg.use_match = vec![MatchType::Narrow, MatchType::Broad];
        let crosswalk = SssomCrosswalk::from_tables(
            &cfg,
            vec![vec![SssomMapping::new("A:1", "skos:narrowMatch", "B:9")]],
        );
        assert!(crosswalk.is_empty());
    }

    #[test]
    fn parses_tsv_with_metadata_block() {
        let text = "#curie_map:\n#  A: http://a/\nsubject_id\tpredicate_id\tobject_id\tmapping_justification\tconfidence\nA:1\tskos:exactMatch\tB:9\tsemapv:ManualMappingCuration\t0.9\n";
        let rows = parse_sssom(text.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].object_id, "B:9");
    }

    #[test]
    fn unmapped_records_pass_through() {
        let crosswalk = SssomCrosswalk::from_tables(&config(&["B"], &["B"]), vec![]);
        let input = record(json!({"subject": "X:1", "object": "Y:2"}));
        assert_eq!(crosswalk.apply_mapping(input.clone()), input);
    }
}
