use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::curie::{duplicate_values, is_bimap};
use crate::error::{IngestError, Result};

/// Term translation: a source-specific local table layered over a global
/// label-to-identifier table.
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    global: HashMap<String, String>,
    local: HashMap<String, String>,
}

impl TranslationTable {
    /// The global table must be a bimap.
    pub fn new(global: HashMap<String, String>, local: HashMap<String, String>) -> Result<Self> {
        if !is_bimap(&global) {
            return Err(IngestError::BimapViolation {
                duplicates: duplicate_values(&global),
            });
        }
        Ok(Self { global, local })
    }

    /// Load a YAML file with a `global` mapping and an optional `local` one.
    pub fn load(path: &Path) -> Result<Self> {
        #[derive(serde::Deserialize)]
        struct TranslationFile {
            #[serde(default)]
            global: HashMap<String, String>,
            #[serde(default)]
            local: HashMap<String, String>,
        }
        let text = std::fs::read_to_string(path).map_err(|_| IngestError::ResourceNotFound {
            path: path.display().to_string(),
        })?;
        let file: TranslationFile = serde_yaml::from_str(&text)?;
        Self::new(file.global, file.local)
    }

    /// Resolve a source term to its preferred identifier.
    ///
    /// `global[local[word]]`, then `local[word]`, then `global[word]`; when
    /// nothing matches, a mandatory lookup fails and an optional one returns
    /// `default` or the word itself.
    pub fn resolve_term(&self, word: &str, mandatory: bool, default: Option<&str>) -> Result<String> {
        if let Some(label) = self.local.get(word) {
            return Ok(match self.global.get(label) {
                Some(id) => id.clone(),
                None => {
                    info!(word, label = %label, "Translated locally but no global term id");
                    label.clone()
                }
            });
        }
        if let Some(id) = self.global.get(word) {
            return Ok(id.clone());
        }
        if mandatory {
            return Err(IngestError::LookupMiss {
                map: "translation table".into(),
                key: word.to_string(),
                column: "global".into(),
            });
        }
        warn!(word, "No translation");
        Ok(default.unwrap_or(word).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn local_overrides_then_global() {
        let table = TranslationTable::new(
            map(&[("homo sapiens", "NCBITaxon:9606"), ("mouse", "NCBITaxon:10090")]),
            map(&[("human", "homo sapiens"), ("fly", "drosophila")]),
        )
        .unwrap();
        assert_eq!(table.resolve_term("human", true, None).unwrap(), "NCBITaxon:9606");
        assert_eq!(table.resolve_term("mouse", true, None).unwrap(), "NCBITaxon:10090");
        assert_eq!(table.resolve_term("fly", true, None).unwrap(), "drosophila");
    }

    #[test]
    fn unresolved_terms_follow_mandatory_flag() {
        let table = TranslationTable::new(map(&[("a", "X:1")]), HashMap::new()).unwrap();
        assert!(table.resolve_term("zzz", true, None).is_err());
        assert_eq!(table.resolve_term("zzz", false, None).unwrap(), "zzz");
        assert_eq!(table.resolve_term("zzz", false, Some("X:0")).unwrap(), "X:0");
    }

    #[test]
    fn global_table_must_be_a_bimap() {
        let result = TranslationTable::new(map(&[("a", "X:1"), ("b", "X:1")]), HashMap::new());
        match result {
            Err(IngestError::BimapViolation { duplicates }) => assert_eq!(duplicates, vec!["X:1"]),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
