//! Compact identifiers (`prefix:reference`) and the prefix-to-namespace maps
//! used to expand and contract them.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::path::Path;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::app::ports::HttpClientPort;
use crate::constants::{CURIE_SYNONYMS, DEFAULT_CURIE_MAP_URL};
use crate::error::{IngestError, Result};

static CURIE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*:[^\s]+$").unwrap_or_else(|e| {
        unreachable!("static curie pattern is valid: {e}")
    })
});

/// A syntactically valid `prefix:reference` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Curie(String);

impl Curie {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if CURIE_PATTERN.is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(IngestError::InvalidCurie(value.to_string()))
        }
    }

    pub fn is_valid(value: &str) -> bool {
        CURIE_PATTERN.is_match(value.trim())
    }

    pub fn prefix(&self) -> &str {
        self.split().0
    }

    pub fn reference(&self) -> &str {
        self.split().1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, &str) {
        // the pattern guarantees a colon
        self.0.split_once(':').unwrap_or((&self.0, ""))
    }
}

impl fmt::Display for Curie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Curie {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// True when no two keys share a value.
pub fn is_bimap<K, V: Eq + Hash>(map: &HashMap<K, V>) -> bool {
    let mut seen = HashSet::with_capacity(map.len());
    map.values().all(|v| seen.insert(v))
}

/// Values claimed by more than one key, sorted.
pub fn duplicate_values(map: &HashMap<String, String>) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in map.values() {
        *counts.entry(value.as_str()).or_default() += 1;
    }
    let mut duplicates: Vec<String> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(v, _)| v.to_string())
        .collect();
    duplicates.sort();
    duplicates
}

/// Mapping entries in document order, duplicates included, so that a
/// repeated key can be reported instead of silently overwritten.
struct OrderedEntries(Vec<(String, String)>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of prefix to namespace")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, String>()? {
                    entries.push(entry);
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// A prefix-to-namespace map that is guaranteed to be a bimap.
#[derive(Debug, Clone, Default)]
pub struct CurieMap {
    prefixes: HashMap<String, String>,
}

impl CurieMap {
    /// Build from entries; a repeated prefix is `DuplicateKey`, a namespace
    /// claimed twice is `BimapViolation`.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut prefixes = HashMap::new();
        for (prefix, namespace) in entries {
            if prefixes.contains_key(&prefix) {
                return Err(IngestError::DuplicateKey {
                    key: prefix,
                    context: "curie map".into(),
                });
            }
            prefixes.insert(prefix, namespace);
        }
        if !is_bimap(&prefixes) {
            return Err(IngestError::BimapViolation {
                duplicates: duplicate_values(&prefixes),
            });
        }
        Ok(Self { prefixes })
    }

    /// Parse a YAML (or JSON) `prefix: namespace` document.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let entries: OrderedEntries = serde_yaml::from_str(text)?;
        Self::from_entries(entries.0)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let entries: OrderedEntries = serde_json::from_slice(bytes)?;
        Self::from_entries(entries.0)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| IngestError::ResourceNotFound {
            path: path.display().to_string(),
        })?;
        let map = Self::from_yaml_str(&text)?;
        info!(path = %path.display(), prefixes = map.len(), "Loaded curie map");
        Ok(map)
    }

    /// Fetch the well-known remote prefix map.
    pub fn fetch_default(http: &dyn HttpClientPort) -> Result<Self> {
        let response = http.get(DEFAULT_CURIE_MAP_URL).map_err(|e| IngestError::RemoteFetch {
            url: DEFAULT_CURIE_MAP_URL.to_string(),
            status: 0,
            body: e,
        })?;
        if !response.is_success() {
            return Err(IngestError::RemoteFetch {
                url: DEFAULT_CURIE_MAP_URL.to_string(),
                status: response.status,
                body: String::from_utf8_lossy(&response.bytes).chars().take(512).collect(),
            });
        }
        Self::from_json_slice(&response.bytes)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.prefixes.contains_key(prefix)
    }

    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// `prefix:ref` to `namespace` + `ref`; `None` for an unknown prefix or
    /// an invalid curie.
    pub fn expand(&self, curie: &str) -> Option<String> {
        let curie = Curie::parse(curie).ok()?;
        self.namespace(curie.prefix())
            .map(|ns| format!("{ns}{}", curie.reference()))
    }

    /// The inverse of [`expand`](Self::expand), preferring the longest
    /// matching namespace.
    pub fn contract(&self, uri: &str) -> Option<String> {
        self.prefixes
            .iter()
            .filter(|(_, ns)| !ns.is_empty() && uri.starts_with(ns.as_str()))
            .max_by_key(|(_, ns)| ns.len())
            .map(|(prefix, ns)| format!("{prefix}:{}", &uri[ns.len()..]))
    }

    /// Parse a curie and require its prefix to be known.
    pub fn validate(&self, value: &str) -> Result<Curie> {
        let curie = Curie::parse(value)?;
        if !self.has_prefix(curie.prefix()) {
            warn!(curie = %curie, "Unknown curie prefix");
            return Err(IngestError::InvalidCurie(format!(
                "{curie} (prefix '{}' is not in the curie map)",
                curie.prefix()
            )));
        }
        Ok(curie)
    }
}

/// Rewrites prefix synonyms to their preferred spelling.
#[derive(Debug, Clone)]
pub struct CurieCleaner {
    synonyms: HashMap<String, String>,
}

impl Default for CurieCleaner {
    fn default() -> Self {
        Self::new(
            CURIE_SYNONYMS
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string())),
        )
    }
}

impl CurieCleaner {
    pub fn new<I: IntoIterator<Item = (String, String)>>(synonyms: I) -> Self {
        Self {
            synonyms: synonyms.into_iter().collect(),
        }
    }

    pub fn clean(&self, id: &str) -> String {
        let id = id.trim();
        match id.split_once(':') {
            Some((prefix, reference)) => match self.synonyms.get(prefix) {
                Some(preferred) => format!("{preferred}:{reference}"),
                None => id.to_string(),
            },
            None => id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curie_grammar() {
        assert!(Curie::is_valid("HGNC:1100"));
        assert!(Curie::is_valid("biolink:Gene"));
        assert!(Curie::is_valid("obo.x-y:a/b#c"));
        assert!(!Curie::is_valid("no colon"));
        assert!(!Curie::is_valid("1abc:2"));
        assert!(!Curie::is_valid("HGNC:"));
        let curie: Curie = "NCBITaxon:9606".parse().unwrap();
        assert_eq!(curie.prefix(), "NCBITaxon");
        assert_eq!(curie.reference(), "9606");
    }

    #[test]
    fn bimap_detection() {
        let valid: HashMap<String, String> = [("a", "http://a/"), ("b", "http://b/")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(is_bimap(&valid));

        let colliding: HashMap<String, String> = [("a", "http://x/"), ("b", "http://x/")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(!is_bimap(&colliding));
        assert_eq!(duplicate_values(&colliding), vec!["http://x/".to_string()]);
    }

    #[test]
    fn yaml_map_rejects_duplicate_prefixes_and_shared_namespaces() {
        let dup = "HGNC: http://identifiers.org/hgnc/\nHGNC: http://example.org/\n";
        assert!(matches!(
            CurieMap::from_yaml_str(dup),
            Err(IngestError::DuplicateKey { key, .. }) if key == "HGNC"
        ));

        let shared = "A: http://x.org/\nB: http://x.org/\n";
        assert!(matches!(
            CurieMap::from_yaml_str(shared),
            Err(IngestError::BimapViolation { .. })
        ));
    }

    #[test]
    fn expand_and_contract() {
        let map = CurieMap::from_yaml_str(
            "GO: http://purl.obolibrary.org/obo/GO_\nOBO: http://purl.obolibrary.org/obo/\n",
        )
        .unwrap();
        assert_eq!(
            map.expand("GO:0008150").as_deref(),
            Some("http://purl.obolibrary.org/obo/GO_0008150")
        );
        assert_eq!(map.expand("XX:1"), None);
        assert_eq!(
            map.contract("http://purl.obolibrary.org/obo/GO_0008150").as_deref(),
            Some("GO:0008150")
        );
        assert!(map.validate("GO:1").is_ok());
        assert!(matches!(map.validate("ZZ:1"), Err(IngestError::InvalidCurie(_))));
    }

    #[test]
    fn json_map_loads() {
        let map = CurieMap::from_json_slice(br#"{"HGNC": "http://identifiers.org/hgnc/"}"#).unwrap();
        assert!(map.has_prefix("HGNC"));
    }

    #[test]
    fn cleaner_rewrites_synonyms() {
        let cleaner = CurieCleaner::default();
        assert_eq!(cleaner.clean("taxon:9606"), "NCBITaxon:9606");
        assert_eq!(cleaner.clean(" NCBI_Gene:672 "), "NCBIGene:672");
        assert_eq!(cleaner.clean("HGNC:1"), "HGNC:1");
        assert_eq!(cleaner.clean("plain"), "plain");
    }
}
