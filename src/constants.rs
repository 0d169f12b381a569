/// Constants shared by readers, writers and the validation engine

// Table names
pub const NODES_TABLE: &str = "nodes";
pub const EDGES_TABLE: &str = "edges";

// Schema classes the node and edge tables are validated against
pub const NODE_CLASS: &str = "named thing";
pub const EDGE_CLASS: &str = "association";

/// Root of the predicate hierarchy
pub const ROOT_PREDICATE: &str = "related to";

/// Prefix used when rendering schema class and slot names as curies
pub const SCHEMA_PREFIX: &str = "biolink";

/// Maximum number of example values kept per violation
pub const DEFAULT_SAMPLE_LIMIT: usize = 10;

// Writer conventions
pub const TSV_DELIMITER: &str = "\t";
pub const LIST_DELIMITER: &str = "|";

/// Columns written first, in this order, by the TSV writer
pub const NODE_CORE_COLUMNS: &[&str] = &[
    "id",
    "category",
    "name",
    "description",
    "xref",
    "provided_by",
    "synonym",
];
pub const EDGE_CORE_COLUMNS: &[&str] = &[
    "id",
    "subject",
    "predicate",
    "object",
    "category",
    "provided_by",
];

/// Columns always exported as lists
pub const LIST_COLUMNS: &[&str] = &[
    "publications",
    "qualifiers",
    "category",
    "synonym",
    "same_as",
    "xrefs",
    "knowledge_source",
    "aggregator_knowledge_source",
    "supporting_data_source",
    "provided_by",
];

/// Fields treated as single-valued regardless of what the schema says
pub const FORCE_SINGLE_VALUED_FIELDS: &[&str] = &["category", "in_taxon", "type"];

/// Multivalued KGX fields, used only when no schema is available
pub const KGX_MULTIVALUED_FIELDS_FALLBACK: &[&str] = &[
    "type",
    "xref",
    "synonym",
    "in_taxon",
    "in_taxon_label",
    "provided_by",
    "publications",
    "same_as",
    "qualifiers",
    "knowledge_source",
    "aggregator_knowledge_source",
    "supporting_data_source",
    "has_evidence",
    "supporting_studies",
    "supporting_study_method_types",
    "publications_from_studies",
    "xrefs",
    "synonyms",
    "categories",
    "types",
];

// Crosswalk fields
pub const ORIGINAL_SUBJECT: &str = "original_subject";
pub const ORIGINAL_OBJECT: &str = "original_object";
pub const SKOS_EXACT_MATCH: &str = "skos:exactMatch";
pub const SKOS_NARROW_MATCH: &str = "skos:narrowMatch";
pub const SKOS_BROAD_MATCH: &str = "skos:broadMatch";

/// Field that collects values beyond the declared columns of a delimited row
pub const DEFAULT_REST_KEY: &str = "_rest";

/// Prefix synonyms rewritten by the curie cleaner
pub const CURIE_SYNONYMS: &[(&str, &str)] = &[("taxon", "NCBITaxon"), ("NCBI_Gene", "NCBIGene")];

/// Well-known remote curie map
pub const DEFAULT_CURIE_MAP_URL: &str =
    "https://raw.githubusercontent.com/biolink/biolink-model/master/project/prefixmap/biolink_model_prefix_map.json";

/// Remote fetch timeout
pub const REMOTE_FETCH_TIMEOUT_SECS: u64 = 10;
