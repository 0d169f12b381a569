use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Cannot open local or remote resource: {path}. Check the URL/path and that the file exists")]
    ResourceNotFound { path: String },

    #[error("Remote resource {url} returned {status}: {body}")]
    RemoteFetch { url: String, status: u16, body: String },

    #[error("Required properties are missing from {source_name}: {missing:?}")]
    Projection { source_name: String, missing: Vec<String> },

    #[error("No record for '{key}' in column '{column}' of map '{map}'")]
    LookupMiss { map: String, key: String, column: String },

    #[error("Cannot convert {entity}: can only convert node-shaped (id, name) or edge-shaped (subject, predicate, object) entities")]
    Classification { entity: String },

    #[error("Duplicate key '{key}' while loading {context}")]
    DuplicateKey { key: String, context: String },

    #[error("Curie map is not a bimap, namespaces claimed more than once: {duplicates:?}")]
    BimapViolation { duplicates: Vec<String> },

    #[error("Invalid curie: {0}")]
    InvalidCurie(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transform hook failed: {0:#}")]
    Transform(anyhow::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML deserialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Delimited text error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
