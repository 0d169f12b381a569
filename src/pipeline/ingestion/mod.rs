//! Ingestion: resource opening, record reading, row filtering and sources.

pub mod filter;
pub mod reader;
pub mod resource;
pub mod source;

pub use filter::{ColumnFilter, FilterRule, Inclusion, RowFilter};
pub use reader::{open_records, ColumnSpec, ColumnType, HeaderMode, ReaderConfig, ReaderFormat};
pub use resource::{open_resource, OpenedResource, ResourceFormat, ResourceOpener, SizedResource};
pub use source::{Source, SourceStats};
